use core::fmt;
use std::collections::{BTreeMap, BTreeSet};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::DEFAULT_ATTACKER_HOP_PERIOD;
use crate::error::{Result, SimulationError};
use crate::flow::{Flow, FlowId};
use crate::node::{Node, NodeId};
use crate::share::Share;

/// The closed set of eavesdropping strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AttackerKind {
    /// K random relay nodes anywhere in the topology.
    RandomNodeHopping,
    /// K random first-hop nodes of the target flow.
    RandomPathHopping,
    /// Every interior node of K random paths.
    IdealRandomPathHopping,
    /// One random interior node on each of K random paths.
    OneNodePerPath,
    /// A one-node-per-path selection made once and kept.
    Fixed,
    /// Deterministic sweep across hop positions of all paths.
    Planned,
    /// Every first-hop node, for the whole run.
    Total,
}

impl AttackerKind {
    pub const ALL: [AttackerKind; 7] = [
        AttackerKind::RandomNodeHopping,
        AttackerKind::RandomPathHopping,
        AttackerKind::IdealRandomPathHopping,
        AttackerKind::OneNodePerPath,
        AttackerKind::Fixed,
        AttackerKind::Planned,
        AttackerKind::Total,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AttackerKind::RandomNodeHopping => "random-node-hopping",
            AttackerKind::RandomPathHopping => "random-path-hopping",
            AttackerKind::IdealRandomPathHopping => "ideal-random-path-hopping",
            AttackerKind::OneNodePerPath => "one-node-per-path",
            AttackerKind::Fixed => "fixed",
            AttackerKind::Planned => "planned",
            AttackerKind::Total => "total",
        }
    }

    /// Strategies that pick their monitored set once and never hop again.
    pub fn is_static(self) -> bool {
        matches!(self, AttackerKind::Fixed | AttackerKind::Total)
    }
}

impl fmt::Display for AttackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How to build one attacker: which strategy, how often it re-selects, and
/// optionally how many nodes (or paths) it may watch per selection. The
/// budget defaults to the target flow's threshold `K`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackerSpec {
    pub kind: AttackerKind,
    #[serde(default = "default_attacker_hop_period")]
    pub hop_period: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<usize>,
}

fn default_attacker_hop_period() -> u64 {
    DEFAULT_ATTACKER_HOP_PERIOD
}

impl AttackerSpec {
    pub fn new(kind: AttackerKind, hop_period: u64) -> Self {
        AttackerSpec {
            kind,
            hop_period,
            budget: None,
        }
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = Some(budget);
        self
    }
}

/// Sweep state of the planned strategy.
///
/// `hop_index` is the 1-based hop position (distance from the source) being
/// watched. Each selection takes up to `budget` paths not yet watched in the
/// current sweep that are long enough to have a node at that position.
///
/// `active_paths` holds the path indices seen carrying target shares since
/// the last reset. It is reported through [`Attacker::observed_paths`] and
/// does not take part in the reset decision, which depends only on
/// `hop_index` and `monitored_paths`.
#[derive(Debug, Clone)]
struct PlannedSweep {
    interiors: Vec<Vec<NodeId>>,
    hop_index: usize,
    monitored_paths: BTreeSet<usize>,
    active_paths: BTreeSet<usize>,
}

impl PlannedSweep {
    fn new(interiors: Vec<Vec<NodeId>>) -> Self {
        PlannedSweep {
            interiors,
            hop_index: 1,
            monitored_paths: BTreeSet::new(),
            active_paths: BTreeSet::new(),
        }
    }

    fn deepest(&self) -> usize {
        self.interiors.iter().map(Vec::len).max().unwrap_or(0)
    }

    fn reset(&mut self) {
        self.hop_index = 1;
        self.monitored_paths.clear();
        self.active_paths.clear();
    }

    fn next_selection(&mut self, budget: usize) -> BTreeSet<NodeId> {
        let deepest = self.deepest();
        if deepest == 0 || budget == 0 {
            return BTreeSet::new();
        }
        if self.hop_index > deepest || self.monitored_paths.len() == self.interiors.len() {
            debug!("Planned sweep complete at hop index {}, restarting", self.hop_index);
            self.reset();
        }

        // At most one restart: position 1 always has candidates after a reset.
        let mut restarted = false;
        loop {
            if self.hop_index > deepest {
                if restarted {
                    return BTreeSet::new();
                }
                self.reset();
                restarted = true;
            }

            let position = self.hop_index;
            let candidates: Vec<usize> = (0..self.interiors.len())
                .filter(|i| !self.monitored_paths.contains(i))
                .filter(|&i| self.interiors[i].len() >= position)
                .take(budget)
                .collect();
            self.hop_index += 1;
            if candidates.is_empty() {
                continue;
            }

            self.monitored_paths.extend(candidates.iter().copied());
            return candidates
                .iter()
                .map(|&i| self.interiors[i][position - 1])
                .collect();
        }
    }
}

/// Strategy payload. Candidate pools are derived from the target flow once, at
/// creation, and only node IDs are kept.
#[derive(Debug, Clone)]
enum Strategy {
    RandomNodeHopping { node_collection: Vec<NodeId> },
    RandomPathHopping { first_hops: Vec<NodeId> },
    IdealRandomPathHopping { interiors: Vec<Vec<NodeId>> },
    OneNodePerPath { interiors: Vec<Vec<NodeId>> },
    Fixed { interiors: Vec<Vec<NodeId>> },
    Planned(PlannedSweep),
    Total { first_hops: Vec<NodeId> },
}

/// An eavesdropper targeting one flow.
///
/// Every tick the simulation calls [`Attacker::monitor`] and then
/// [`Attacker::select_monitored_nodes`]. Captured shares accumulate for the
/// whole run and [`Attacker::reconstruct_captured_messages`] decides, the
/// same way for every strategy, which messages the attacker could rebuild.
#[derive(Debug, Clone)]
pub struct Attacker {
    kind: AttackerKind,
    target: FlowId,
    n: usize,
    k: usize,
    budget: usize,
    hop_period: u64,
    monitored_nodes: BTreeSet<NodeId>,
    captured_shares: Vec<Share>,
    hop_count: u64,
    strategy: Strategy,
}

/// Interior nodes of every path, source and sink stripped.
fn path_interiors(flow: &Flow) -> Vec<Vec<NodeId>> {
    flow.paths()
        .iter()
        .map(|path| {
            if path.len() <= 2 {
                Vec::new()
            } else {
                path[1..path.len() - 1].to_vec()
            }
        })
        .collect()
}

/// First interior node of every path that has one.
fn first_hops(flow: &Flow) -> Vec<NodeId> {
    let mut hops: Vec<NodeId> = flow
        .paths()
        .iter()
        .filter(|path| path.len() > 2)
        .map(|path| path[1])
        .collect();
    hops.sort();
    hops
}

fn sample_nodes<R: Rng + ?Sized>(pool: &[NodeId], amount: usize, rng: &mut R) -> BTreeSet<NodeId> {
    if pool.len() <= amount {
        return pool.iter().copied().collect();
    }
    pool.choose_multiple(rng, amount).copied().collect()
}

fn sample_paths<R: Rng + ?Sized>(interiors: &[Vec<NodeId>], amount: usize, rng: &mut R) -> Vec<usize> {
    let candidates: Vec<usize> = (0..interiors.len())
        .filter(|&i| !interiors[i].is_empty())
        .collect();
    if candidates.len() <= amount {
        return candidates;
    }
    candidates.choose_multiple(rng, amount).copied().collect()
}

fn one_node_per_path<R: Rng + ?Sized>(
    interiors: &[Vec<NodeId>],
    amount: usize,
    rng: &mut R,
) -> BTreeSet<NodeId> {
    sample_paths(interiors, amount, rng)
        .into_iter()
        .filter_map(|i| interiors[i].choose(rng).copied())
        .collect()
}

impl Attacker {
    /// Builds an attacker against `target` and makes its first selection.
    ///
    /// `all_nodes` is the topology's node set, used by strategies that may
    /// watch any relay.
    pub fn create<R: Rng + ?Sized>(
        spec: AttackerSpec,
        target: &Flow,
        all_nodes: &[NodeId],
        rng: &mut R,
    ) -> Result<Self> {
        if spec.hop_period == 0 {
            return Err(SimulationError::ZeroHopPeriod);
        }

        let strategy = match spec.kind {
            AttackerKind::RandomNodeHopping => {
                let mut node_collection: Vec<NodeId> = all_nodes
                    .iter()
                    .copied()
                    .filter(|&n| n != target.source_node() && n != target.sink_node())
                    .collect();
                node_collection.sort();
                node_collection.dedup();
                Strategy::RandomNodeHopping { node_collection }
            }
            AttackerKind::RandomPathHopping => Strategy::RandomPathHopping {
                first_hops: first_hops(target),
            },
            AttackerKind::IdealRandomPathHopping => Strategy::IdealRandomPathHopping {
                interiors: path_interiors(target),
            },
            AttackerKind::OneNodePerPath => Strategy::OneNodePerPath {
                interiors: path_interiors(target),
            },
            AttackerKind::Fixed => Strategy::Fixed {
                interiors: path_interiors(target),
            },
            AttackerKind::Planned => Strategy::Planned(PlannedSweep::new(path_interiors(target))),
            AttackerKind::Total => Strategy::Total {
                first_hops: first_hops(target),
            },
        };

        let mut attacker = Attacker {
            kind: spec.kind,
            target: target.flow_id(),
            n: target.n(),
            k: target.k(),
            budget: spec.budget.unwrap_or(target.k()),
            hop_period: spec.hop_period,
            monitored_nodes: BTreeSet::new(),
            captured_shares: Vec::new(),
            hop_count: 0,
            strategy,
        };
        attacker.reselect(rng);
        Ok(attacker)
    }

    pub fn kind(&self) -> AttackerKind {
        self.kind
    }

    pub fn target(&self) -> FlowId {
        self.target
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn hop_period(&self) -> u64 {
        self.hop_period
    }

    pub fn monitored_nodes(&self) -> &BTreeSet<NodeId> {
        &self.monitored_nodes
    }

    pub fn captured_shares(&self) -> &[Share] {
        &self.captured_shares
    }

    pub fn hop_count(&self) -> u64 {
        self.hop_count
    }

    /// Path indices the planned strategy has seen traffic on during its
    /// current sweep. `None` for every other strategy.
    pub fn observed_paths(&self) -> Option<&BTreeSet<usize>> {
        match &self.strategy {
            Strategy::Planned(sweep) => Some(&sweep.active_paths),
            _ => None,
        }
    }

    /// Re-selects the monitored set when `tick` falls on the hop period.
    /// Fixed and total attackers keep their creation-time selection.
    pub fn select_monitored_nodes<R: Rng + ?Sized>(&mut self, tick: u64, rng: &mut R) {
        if self.kind.is_static() || tick % self.hop_period != 0 {
            return;
        }
        self.reselect(rng);
    }

    fn reselect<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let budget = self.budget;
        self.monitored_nodes = match &mut self.strategy {
            Strategy::RandomNodeHopping { node_collection } => {
                sample_nodes(node_collection, budget, rng)
            }
            Strategy::RandomPathHopping { first_hops } => sample_nodes(first_hops, budget, rng),
            Strategy::IdealRandomPathHopping { interiors } => sample_paths(interiors, budget, rng)
                .into_iter()
                .flat_map(|i| interiors[i].iter().copied())
                .collect(),
            Strategy::OneNodePerPath { interiors } | Strategy::Fixed { interiors } => {
                one_node_per_path(interiors, budget, rng)
            }
            Strategy::Planned(sweep) => sweep.next_selection(budget),
            Strategy::Total { first_hops } => first_hops.iter().copied().collect(),
        };
        self.hop_count += 1;
        debug!(
            "Attacker {} hop {} monitoring {:?}",
            self.kind, self.hop_count, self.monitored_nodes
        );
    }

    /// Captures from every monitored node present in `nodes`.
    pub fn monitor(&mut self, nodes: &BTreeMap<NodeId, Node>) {
        let monitored: Vec<NodeId> = self.monitored_nodes.iter().copied().collect();
        for node_id in monitored {
            match nodes.get(&node_id) {
                Some(node) => self.capture_shares(node),
                None => debug!("Attacker {} cannot see unknown node {}", self.kind, node_id),
            }
        }
    }

    pub fn capture_shares(&mut self, node: &Node) {
        let shares = node.vulnerable_shares();
        if let Strategy::Planned(sweep) = &mut self.strategy {
            sweep.active_paths.extend(
                shares
                    .iter()
                    .filter(|s| s.flow_id == self.target)
                    .map(|s| s.share_index),
            );
        }
        self.captured_shares.extend(shares);
    }

    /// Sequence numbers of target-flow messages for which the attacker holds
    /// shares with `K` distinct share indices, in ascending order.
    pub fn reconstruct_captured_messages(&self) -> Vec<u64> {
        let mut indices_by_message: BTreeMap<u64, BTreeSet<usize>> = BTreeMap::new();
        for share in self.captured_shares.iter().filter(|s| s.flow_id == self.target) {
            indices_by_message
                .entry(share.sequence_number)
                .or_default()
                .insert(share.share_index);
        }
        indices_by_message
            .into_iter()
            .filter(|(_, indices)| indices.len() >= self.k)
            .map(|(sequence_number, _)| sequence_number)
            .collect()
    }

    pub fn log_state(&self) {
        let captured_messages = self.reconstruct_captured_messages();
        info!(
            "🕵️ {} attacker captured {} shares, recovered {} messages, hopped {} times",
            self.kind,
            self.captured_shares.len(),
            captured_messages.len(),
            self.hop_count
        );
    }
}

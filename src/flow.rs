use core::fmt;
use std::collections::{BTreeMap, BTreeSet};

use rand::seq::{index, IteratorRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::{
    DEFAULT_FLOW_HOP_PERIOD, DEFAULT_K, DEFAULT_N, MAX_DATA_VOLUME, MIN_DATA_VOLUME,
};
use crate::error::{Result, SimulationError};
use crate::node::NodeId;
use crate::share::Share;
use crate::topology::Topology;

/// Identifier of a flow, assigned by the simulation in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowId(pub u32);

impl FlowId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shape of a flow: path count, threshold, hop period and the range its data
/// volume is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSpec {
    pub n: usize,
    pub k: usize,
    pub hop_period: u64,
    pub min_data_volume: u64,
    pub max_data_volume: u64,
}

impl FlowSpec {
    pub fn new(n: usize, k: usize) -> Self {
        FlowSpec {
            n,
            k,
            ..FlowSpec::default()
        }
    }

    pub fn with_hop_period(mut self, hop_period: u64) -> Self {
        self.hop_period = hop_period;
        self
    }

    pub fn data_volume(&self) -> (u64, u64) {
        (self.min_data_volume, self.max_data_volume)
    }
}

impl Default for FlowSpec {
    fn default() -> Self {
        FlowSpec {
            n: DEFAULT_N,
            k: DEFAULT_K,
            hop_period: DEFAULT_FLOW_HOP_PERIOD,
            min_data_volume: MIN_DATA_VOLUME,
            max_data_volume: MAX_DATA_VOLUME,
        }
    }
}

/// Where a share goes after the node it currently sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextHop {
    Forward(NodeId),
    /// The share is at the end of its path and belongs to the sink flow.
    Deliver,
}

/// A source→sink communication spread over `N` node-disjoint paths, of which
/// `K` carry shares at any moment.
///
/// Each tick the flow emits one message as `K` shares, one per active path.
/// A share's route is bound to the path index it was created for, so
/// re-rolling the active set never reroutes shares already in flight. The
/// sink reconstructs a message once `K` distinct share indices have arrived.
#[derive(Debug, Clone)]
pub struct Flow {
    flow_id: FlowId,
    source_node: NodeId,
    sink_node: NodeId,
    data_volume: u64,
    paths: Vec<Vec<NodeId>>,
    active_paths: Vec<usize>,
    n: usize,
    k: usize,
    hop_period: u64,
    sequence_counter: u64,
    pending_receipts: BTreeMap<u64, BTreeSet<usize>>,
    messages_tx: u64,
    messages_rx: u64,
    shares_created: u64,
}

impl Flow {
    /// Creates a flow over the first `n` of `paths`.
    ///
    /// Fails if the threshold is not `0 < k <= n` or if fewer than `n` paths
    /// were supplied. The active set is empty until the first [`Flow::hop`];
    /// [`Flow::create_random_flow`] and the simulation take care of that.
    pub fn new(
        flow_id: FlowId,
        source_node: NodeId,
        sink_node: NodeId,
        data_volume: u64,
        mut paths: Vec<Vec<NodeId>>,
        n: usize,
        k: usize,
    ) -> Result<Self> {
        if k == 0 || k > n {
            return Err(SimulationError::InvalidThreshold { k, n });
        }
        if paths.len() < n {
            return Err(SimulationError::InsufficientDisjointPaths {
                requested: n,
                available: paths.len(),
                source_node,
                sink_node,
            });
        }
        paths.truncate(n);

        Ok(Flow {
            flow_id,
            source_node,
            sink_node,
            data_volume,
            paths,
            active_paths: Vec::new(),
            n,
            k,
            hop_period: DEFAULT_FLOW_HOP_PERIOD,
            sequence_counter: 0,
            pending_receipts: BTreeMap::new(),
            messages_tx: 0,
            messages_rx: 0,
            shares_created: 0,
        })
    }

    /// Picks two distinct random endpoints and a random data volume, then
    /// routes the flow over node-disjoint paths between them.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::InsufficientDisjointPaths`] when the
    /// topology cannot offer `n` disjoint paths between the chosen endpoints.
    pub fn create_random_flow<R: Rng + ?Sized>(
        flow_id: FlowId,
        topology: &Topology,
        n: usize,
        k: usize,
        data_volume: (u64, u64),
        rng: &mut R,
    ) -> Result<Self> {
        let endpoints = topology.nodes().choose_multiple(rng, 2);
        if endpoints.len() < 2 {
            return Err(SimulationError::TopologyTooSmall {
                required: 2,
                found: endpoints.len(),
            });
        }
        // choose_multiple keeps input order; shuffle which end is the source.
        let (source_node, sink_node) = if rng.gen_bool(0.5) {
            (endpoints[0], endpoints[1])
        } else {
            (endpoints[1], endpoints[0])
        };
        let (min_volume, max_volume) = data_volume;
        let volume = rng.gen_range(min_volume..=max_volume.max(min_volume));
        info!(
            "🌊 Source {}, Sink {}, Volume {}",
            source_node, sink_node, volume
        );

        let paths = topology.node_disjoint_paths(source_node, sink_node)?;
        let mut flow = Flow::new(flow_id, source_node, sink_node, volume, paths, n, k)?;
        flow.hop(0, rng);
        Ok(flow)
    }

    /// Sets how many ticks pass between re-rolls of the active path set.
    ///
    /// Zero is clamped to 1 here; the simulation's `add_flow` methods reject
    /// a zero period with [`SimulationError::ZeroHopPeriod`] instead.
    pub fn with_hop_period(mut self, hop_period: u64) -> Self {
        self.hop_period = hop_period.max(1);
        self
    }

    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    pub fn source_node(&self) -> NodeId {
        self.source_node
    }

    pub fn sink_node(&self) -> NodeId {
        self.sink_node
    }

    pub fn data_volume(&self) -> u64 {
        self.data_volume
    }

    pub fn paths(&self) -> &[Vec<NodeId>] {
        &self.paths
    }

    pub fn active_paths(&self) -> &[usize] {
        &self.active_paths
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn hop_period(&self) -> u64 {
        self.hop_period
    }

    pub fn messages_tx(&self) -> u64 {
        self.messages_tx
    }

    pub fn messages_rx(&self) -> u64 {
        self.messages_rx
    }

    pub fn shares_created(&self) -> u64 {
        self.shares_created
    }

    /// Messages emitted but not yet reconstructed at the sink.
    pub fn pending_messages(&self) -> usize {
        self.pending_receipts.len()
    }

    fn next_sequence_number(&mut self) -> u64 {
        let sequence_number = self.sequence_counter;
        self.sequence_counter += 1;
        sequence_number
    }

    /// Emits the next message as one share per active path.
    pub fn create_shares(&mut self) -> Vec<Share> {
        let sequence_number = self.next_sequence_number();
        self.messages_tx += 1;
        self.pending_receipts.insert(sequence_number, BTreeSet::new());

        let shares = Share::create_shares_for(
            self.flow_id,
            self.source_node,
            self.sink_node,
            sequence_number,
            &self.active_paths,
        );
        self.shares_created += shares.len() as u64;
        shares
    }

    /// Next node for `share` on the path it was created for.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::ShareOffPath`] if `current` is not on the
    /// share's path, or the share names a path this flow does not have.
    pub fn next_hop_for_share(&self, share: &Share, current: NodeId) -> Result<NextHop> {
        let off_path = || SimulationError::ShareOffPath {
            share: *share,
            node: current,
        };
        let path = self.paths.get(share.share_index).ok_or_else(off_path)?;
        let position = path
            .iter()
            .position(|&node| node == current)
            .ok_or_else(off_path)?;

        Ok(match path.get(position + 1) {
            Some(&next) => NextHop::Forward(next),
            None => NextHop::Deliver,
        })
    }

    /// Accepts a share at the sink. Returns `true` when this share completes
    /// its message.
    ///
    /// Repeated share indices and shares of messages that were already
    /// reconstructed are ignored.
    pub fn receive_share(&mut self, share: &Share) -> bool {
        let Some(received) = self.pending_receipts.get_mut(&share.sequence_number) else {
            debug!("Flow {} ignoring share for settled message: {}", self.flow_id, share);
            return false;
        };
        if !received.insert(share.share_index) {
            debug!("Flow {} ignoring duplicate share: {}", self.flow_id, share);
            return false;
        }
        if received.len() < self.k {
            return false;
        }

        self.pending_receipts.remove(&share.sequence_number);
        self.messages_rx += 1;
        true
    }

    /// Draws a fresh set of `K` active path indices when `tick` falls on the
    /// flow's hop period.
    pub fn hop<R: Rng + ?Sized>(&mut self, tick: u64, rng: &mut R) {
        if tick % self.hop_period != 0 {
            return;
        }
        self.active_paths = index::sample(rng, self.paths.len(), self.k).into_vec();
    }
}

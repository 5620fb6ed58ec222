use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::attacker::{Attacker, AttackerSpec};
use crate::error::{Result, SimulationError};
use crate::flow::{Flow, FlowId, FlowSpec, NextHop};
use crate::node::{Node, NodeId};
use crate::report::{AttackerReport, FlowReport, SimulationReport};
use crate::share::Share;
use crate::topology::Topology;

/// Discrete-time driver for flows, relay nodes and attackers.
///
/// The simulation owns every node, flow and attacker, plus the single seeded
/// generator all sampling draws from. Two simulations built from the same
/// topology, seed and sequence of `add_*` calls produce identical runs.
///
/// # Examples
///
/// ```rust
/// use pathhop::attacker::{AttackerKind, AttackerSpec};
/// use pathhop::flow::FlowSpec;
/// use pathhop::simulation::Simulation;
/// use pathhop::topology::{Topology, PARALLEL_SINK, PARALLEL_SOURCE};
///
/// let mut sim = Simulation::new(Topology::parallel_paths(5, 2), 42);
/// let flow = sim
///     .add_flow_between(PARALLEL_SOURCE, PARALLEL_SINK, FlowSpec::new(5, 2))
///     .unwrap();
/// sim.add_attacker(AttackerSpec::new(AttackerKind::Total, 1), flow).unwrap();
/// sim.run(100);
///
/// let report = sim.report();
/// assert_eq!(report.attackers[0].recovered_messages.len(), 100);
/// ```
#[derive(Debug, Clone)]
pub struct Simulation {
    seed: u64,
    ticks: u64,
    rng: ChaCha8Rng,
    topology: Topology,
    nodes: BTreeMap<NodeId, Node>,
    node_ids: Vec<NodeId>,
    flows: Vec<Flow>,
    attackers: Vec<Attacker>,
    dropped_shares: u64,
}

impl Simulation {
    pub fn new(topology: Topology, seed: u64) -> Self {
        let nodes: BTreeMap<NodeId, Node> = topology.nodes().map(|id| (id, Node::new(id))).collect();
        let node_ids = nodes.keys().copied().collect();
        debug!(
            "Simulation over {} nodes and {} edges, seed {}",
            topology.node_count(),
            topology.edge_count(),
            seed
        );

        Simulation {
            seed,
            ticks: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            topology,
            nodes,
            node_ids,
            flows: Vec::new(),
            attackers: Vec::new(),
            dropped_shares: 0,
        }
    }

    fn next_flow_id(&self) -> FlowId {
        FlowId(self.flows.len() as u32)
    }

    fn register_flow(&mut self, flow: Flow) -> FlowId {
        let flow_id = flow.flow_id();
        info!(
            "➕ Flow {} from {} to {} over {} paths (K = {})",
            flow_id,
            flow.source_node(),
            flow.sink_node(),
            flow.n(),
            flow.k()
        );
        self.flows.push(flow);
        flow_id
    }

    /// Registers a flow over precomputed paths. The paths are validated
    /// against the topology and the first active set is drawn immediately.
    pub fn add_flow(
        &mut self,
        source_node: NodeId,
        sink_node: NodeId,
        paths: Vec<Vec<NodeId>>,
        spec: FlowSpec,
    ) -> Result<FlowId> {
        if spec.hop_period == 0 {
            return Err(SimulationError::ZeroHopPeriod);
        }
        self.topology.validate_paths(source_node, sink_node, &paths)?;
        let (min_volume, max_volume) = spec.data_volume();
        let volume = self.rng.gen_range(min_volume..=max_volume.max(min_volume));

        let mut flow = Flow::new(
            self.next_flow_id(),
            source_node,
            sink_node,
            volume,
            paths,
            spec.n,
            spec.k,
        )?
        .with_hop_period(spec.hop_period);
        flow.hop(0, &mut self.rng);
        Ok(self.register_flow(flow))
    }

    /// Registers a flow between two given nodes, routed over node-disjoint
    /// paths found in the topology.
    pub fn add_flow_between(&mut self, source_node: NodeId, sink_node: NodeId, spec: FlowSpec) -> Result<FlowId> {
        let paths = self.topology.node_disjoint_paths(source_node, sink_node)?;
        if paths.len() < spec.n {
            return Err(SimulationError::InsufficientDisjointPaths {
                requested: spec.n,
                available: paths.len(),
                source_node,
                sink_node,
            });
        }
        self.add_flow(source_node, sink_node, paths, spec)
    }

    /// Registers a flow between two random endpoints.
    pub fn add_random_flow(&mut self, spec: FlowSpec) -> Result<FlowId> {
        if spec.hop_period == 0 {
            return Err(SimulationError::ZeroHopPeriod);
        }
        let flow = Flow::create_random_flow(
            self.next_flow_id(),
            &self.topology,
            spec.n,
            spec.k,
            spec.data_volume(),
            &mut self.rng,
        )?
        .with_hop_period(spec.hop_period);
        Ok(self.register_flow(flow))
    }

    /// Adds an attacker against `target` and returns its position in
    /// [`Simulation::attackers`].
    pub fn add_attacker(&mut self, spec: AttackerSpec, target: FlowId) -> Result<usize> {
        let flow = self
            .flows
            .get(target.index())
            .ok_or(SimulationError::UnknownFlow(target))?;
        let attacker = Attacker::create(spec, flow, &self.node_ids, &mut self.rng)?;
        info!(
            "🕵️ {} attacker targeting flow {} (hop period {})",
            attacker.kind(),
            target,
            attacker.hop_period()
        );
        self.attackers.push(attacker);
        Ok(self.attackers.len() - 1)
    }

    /// Advances the simulation by one tick.
    ///
    /// Order matters: shares are emitted, moved one hop, and the nodes are
    /// refilled before flows re-roll their active paths, and attackers look at
    /// the nodes only after this tick's shares have landed.
    pub fn step(&mut self) {
        for flow in &mut self.flows {
            let shares = flow.create_shares();
            if let Some(source) = self.nodes.get_mut(&flow.source_node()) {
                for share in shares {
                    source.receive_share(share);
                }
            }
        }

        let mut inbox: BTreeMap<NodeId, Vec<Share>> = BTreeMap::new();
        for node in self.nodes.values_mut() {
            let resident: Vec<Share> = node.resident_shares().iter().copied().collect();
            for share in resident {
                let Some(flow) = self.flows.get_mut(share.flow_id.index()) else {
                    warn!("⚠️ Dropping share of unknown flow: {}", share);
                    self.dropped_shares += 1;
                    continue;
                };
                match flow.next_hop_for_share(&share, node.node_id()) {
                    Ok(NextHop::Forward(next)) => inbox.entry(next).or_default().push(share),
                    Ok(NextHop::Deliver) => {
                        node.remove_share(&share);
                        flow.receive_share(&share);
                    }
                    Err(err) => {
                        warn!("⚠️ Dropping share: {}", err);
                        self.dropped_shares += 1;
                    }
                }
            }
            node.clear_resident_shares();
        }

        for (node_id, shares) in inbox {
            match self.nodes.get_mut(&node_id) {
                Some(node) => shares.into_iter().for_each(|share| node.receive_share(share)),
                None => {
                    warn!("⚠️ Dropping {} shares routed to unknown node {}", shares.len(), node_id);
                    self.dropped_shares += shares.len() as u64;
                }
            }
        }

        self.ticks += 1;

        for flow in &mut self.flows {
            flow.hop(self.ticks, &mut self.rng);
        }

        for attacker in &mut self.attackers {
            attacker.monitor(&self.nodes);
            attacker.select_monitored_nodes(self.ticks, &mut self.rng);
        }
    }

    /// Runs `ticks` steps.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
        debug!("Simulation reached tick {}", self.ticks);
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn nodes(&self) -> &BTreeMap<NodeId, Node> {
        &self.nodes
    }

    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    pub fn flow(&self, flow_id: FlowId) -> Option<&Flow> {
        self.flows.get(flow_id.index())
    }

    pub fn attackers(&self) -> &[Attacker] {
        &self.attackers
    }

    /// Shares dropped because their route did not match where they were.
    pub fn dropped_shares(&self) -> u64 {
        self.dropped_shares
    }

    pub fn report(&self) -> SimulationReport {
        self.build_report(false)
    }

    /// Like [`Simulation::report`], with every attacker's raw captured shares.
    pub fn report_with_captures(&self) -> SimulationReport {
        self.build_report(true)
    }

    fn build_report(&self, include_shares: bool) -> SimulationReport {
        SimulationReport {
            seed: self.seed,
            ticks: self.ticks,
            dropped_shares: self.dropped_shares,
            flows: self.flows.iter().map(FlowReport::from).collect(),
            attackers: self
                .attackers
                .iter()
                .map(|a| AttackerReport::new(a, self.flow(a.target()), include_shares))
                .collect(),
        }
    }

    pub fn log_state(&self) {
        for flow in &self.flows {
            info!(
                "🌊 Flow {}: TX {}, RX {}",
                flow.flow_id(),
                flow.messages_tx(),
                flow.messages_rx()
            );
        }
        for attacker in &self.attackers {
            attacker.log_state();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attacker::AttackerKind;
    use crate::topology::{PARALLEL_SINK, PARALLEL_SOURCE};

    fn parallel_simulation(paths: usize, path_length: usize, k: usize, seed: u64) -> (Simulation, FlowId) {
        let mut sim = Simulation::new(Topology::parallel_paths(paths, path_length), seed);
        let flow = sim
            .add_flow_between(PARALLEL_SOURCE, PARALLEL_SINK, FlowSpec::new(paths, k))
            .unwrap();
        (sim, flow)
    }

    #[test]
    fn test_shares_move_one_hop_per_tick() {
        let (mut sim, flow_id) = parallel_simulation(3, 2, 2, 1);
        sim.step();

        let flow = sim.flow(flow_id).unwrap();
        let resident: usize = sim.nodes().values().map(|n| n.resident_shares().len()).sum();
        assert_eq!(resident, 2);
        for node in sim.nodes().values() {
            for share in node.resident_shares() {
                assert_eq!(flow.paths()[share.share_index][1], node.node_id());
            }
        }
        assert!(sim.node(PARALLEL_SOURCE).unwrap().resident_shares().is_empty());
    }

    #[test]
    fn test_flow_receives_every_message() {
        // Path S, a, b, T: a message is delivered three ticks after emission.
        let (mut sim, flow_id) = parallel_simulation(4, 2, 3, 9);
        sim.run(50);

        let flow = sim.flow(flow_id).unwrap();
        assert_eq!(flow.messages_tx(), 50);
        assert_eq!(flow.messages_rx(), 47);
        assert_eq!(flow.pending_messages(), 3);
        assert_eq!(sim.dropped_shares(), 0);
    }

    #[test]
    fn test_share_conservation() {
        let (mut sim, flow_id) = parallel_simulation(6, 1, 4, 3);
        sim.run(200);

        let flow = sim.flow(flow_id).unwrap();
        assert_eq!(flow.shares_created(), 4 * flow.messages_tx());
    }

    #[test]
    fn test_share_indices_stay_in_range() {
        let (mut sim, flow_id) = parallel_simulation(5, 3, 2, 17);
        sim.add_attacker(AttackerSpec::new(AttackerKind::IdealRandomPathHopping, 1), flow_id)
            .unwrap();
        sim.run(300);

        let attacker = &sim.attackers()[0];
        assert!(!attacker.captured_shares().is_empty());
        assert!(attacker.captured_shares().iter().all(|s| s.share_index < 5));
    }

    #[test]
    fn test_total_attacker_recovers_everything() {
        let (mut sim, flow_id) = parallel_simulation(5, 2, 2, 0xCAFE_BABE);
        sim.add_attacker(AttackerSpec::new(AttackerKind::Total, 1), flow_id)
            .unwrap();
        sim.run(1000);

        let report = sim.report();
        let total = report.attacker(AttackerKind::Total).unwrap();
        assert_eq!(report.flows[0].messages_tx, 1000);
        assert_eq!(total.recovered_messages, (0..1000).collect::<Vec<u64>>());
        assert_eq!(total.recovery_ratio, 1.0);
    }

    #[test]
    fn test_fixed_attacker_recovers_about_a_tenth() {
        let (mut sim, flow_id) = parallel_simulation(5, 2, 2, 0xCAFE_BABE);
        sim.add_attacker(AttackerSpec::new(AttackerKind::Fixed, 1), flow_id)
            .unwrap();
        sim.run(1000);

        // C(2,2) / C(5,2) = 1/10 of the messages; the bounds sit far outside
        // the binomial spread (sd ~ 9.5) so only a broken model trips them.
        let recovered = sim.attackers()[0].reconstruct_captured_messages().len();
        assert!((50..=160).contains(&recovered), "recovered {}", recovered);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let run = |seed: u64| {
            let (mut sim, flow_id) = parallel_simulation(6, 3, 3, seed);
            for kind in AttackerKind::ALL {
                sim.add_attacker(AttackerSpec::new(kind, 2), flow_id).unwrap();
            }
            sim.run(250);
            sim.attackers()
                .iter()
                .map(|a| a.captured_shares().to_vec())
                .collect::<Vec<_>>()
        };

        assert_eq!(run(77), run(77));
        assert_ne!(run(77), run(78));
    }

    #[test]
    fn test_random_flow_on_complete_graph() {
        let mut sim = Simulation::new(Topology::complete(10), 0xCAFE_BABE);
        let flow_id = sim.add_random_flow(FlowSpec::new(9, 5)).unwrap();
        sim.add_attacker(AttackerSpec::new(AttackerKind::RandomPathHopping, 1), flow_id)
            .unwrap();
        sim.run(300);

        let flow = sim.flow(flow_id).unwrap();
        assert_eq!(flow.messages_tx(), 300);
        assert!(flow.messages_rx() >= 297);
        assert_eq!(sim.dropped_shares(), 0);
    }

    #[test]
    fn test_share_off_its_path_is_dropped() {
        let (mut sim, flow_id) = parallel_simulation(4, 2, 3, 9);
        let flow = sim.flow(flow_id).unwrap();
        let stray_at = flow.paths()[0][1];
        let stray = Share::new(flow_id, 99, 2, flow.source_node(), flow.sink_node());
        sim.nodes.get_mut(&stray_at).unwrap().receive_share(stray);

        sim.step();
        assert_eq!(sim.dropped_shares(), 1);
        assert!(sim.nodes().values().all(|n| !n.resident_shares().contains(&stray)));

        sim.run(49);
        let flow = sim.flow(flow_id).unwrap();
        assert_eq!(flow.messages_tx(), 50);
        assert_eq!(flow.messages_rx(), 47);
        assert_eq!(sim.dropped_shares(), 1);
    }

    #[test]
    fn test_zero_flow_hop_period_is_rejected() {
        let mut sim = Simulation::new(Topology::parallel_paths(3, 2), 0);
        let spec = FlowSpec::new(3, 2).with_hop_period(0);
        assert!(matches!(
            sim.add_flow_between(PARALLEL_SOURCE, PARALLEL_SINK, spec),
            Err(SimulationError::ZeroHopPeriod)
        ));
        assert!(matches!(sim.add_random_flow(spec), Err(SimulationError::ZeroHopPeriod)));
        assert!(sim.flows().is_empty());
    }

    #[test]
    fn test_insufficient_paths_fail_before_ticking() {
        let mut sim = Simulation::new(Topology::parallel_paths(3, 2), 0);
        let result = sim.add_flow_between(PARALLEL_SOURCE, PARALLEL_SINK, FlowSpec::new(4, 2));
        assert!(matches!(
            result,
            Err(SimulationError::InsufficientDisjointPaths { requested: 4, available: 3, .. })
        ));
        assert!(sim.flows().is_empty());
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        let mut sim = Simulation::new(Topology::parallel_paths(3, 2), 0);
        assert!(matches!(
            sim.add_attacker(AttackerSpec::new(AttackerKind::Total, 1), FlowId(3)),
            Err(SimulationError::UnknownFlow(FlowId(3)))
        ));
    }

    #[test]
    fn test_under_subscribed_attackers_watch_everything() {
        // One path with three relays; every sampling attacker has budget 5.
        let (mut sim, flow_id) = parallel_simulation(1, 3, 1, 5);
        for kind in AttackerKind::ALL {
            sim.add_attacker(AttackerSpec::new(kind, 1).with_budget(5), flow_id)
                .unwrap();
        }
        sim.run(20);

        for attacker in sim.attackers() {
            let expected = match attacker.kind() {
                AttackerKind::RandomNodeHopping | AttackerKind::IdealRandomPathHopping => 3,
                _ => 1,
            };
            assert_eq!(attacker.monitored_nodes().len(), expected, "{}", attacker.kind());
        }
    }

    #[test]
    fn test_report_includes_captures_on_request() {
        let (mut sim, flow_id) = parallel_simulation(3, 1, 2, 2);
        sim.add_attacker(AttackerSpec::new(AttackerKind::Total, 1), flow_id)
            .unwrap();
        sim.run(10);

        assert!(sim.report().attackers[0].captured_shares.is_none());
        let captured = sim.report_with_captures().attackers[0]
            .captured_shares
            .clone()
            .unwrap();
        assert_eq!(captured.len(), 20);
    }
}

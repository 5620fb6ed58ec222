use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::ford_fulkerson;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::graphmap::UnGraphMap;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tracing::debug;

use crate::error::{Result, SimulationError};
use crate::node::NodeId;

/// Source node of topologies built by [`Topology::parallel_paths`].
pub const PARALLEL_SOURCE: NodeId = NodeId(0);

/// Sink node of topologies built by [`Topology::parallel_paths`].
pub const PARALLEL_SINK: NodeId = NodeId(1);

/// A simple undirected graph of relay nodes.
///
/// Node listings are returned in ascending ID order so that every seeded run
/// samples from the same sequence.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    graph: UnGraphMap<NodeId, ()>,
}

impl Topology {
    pub fn new() -> Self {
        Topology::default()
    }

    /// Builds a topology from an edge list. Endpoints are added as nodes.
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (NodeId, NodeId)>,
    {
        let mut topology = Topology::new();
        for (u, v) in edges {
            topology.add_edge(u, v);
        }
        topology
    }

    /// `paths` parallel source→sink paths, each with `path_length` interior
    /// nodes. The source is [`PARALLEL_SOURCE`], the sink [`PARALLEL_SINK`],
    /// and interior nodes are numbered from 2 path by path.
    ///
    /// With `path_length == 0` the source and sink share a single edge, so only
    /// one disjoint path exists regardless of `paths`.
    pub fn parallel_paths(paths: usize, path_length: usize) -> Self {
        let mut topology = Topology::new();
        topology.add_node(PARALLEL_SOURCE);
        topology.add_node(PARALLEL_SINK);

        let mut next_id = 2u32;
        for _ in 0..paths {
            let mut previous = PARALLEL_SOURCE;
            for _ in 0..path_length {
                let hop = NodeId(next_id);
                next_id += 1;
                topology.add_edge(previous, hop);
                previous = hop;
            }
            topology.add_edge(previous, PARALLEL_SINK);
        }
        topology
    }

    /// The complete graph on `n` nodes, numbered `0..n`.
    pub fn complete(n: u32) -> Self {
        let mut topology = Topology::new();
        for u in 0..n {
            topology.add_node(NodeId(u));
            for v in (u + 1)..n {
                topology.add_edge(NodeId(u), NodeId(v));
            }
        }
        topology
    }

    pub fn add_node(&mut self, node: NodeId) {
        self.graph.add_node(node);
    }

    /// Adds an undirected edge. Self loops are ignored, the graph stays simple.
    pub fn add_edge(&mut self, u: NodeId, v: NodeId) {
        if u == v {
            self.add_node(u);
            return;
        }
        self.graph.add_edge(u, v, ());
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        let mut nodes: Vec<NodeId> = self.graph.nodes().collect();
        nodes.sort_unstable();
        nodes.into_iter()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.graph.contains_node(node)
    }

    pub fn has_edge(&self, u: NodeId, v: NodeId) -> bool {
        self.graph.contains_edge(u, v)
    }

    /// A maximum set of node-disjoint simple paths from `source` to `sink`.
    ///
    /// Each node other than the endpoints is split into an inbound and an
    /// outbound half joined by a unit-capacity edge, every undirected edge
    /// becomes two unit arcs, and the maximum flow of that network gives the
    /// paths. Paths are returned ordered by their first hop.
    pub fn node_disjoint_paths(&self, source: NodeId, sink: NodeId) -> Result<Vec<Vec<NodeId>>> {
        for node in [source, sink] {
            if !self.contains(node) {
                return Err(SimulationError::UnknownNode(node));
            }
        }
        if source == sink {
            return Ok(Vec::new());
        }

        let ids: Vec<NodeId> = self.nodes().collect();
        let mut network: DiGraph<NodeId, u32> = DiGraph::with_capacity(2 * ids.len(), 0);
        let mut halves: BTreeMap<NodeId, (NodeIndex, NodeIndex)> = BTreeMap::new();
        for &node in &ids {
            let inbound = network.add_node(node);
            let outbound = network.add_node(node);
            if node != source && node != sink {
                network.add_edge(inbound, outbound, 1);
            }
            halves.insert(node, (inbound, outbound));
        }
        for &u in &ids {
            let mut neighbors: Vec<NodeId> = self.graph.neighbors(u).collect();
            neighbors.sort_unstable();
            for v in neighbors {
                network.add_edge(halves[&u].1, halves[&v].0, 1);
            }
        }

        let start = halves[&source].1;
        let goal = halves[&sink].0;
        let (max_flow, flows) = ford_fulkerson(&network, start, goal);

        // Walk flow-carrying arcs out of the source, consuming each one so a
        // walk never reuses an arc of an earlier path.
        let mut carrying: Vec<bool> = flows.iter().map(|&flow| flow > 0).collect();
        let mut take_arc = |from: NodeIndex| {
            let arc = network
                .edges_directed(from, Direction::Outgoing)
                .filter(|edge| carrying[edge.id().index()])
                .min_by_key(|edge| network[edge.target()])?;
            carrying[arc.id().index()] = false;
            Some(arc.target())
        };

        let mut paths = Vec::with_capacity(max_flow as usize);
        while let Some(first) = take_arc(start) {
            let mut path = vec![source];
            let mut at = first;
            let mut complete = false;
            for _ in 0..ids.len() {
                let node = network[at];
                path.push(node);
                if at == goal {
                    complete = true;
                    break;
                }
                match take_arc(halves[&node].1) {
                    Some(next) => at = next,
                    None => break,
                }
            }
            if complete {
                paths.push(path);
            }
        }

        debug!(
            "🔀 Found {} node-disjoint paths between {} and {}",
            paths.len(),
            source,
            sink
        );
        Ok(paths)
    }

    /// Checks that every path runs from `source` to `sink` over existing
    /// edges, never revisits a node, and shares no interior node with any
    /// other path.
    pub fn validate_paths(&self, source: NodeId, sink: NodeId, paths: &[Vec<NodeId>]) -> Result<()> {
        let invalid = |index: usize, reason: String| SimulationError::InvalidPath { index, reason };
        let mut claimed: BTreeMap<NodeId, usize> = BTreeMap::new();

        for (index, path) in paths.iter().enumerate() {
            if path.len() < 2 {
                return Err(invalid(index, "a path needs at least two nodes".into()));
            }
            if path[0] != source {
                return Err(invalid(index, format!("starts at {} instead of {}", path[0], source)));
            }
            if path[path.len() - 1] != sink {
                return Err(invalid(
                    index,
                    format!("ends at {} instead of {}", path[path.len() - 1], sink),
                ));
            }
            if let Some(&node) = path.iter().find(|&&node| !self.contains(node)) {
                return Err(SimulationError::UnknownNode(node));
            }
            if let Some(hop) = path.windows(2).find(|hop| !self.has_edge(hop[0], hop[1])) {
                return Err(invalid(index, format!("no edge between {} and {}", hop[0], hop[1])));
            }

            let mut seen = BTreeSet::new();
            for &node in path {
                if !seen.insert(node) {
                    return Err(invalid(index, format!("visits {} twice", node)));
                }
            }
            for &node in &path[1..path.len() - 1] {
                if let Some(other) = claimed.insert(node, index) {
                    return Err(invalid(index, format!("shares node {} with path {}", node, other)));
                }
            }
        }
        Ok(())
    }
}

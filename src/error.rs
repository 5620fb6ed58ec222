use thiserror::Error;

use crate::flow::FlowId;
use crate::node::NodeId;
use crate::share::Share;

/// Errors raised while configuring or driving a path hopping simulation.
///
/// Everything except [`SimulationError::ShareOffPath`] is a configuration
/// error and surfaces before the first tick. `ShareOffPath` is reported by the
/// routing layer and the simulation drops the share instead of failing.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("substrate cannot accommodate path hopping flow with N = {requested} (only {available} disjoint paths between {source_node} and {sink_node})")]
    InsufficientDisjointPaths {
        requested: usize,
        available: usize,
        source_node: NodeId,
        sink_node: NodeId,
    },

    #[error("invalid threshold: K = {k}, N = {n} (need 0 < K <= N)")]
    InvalidThreshold { k: usize, n: usize },

    #[error("invalid path {index}: {reason}")]
    InvalidPath { index: usize, reason: String },

    #[error("node {0} is not part of the topology")]
    UnknownNode(NodeId),

    #[error("flow {0} is not registered")]
    UnknownFlow(FlowId),

    #[error("topology needs at least {required} nodes, found {found}")]
    TopologyTooSmall { required: usize, found: usize },

    #[error("hop period must be positive")]
    ZeroHopPeriod,

    #[error("share {share} is at node {node}, which is not on its path")]
    ShareOffPath { share: Share, node: NodeId },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("could not write default config: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode config: {0}")]
    Encode(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, SimulationError>;

use serde::{Deserialize, Serialize};

use crate::attacker::{Attacker, AttackerKind};
use crate::flow::{Flow, FlowId};
use crate::node::NodeId;
use crate::share::Share;

/// Outcome of one run, handed to whatever renders or persists results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub ticks: u64,
    pub dropped_shares: u64,
    pub flows: Vec<FlowReport>,
    pub attackers: Vec<AttackerReport>,
}

impl SimulationReport {
    pub fn attacker(&self, kind: AttackerKind) -> Option<&AttackerReport> {
        self.attackers.iter().find(|a| a.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowReport {
    pub flow_id: FlowId,
    pub source_node: NodeId,
    pub sink_node: NodeId,
    pub data_volume: u64,
    pub n: usize,
    pub k: usize,
    pub hop_period: u64,
    pub messages_tx: u64,
    pub messages_rx: u64,
    pub shares_created: u64,
}

impl From<&Flow> for FlowReport {
    fn from(flow: &Flow) -> Self {
        FlowReport {
            flow_id: flow.flow_id(),
            source_node: flow.source_node(),
            sink_node: flow.sink_node(),
            data_volume: flow.data_volume(),
            n: flow.n(),
            k: flow.k(),
            hop_period: flow.hop_period(),
            messages_tx: flow.messages_tx(),
            messages_rx: flow.messages_rx(),
            shares_created: flow.shares_created(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackerReport {
    pub kind: AttackerKind,
    pub target: FlowId,
    pub hop_period: u64,
    pub budget: usize,
    pub hop_count: u64,
    pub captured_share_count: usize,
    pub recovered_messages: Vec<u64>,
    /// Recovered messages over messages the target flow emitted.
    pub recovery_ratio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_shares: Option<Vec<Share>>,
}

impl AttackerReport {
    pub fn new(attacker: &Attacker, target: Option<&Flow>, include_shares: bool) -> Self {
        let recovered_messages = attacker.reconstruct_captured_messages();
        let emitted = target.map_or(0, Flow::messages_tx);
        let recovery_ratio = if emitted == 0 {
            0.0
        } else {
            recovered_messages.len() as f64 / emitted as f64
        };

        AttackerReport {
            kind: attacker.kind(),
            target: attacker.target(),
            hop_period: attacker.hop_period(),
            budget: attacker.budget(),
            hop_count: attacker.hop_count(),
            captured_share_count: attacker.captured_shares().len(),
            recovered_messages,
            recovery_ratio,
            captured_shares: include_shares.then(|| attacker.captured_shares().to_vec()),
        }
    }
}

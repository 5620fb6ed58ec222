use core::fmt;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::share::Share;

/// Identifier of a relay node in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A relay point that holds shares for exactly one tick.
///
/// Nodes are owned by the simulation's node registry and looked up by ID;
/// flows and attackers never hold them directly. The resident set is ordered
/// so that share propagation and capture happen in a reproducible order.
#[derive(Debug, Clone)]
pub struct Node {
    node_id: NodeId,
    resident_shares: BTreeSet<Share>,
}

impl Node {
    pub fn new(node_id: NodeId) -> Self {
        Node {
            node_id,
            resident_shares: BTreeSet::new(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn resident_shares(&self) -> &BTreeSet<Share> {
        &self.resident_shares
    }

    pub fn receive_share(&mut self, share: Share) {
        self.resident_shares.insert(share);
    }

    /// Shares in transit through this node.
    ///
    /// A share sitting at its own source or sink is held by a communicating
    /// endpoint, which the attacker cannot compromise, so it is never
    /// interceptable.
    pub fn vulnerable_shares(&self) -> Vec<Share> {
        self.resident_shares
            .iter()
            .filter(|s| s.source_node != self.node_id && s.sink_node != self.node_id)
            .copied()
            .collect()
    }

    pub fn clear_resident_shares(&mut self) {
        self.resident_shares.clear();
    }

    /// Removes a share handed off to its sink flow. Returns `false` if the
    /// share was not resident.
    pub fn remove_share(&mut self, share: &Share) -> bool {
        self.resident_shares.remove(share)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowId;

    fn share(seq: u64, index: usize) -> Share {
        Share::new(FlowId(0), seq, index, NodeId(0), NodeId(9))
    }

    #[test]
    fn test_receive_is_idempotent() {
        let mut node = Node::new(NodeId(3));
        node.receive_share(share(0, 1));
        node.receive_share(share(0, 1));
        assert_eq!(node.resident_shares().len(), 1);
    }

    #[test]
    fn test_endpoint_shares_are_not_vulnerable() {
        let mut source = Node::new(NodeId(0));
        let mut sink = Node::new(NodeId(9));
        let mut relay = Node::new(NodeId(4));
        for node in [&mut source, &mut sink, &mut relay] {
            node.receive_share(share(0, 0));
            node.receive_share(share(0, 1));
        }

        assert!(source.vulnerable_shares().is_empty());
        assert!(sink.vulnerable_shares().is_empty());
        assert_eq!(relay.vulnerable_shares().len(), 2);
    }

    #[test]
    fn test_clear_and_remove() {
        let mut node = Node::new(NodeId(2));
        node.receive_share(share(1, 0));
        node.receive_share(share(1, 1));

        assert!(node.remove_share(&share(1, 0)));
        assert!(!node.remove_share(&share(1, 0)));
        assert_eq!(node.resident_shares().len(), 1);

        node.clear_resident_shares();
        assert!(node.resident_shares().is_empty());
        assert!(node.vulnerable_shares().is_empty());
    }
}

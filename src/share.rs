use core::fmt;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::flow::FlowId;
use crate::node::NodeId;

/// One fragment of a message travelling along a single path.
///
/// Shares are opaque tokens: they carry no payload, only enough tags to tell
/// which message they belong to and which path they were created for. Two
/// shares are the same share when their `(flow_id, sequence_number,
/// share_index)` triple matches; the endpoints are derived from the flow and
/// take no part in identity.
///
/// # Examples
///
/// ```rust
/// use pathhop::flow::FlowId;
/// use pathhop::node::NodeId;
/// use pathhop::share::Share;
///
/// let shares = Share::create_shares_for(FlowId(0), NodeId(0), NodeId(1), 7, &[2, 4]);
/// assert_eq!(shares.len(), 2);
/// assert_eq!(shares[1].share_index, 4);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Share {
    pub flow_id: FlowId,
    pub sequence_number: u64,
    /// Index of the flow path this share was created for.
    pub share_index: usize,
    pub source_node: NodeId,
    pub sink_node: NodeId,
}

impl Share {
    pub fn new(
        flow_id: FlowId,
        sequence_number: u64,
        share_index: usize,
        source_node: NodeId,
        sink_node: NodeId,
    ) -> Self {
        Share {
            flow_id,
            sequence_number,
            share_index,
            source_node,
            sink_node,
        }
    }

    /// Creates one share per path index in `paths_for_message`, all tagged
    /// with the same sequence number.
    pub fn create_shares_for(
        flow_id: FlowId,
        source_node: NodeId,
        sink_node: NodeId,
        sequence_number: u64,
        paths_for_message: &[usize],
    ) -> Vec<Share> {
        paths_for_message
            .iter()
            .map(|&share_index| {
                Share::new(flow_id, sequence_number, share_index, source_node, sink_node)
            })
            .collect()
    }

    fn key(&self) -> (FlowId, u64, usize) {
        (self.flow_id, self.sequence_number, self.share_index)
    }
}

impl PartialEq for Share {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Share {}

impl Hash for Share {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Share {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Share {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "flow {} seq {} share {}",
            self.flow_id, self.sequence_number, self.share_index
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_ignores_endpoints() {
        let a = Share::new(FlowId(1), 3, 0, NodeId(0), NodeId(9));
        let b = Share::new(FlowId(1), 3, 0, NodeId(5), NodeId(6));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn test_create_shares_for_tags_every_path() {
        let shares = Share::create_shares_for(FlowId(2), NodeId(0), NodeId(1), 11, &[4, 0, 3]);
        let indices: Vec<usize> = shares.iter().map(|s| s.share_index).collect();
        assert_eq!(indices, vec![4, 0, 3]);
        assert!(shares.iter().all(|s| s.sequence_number == 11 && s.flow_id == FlowId(2)));
    }

    #[test]
    fn test_ordering_follows_sequence_then_index() {
        let mut shares = vec![
            Share::new(FlowId(0), 2, 1, NodeId(0), NodeId(1)),
            Share::new(FlowId(0), 1, 3, NodeId(0), NodeId(1)),
            Share::new(FlowId(0), 2, 0, NodeId(0), NodeId(1)),
        ];
        shares.sort();
        let keys: Vec<(u64, usize)> = shares
            .iter()
            .map(|s| (s.sequence_number, s.share_index))
            .collect();
        assert_eq!(keys, vec![(1, 3), (2, 0), (2, 1)]);
    }
}

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// 0 is reserved for the graph's destination
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    pub const DESTINATION: NodeId = NodeId(0);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::DESTINATION {
            write!(f, "destination")
        } else {
            write!(f, "node#{}", self.0)
        }
    }
}

// fancy atomic counter lets the control thread hand out ids without asking the audio thread
pub fn next_node_id() -> NodeId {
    NodeId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

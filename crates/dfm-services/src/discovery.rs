//! The discovery-mode output: one advice tree (or nothing, if the node needed no
//! advice) per node in the submitted block.

use std::collections::HashMap;

use dfm_core::block::NodeId;
use dfm_discovery::SerializedAdvice;
use serde::{Deserialize, Serialize};

/// Aggregated discovery result for a whole `Execute` block, written as a single
/// `Value` response per the execute service's discovery-mode contract.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct DiscoveryResponse {
    /// Each submitted node's advice tree root, or `None` when the node declared no
    /// advisors (or every field was already validly supplied).
    pub nodes: HashMap<NodeId, Option<SerializedAdvice>>,
}

impl DiscoveryResponse {
    #[must_use]
    pub fn new() -> Self {
        DiscoveryResponse::default()
    }

    pub fn insert(&mut self, node_id: NodeId, advice: Option<SerializedAdvice>) {
        self.nodes.insert(node_id, advice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn round_trips_through_json() {
        let mut response = DiscoveryResponse::new();
        response.insert(Uuid::new_v4(), None);
        let encoded = serde_json::to_value(&response).unwrap();
        let decoded: DiscoveryResponse = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.nodes.len(), 1);
    }
}

//! Server-level configuration for the dispatch runtime.

use serde::Deserialize;

/// Configuration shared by the orchestrator and drain-aware helpers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Identifier of this node, stamped as the `origin` of outbound calls
    /// when set. Empty means "unnamed node".
    pub node_id: String,
    /// Interval between drain-poll checks while waiting for in-flight work
    /// to finish during shutdown, in milliseconds.
    pub drain_poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            drain_poll_interval_ms: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert!(config.node_id.is_empty());
        assert_eq!(config.drain_poll_interval_ms, 10);
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: ServerConfig =
            serde_json::from_str(r#"{ "node_id": "node-1" }"#).unwrap();
        assert_eq!(config.node_id, "node-1");
        assert_eq!(config.drain_poll_interval_ms, 10);
    }
}

//! Statistics over tree-sitter JSON parse output.

use crate::{Error, Result};
use serde_json::Value;

/// Node that tree-sitter inserts where input failed to parse.
const ERROR_NODE: &str = "ERROR";

/// Root type recorded when the root node has no usable `type`.
const UNKNOWN_ROOT: &str = "unknown";

/// Summary of a parse tree, as recorded on parse events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeStats {
    pub node_count: u64,
    pub has_errors: bool,
    pub root_node_type: String,
}

impl TreeStats {
    /// Reads `{"root_node": {...}}` parse output.
    ///
    /// Only a missing or non-object `root_node` is rejected.
    pub fn from_output(output: &Value) -> Result<Self> {
        let root = output
            .get("root_node")
            .filter(|node| node.is_object())
            .ok_or_else(|| Error::Validation("parse output must include a 'root_node' object".into()))?;

        let root_node_type = root
            .get("type")
            .and_then(Value::as_str)
            .filter(|ty| !ty.is_empty())
            .unwrap_or(UNKNOWN_ROOT);

        Ok(Self {
            node_count: count_nodes(root),
            has_errors: has_errors(root),
            root_node_type: root_node_type.to_string(),
        })
    }
}

/// Counts `node` and all its descendants. Non-object nodes count zero.
pub fn count_nodes(node: &Value) -> u64 {
    if !node.is_object() {
        return 0;
    }
    1 + children(node).map(count_nodes).sum::<u64>()
}

/// Whether `node` or any descendant is an `ERROR` node.
pub fn has_errors(node: &Value) -> bool {
    if node.get("type").and_then(Value::as_str) == Some(ERROR_NODE) {
        return true;
    }
    children(node).any(has_errors)
}

fn children(node: &Value) -> impl Iterator<Item = &Value> {
    node.get("children")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counts_nested_nodes() {
        let root = json!({
            "type": "document",
            "children": [
                {"type": "object", "children": [{"type": "pair"}, {"type": "pair"}]},
                {"type": "comment"},
                "not a node"
            ]
        });
        assert_eq!(count_nodes(&root), 5);
        assert!(!has_errors(&root));
    }

    #[test]
    fn test_detects_nested_error_node() {
        let root = json!({
            "type": "document",
            "children": [{"type": "object", "children": [{"type": "ERROR"}]}]
        });
        assert!(has_errors(&root));
    }

    #[test]
    fn test_stats_from_output() {
        let output = json!({"root_node": {"type": "program", "children": [{"type": "ERROR"}]}});
        let stats = TreeStats::from_output(&output).unwrap();
        assert_eq!(
            stats,
            TreeStats {
                node_count: 2,
                has_errors: true,
                root_node_type: "program".to_string(),
            }
        );
    }

    #[test]
    fn test_untyped_root_is_recorded_as_unknown() {
        let output = json!({"root_node": {"children": [{"type": "ERROR"}]}});
        let stats = TreeStats::from_output(&output).unwrap();
        assert_eq!(stats.node_count, 2);
        assert!(stats.has_errors);
        assert_eq!(stats.root_node_type, "unknown");

        let numeric = TreeStats::from_output(&json!({"root_node": {"type": 7}})).unwrap();
        assert_eq!(numeric.root_node_type, "unknown");
    }

    #[test]
    fn test_rejects_missing_root_node() {
        assert!(TreeStats::from_output(&json!({})).is_err());
        assert!(TreeStats::from_output(&json!({"root_node": []})).is_err());
        assert!(TreeStats::from_output(&json!({"root_node": null})).is_err());
    }
}

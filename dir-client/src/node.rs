//! Nodes, store responses and change events.

use chrono::{DateTime, Utc};

/// An entry in the store: either a leaf holding a value or a directory
/// holding children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub key: String,
    /// Empty for directories.
    pub value: String,
    pub dir: bool,
    /// Children, ordered by key. Only directories have them.
    pub nodes: Vec<Node>,
    pub created_revision: u64,
    pub modified_revision: u64,
    /// Remaining time to live in seconds, if the node expires.
    pub ttl: Option<i64>,
    pub expiration: Option<DateTime<Utc>>,
}

impl Node {
    /// Flattens the subtree below this node into a key list, parents
    /// before their children. The node's own key is not included.
    pub fn descendant_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        collect_keys(&self.nodes, &mut keys);
        keys
    }
}

fn collect_keys(nodes: &[Node], keys: &mut Vec<String>) {
    for node in nodes {
        keys.push(node.key.clone());
        collect_keys(&node.nodes, keys);
    }
}

/// What a store operation or change did to a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Action {
    #[default]
    Get,
    Set,
    Create,
    Update,
    Delete,
    Expire,
}

/// A store reply. Watches yield the same shape, one per change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub action: Action,
    pub node: Node,
    pub prev_node: Option<Node>,
    /// For reads, the store's revision at the time of the read; for
    /// changes, the revision the change was committed at.
    pub revision: u64,
}

/// A change observed by a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub action: Action,
    pub key: String,
    /// Empty for deletions, expirations and directories.
    pub new_value: String,
    pub revision: u64,
}

impl From<Response> for ChangeEvent {
    fn from(response: Response) -> Self {
        Self {
            action: response.action,
            key: response.node.key,
            new_value: response.node.value,
            revision: response.revision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(key: &str) -> Node {
        Node {
            key: key.to_string(),
            value: "v".to_string(),
            ..Node::default()
        }
    }

    fn dir(key: &str, nodes: Vec<Node>) -> Node {
        Node {
            key: key.to_string(),
            dir: true,
            nodes,
            ..Node::default()
        }
    }

    #[test]
    fn descendant_keys_are_pre_order() {
        let tree = dir(
            "/a",
            vec![
                dir("/a/b", vec![leaf("/a/b/c"), dir("/a/b/d", vec![leaf("/a/b/d/e")])]),
                leaf("/a/f"),
            ],
        );

        assert_eq!(
            tree.descendant_keys(),
            vec!["/a/b", "/a/b/c", "/a/b/d", "/a/b/d/e", "/a/f"]
        );
    }

    #[test]
    fn leaf_has_no_descendants() {
        assert!(leaf("/x").descendant_keys().is_empty());
    }
}

//! Path-addressable record of every state transition.
//!
//! The tree is append-only: nodes are created once at insertion and only gain
//! children afterward. All mutation happens on the orchestrating task, so no
//! locking is needed.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::TreeError;

/// Fixed label the root sentinel lives under in snapshots.
pub const ROOT_LABEL: &str = "Initial_State";

/// One state in the tree, children keyed by the action label that led to them.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub state_description: String,
    pub next_steps: BTreeMap<String, TreeNode>,
}

impl TreeNode {
    fn new(description: impl Into<String>) -> Self {
        Self {
            state_description: description.into(),
            next_steps: BTreeMap::new(),
        }
    }
}

/// Hierarchical record of all generated states, addressed by the sequence of
/// action labels taken from the root.
#[derive(Debug, Clone, Serialize)]
pub struct StateTree {
    root: TreeNode,
}

impl StateTree {
    /// Roots the tree at the seed state.
    pub fn new(seed_description: &str) -> Self {
        Self {
            root: TreeNode::new(seed_description),
        }
    }

    /// Attaches `description` as a child under `action_label` at the node
    /// addressed by `path` (action labels from the root; the sentinel is not
    /// a segment).
    ///
    /// A missing intermediate segment is a hard error: the source
    /// implementation patched one over with a placeholder node, which only
    /// masks broken path bookkeeping upstream.
    pub fn insert(
        &mut self,
        path: &[String],
        action_label: &str,
        description: &str,
    ) -> Result<(), TreeError> {
        let mut node = &mut self.root;
        for segment in path {
            node = node
                .next_steps
                .get_mut(segment)
                .ok_or_else(|| TreeError::MissingSegment {
                    path: path.to_vec(),
                    segment: segment.clone(),
                })?;
        }
        node.next_steps
            .insert(action_label.to_string(), TreeNode::new(description));
        Ok(())
    }

    /// The node addressed by `path`, if present.
    pub fn get(&self, path: &[String]) -> Option<&TreeNode> {
        let mut node = &self.root;
        for segment in path {
            node = node.next_steps.get(segment)?;
        }
        Some(node)
    }

    /// Longest root-to-leaf distance in action hops.
    pub fn depth(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            node.next_steps
                .values()
                .map(walk)
                .max()
                .map_or(0, |deepest| deepest + 1)
        }
        walk(&self.root)
    }

    /// Full tree as a serializable nested mapping rooted under
    /// [`ROOT_LABEL`]. Pure; calling it twice without intervening mutation
    /// yields structurally identical values.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({ ROOT_LABEL: self.root })
    }
}

//! The mind map document: a rooted tree of nodes with a single selection.
//!
//! All structural operations validate before they mutate, so a failed call
//! leaves the map unchanged. The map is mutated only through these
//! operations; the collaboration layer never touches nodes directly.

use std::collections::HashMap;

use thiserror::Error;
use uuid::Uuid;

use crate::node::Node;

/// Errors from document operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("node {0} not found")]
    NodeNotFound(Uuid),
    #[error("node {0} already exists")]
    DuplicateNodeId(Uuid),
    #[error("node {0} still has children")]
    NodeHasChildren(Uuid),
    #[error("child index {index} out of range for node {parent} (len {len})")]
    IndexOutOfRange {
        parent: Uuid,
        index: usize,
        len: usize,
    },
    #[error("the root node cannot be removed or moved")]
    RootImmovable,
    #[error("moving {node} under {new_parent} would create a cycle")]
    WouldCreateCycle { node: Uuid, new_parent: Uuid },
}

/// A tree-structured note document.
#[derive(Debug, Clone)]
pub struct MindMap {
    nodes: HashMap<Uuid, Node>,
    root_id: Uuid,
    selected: Option<Uuid>,
}

impl MindMap {
    pub fn new(root_text: impl Into<String>) -> Self {
        Self::with_root(Uuid::new_v4(), root_text)
    }

    /// Create a map whose root carries an explicit id. Replicas of a shared
    /// map must agree on node identity, root included.
    pub fn with_root(root_id: Uuid, root_text: impl Into<String>) -> Self {
        let root = Node::with_id(root_id, root_text);
        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        Self {
            nodes,
            root_id,
            selected: None,
        }
    }

    pub fn root_id(&self) -> Uuid {
        self.root_id
    }

    pub fn root(&self) -> &Node {
        &self.nodes[&self.root_id]
    }

    pub fn selected(&self) -> Option<&Node> {
        self.selected.and_then(|id| self.nodes.get(&id))
    }

    pub fn get(&self, id: Uuid) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all nodes in unspecified order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    fn get_checked(&self, id: Uuid) -> Result<&Node, DocumentError> {
        self.nodes.get(&id).ok_or(DocumentError::NodeNotFound(id))
    }

    /// Insert a new node with an explicit id under `parent` at `index`.
    pub fn insert_node(
        &mut self,
        parent: Uuid,
        index: usize,
        id: Uuid,
        text: &str,
    ) -> Result<(), DocumentError> {
        if self.nodes.contains_key(&id) {
            return Err(DocumentError::DuplicateNodeId(id));
        }
        let parent_node = self.get_checked(parent)?;
        let len = parent_node.children.len();
        if index > len {
            return Err(DocumentError::IndexOutOfRange { parent, index, len });
        }

        let mut node = Node::with_id(id, text);
        node.parent = Some(parent);
        self.nodes.insert(id, node);
        self.nodes
            .get_mut(&parent)
            .expect("parent checked above")
            .children
            .insert(index, id);
        Ok(())
    }

    /// Remove a leaf node, returning it together with its former child index.
    ///
    /// Non-leaf nodes are rejected so that the inverse of a delete is a
    /// single insert; callers delete subtrees bottom-up.
    pub fn remove_node(&mut self, id: Uuid) -> Result<(Node, usize), DocumentError> {
        if id == self.root_id {
            return Err(DocumentError::RootImmovable);
        }
        let node = self.get_checked(id)?;
        if !node.is_leaf() {
            return Err(DocumentError::NodeHasChildren(id));
        }
        let parent = node.parent.ok_or(DocumentError::RootImmovable)?;

        let node = self.nodes.remove(&id).expect("node checked above");
        let siblings = &mut self
            .nodes
            .get_mut(&parent)
            .expect("parent links are maintained by insert/move")
            .children;
        let index = siblings
            .iter()
            .position(|c| *c == id)
            .expect("child listed in its parent");
        siblings.remove(index);
        if self.selected == Some(id) {
            self.selected = None;
        }
        Ok((node, index))
    }

    /// Replace the text of a node, returning the previous text.
    pub fn set_text(&mut self, id: Uuid, text: &str) -> Result<String, DocumentError> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(DocumentError::NodeNotFound(id))?;
        Ok(std::mem::replace(&mut node.text, text.to_string()))
    }

    /// Fold or unfold a node, returning the previous folded state.
    pub fn set_folded(&mut self, id: Uuid, folded: bool) -> Result<bool, DocumentError> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(DocumentError::NodeNotFound(id))?;
        Ok(std::mem::replace(&mut node.folded, folded))
    }

    /// Move a node under `new_parent` at `new_index`.
    ///
    /// Returns the previous (parent, index) position.
    pub fn move_node(
        &mut self,
        id: Uuid,
        new_parent: Uuid,
        new_index: usize,
    ) -> Result<(Uuid, usize), DocumentError> {
        if id == self.root_id {
            return Err(DocumentError::RootImmovable);
        }
        self.get_checked(id)?;
        self.get_checked(new_parent)?;
        if self.is_ancestor(id, new_parent) {
            return Err(DocumentError::WouldCreateCycle { node: id, new_parent });
        }

        let old_parent = self.nodes[&id].parent.ok_or(DocumentError::RootImmovable)?;
        let old_index = self.nodes[&old_parent]
            .children
            .iter()
            .position(|c| *c == id)
            .expect("child listed in its parent");

        // Bounds are checked against the sibling list after removal so that
        // moving to the tail of the same parent is valid.
        let mut len = self.nodes[&new_parent].children.len();
        if new_parent == old_parent {
            len -= 1;
        }
        if new_index > len {
            return Err(DocumentError::IndexOutOfRange {
                parent: new_parent,
                index: new_index,
                len,
            });
        }

        self.nodes
            .get_mut(&old_parent)
            .expect("checked above")
            .children
            .remove(old_index);
        self.nodes
            .get_mut(&new_parent)
            .expect("checked above")
            .children
            .insert(new_index, id);
        self.nodes.get_mut(&id).expect("checked above").parent = Some(new_parent);
        Ok((old_parent, old_index))
    }

    /// Select a node, returning the previously selected id.
    pub fn select(&mut self, id: Uuid) -> Result<Option<Uuid>, DocumentError> {
        self.get_checked(id)?;
        Ok(std::mem::replace(&mut self.selected, Some(id)))
    }

    pub fn clear_selection(&mut self) -> Option<Uuid> {
        self.selected.take()
    }

    /// True if `node` lies on the path from `other` up to the root
    /// (including `other` itself).
    fn is_ancestor(&self, node: Uuid, other: Uuid) -> bool {
        let mut cursor = Some(other);
        while let Some(id) = cursor {
            if id == node {
                return true;
            }
            cursor = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }
}

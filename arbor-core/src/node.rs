use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One node of the mind map tree.
///
/// Children are stored as an ordered id list; the node map in
/// [`crate::MindMap`] owns the nodes themselves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: Uuid,
    pub text: String,
    /// Collapsed in the outline view.
    pub folded: bool,
    pub children: Vec<Uuid>,
    pub parent: Option<Uuid>,
}

impl Node {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            folded: false,
            children: Vec::new(),
            parent: None,
        }
    }

    /// Create with an explicit id. Replicated inserts reuse the originating
    /// node id so both documents agree on identity.
    pub fn with_id(id: Uuid, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            folded: false,
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

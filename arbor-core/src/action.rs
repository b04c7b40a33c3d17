//! Reversible edit capture.
//!
//! Every committed edit is captured as an [`ActionPair`]: the mutation that
//! was performed and the mutation that exactly reverses it, derived from the
//! document state at capture time. Pairs feed the local undo history and are
//! what the collaboration layer ships to the peer.

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::document::{DocumentError, MindMap};

/// A single document mutation, serializable for transmission.
///
/// Node ids are carried explicitly so that replaying an action on a replica
/// produces structurally identical documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    SelectNode { node: Uuid },
    ClearSelection,
    InsertNode {
        id: Uuid,
        parent: Uuid,
        index: usize,
        text: String,
    },
    DeleteNode { id: Uuid },
    SetNodeText { id: Uuid, text: String },
    MoveNode {
        id: Uuid,
        parent: Uuid,
        index: usize,
    },
    FoldNode { id: Uuid, folded: bool },
}

impl Action {
    /// The wire tag of this action, as used in the serialized `type` field.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Action::SelectNode { .. } => "select_node",
            Action::ClearSelection => "clear_selection",
            Action::InsertNode { .. } => "insert_node",
            Action::DeleteNode { .. } => "delete_node",
            Action::SetNodeText { .. } => "set_node_text",
            Action::MoveNode { .. } => "move_node",
            Action::FoldNode { .. } => "fold_node",
        }
    }

    /// All recognized wire tags.
    pub const KNOWN_TYPES: [&'static str; 7] = [
        "select_node",
        "clear_selection",
        "insert_node",
        "delete_node",
        "set_node_text",
        "move_node",
        "fold_node",
    ];

    /// Apply this action to a document.
    pub fn apply(&self, map: &mut MindMap) -> Result<(), DocumentError> {
        match self {
            Action::SelectNode { node } => {
                map.select(*node)?;
            }
            Action::ClearSelection => {
                map.clear_selection();
            }
            Action::InsertNode {
                id,
                parent,
                index,
                text,
            } => map.insert_node(*parent, *index, *id, text)?,
            Action::DeleteNode { id } => {
                map.remove_node(*id)?;
            }
            Action::SetNodeText { id, text } => {
                map.set_text(*id, text)?;
            }
            Action::MoveNode { id, parent, index } => {
                map.move_node(*id, *parent, *index)?;
            }
            Action::FoldNode { id, folded } => {
                map.set_folded(*id, *folded)?;
            }
        }
        Ok(())
    }
}

/// One atomic, reversible edit: the mutation and its exact inverse.
///
/// Invariant: `undo_action` reverses `do_action` when applied to the state
/// `do_action` was derived from. The pair is immutable once captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPair {
    do_action: Action,
    undo_action: Action,
}

impl ActionPair {
    pub fn new(do_action: Action, undo_action: Action) -> Self {
        Self {
            do_action,
            undo_action,
        }
    }

    pub fn do_action(&self) -> &Action {
        &self.do_action
    }

    pub fn undo_action(&self) -> &Action {
        &self.undo_action
    }
}

/// Failure to apply an action to the local document, e.g. a remote action
/// referencing a node that no longer exists here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("action failed: {0}")]
pub struct ActionApplyError(#[from] pub DocumentError);

/// The document-mutation seam.
///
/// The replication controller applies remote edits only through this trait;
/// it never owns or touches the document itself.
pub trait ActionApplier {
    fn execute_action(&mut self, pair: &ActionPair) -> Result<(), ActionApplyError>;
}

/// Owns the document, captures local edits as [`ActionPair`]s and keeps the
/// undo/redo history.
pub struct ActionFactory {
    map: MindMap,
    undo_stack: Vec<ActionPair>,
    redo_stack: Vec<ActionPair>,
}

impl ActionFactory {
    pub fn new(map: MindMap) -> Self {
        Self {
            map,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    pub fn map(&self) -> &MindMap {
        &self.map
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Apply the pair's do-action and record the pair in the undo history.
    fn execute_pair(&mut self, pair: ActionPair) -> Result<ActionPair, ActionApplyError> {
        pair.do_action.apply(&mut self.map)?;
        debug!("executed action {}", pair.do_action.type_tag());
        self.undo_stack.push(pair.clone());
        self.redo_stack.clear();
        Ok(pair)
    }

    /// Insert a fresh node under `parent` at `index`. Returns the captured
    /// pair for transmission; the new node's id is inside the do-action.
    pub fn commit_insert(
        &mut self,
        parent: Uuid,
        index: usize,
        text: &str,
    ) -> Result<ActionPair, ActionApplyError> {
        let id = Uuid::new_v4();
        let pair = ActionPair::new(
            Action::InsertNode {
                id,
                parent,
                index,
                text: text.to_string(),
            },
            Action::DeleteNode { id },
        );
        self.execute_pair(pair)
    }

    /// Delete a leaf node. The inverse restores it at its old position.
    pub fn commit_delete(&mut self, id: Uuid) -> Result<ActionPair, ActionApplyError> {
        let node = self
            .map
            .get(id)
            .ok_or(ActionApplyError(DocumentError::NodeNotFound(id)))?;
        let parent = node
            .parent
            .ok_or(ActionApplyError(DocumentError::RootImmovable))?;
        let index = self.map.get(parent).map_or(0, |p| {
            p.children.iter().position(|c| *c == id).unwrap_or(0)
        });
        let pair = ActionPair::new(
            Action::DeleteNode { id },
            Action::InsertNode {
                id,
                parent,
                index,
                text: node.text.clone(),
            },
        );
        self.execute_pair(pair)
    }

    pub fn commit_set_text(
        &mut self,
        id: Uuid,
        text: &str,
    ) -> Result<ActionPair, ActionApplyError> {
        let old = self
            .map
            .get(id)
            .ok_or(ActionApplyError(DocumentError::NodeNotFound(id)))?
            .text
            .clone();
        let pair = ActionPair::new(
            Action::SetNodeText {
                id,
                text: text.to_string(),
            },
            Action::SetNodeText { id, text: old },
        );
        self.execute_pair(pair)
    }

    pub fn commit_move(
        &mut self,
        id: Uuid,
        parent: Uuid,
        index: usize,
    ) -> Result<ActionPair, ActionApplyError> {
        let node = self
            .map
            .get(id)
            .ok_or(ActionApplyError(DocumentError::NodeNotFound(id)))?;
        let old_parent = node
            .parent
            .ok_or(ActionApplyError(DocumentError::RootImmovable))?;
        let old_index = self.map.get(old_parent).map_or(0, |p| {
            p.children.iter().position(|c| *c == id).unwrap_or(0)
        });
        let pair = ActionPair::new(
            Action::MoveNode { id, parent, index },
            Action::MoveNode {
                id,
                parent: old_parent,
                index: old_index,
            },
        );
        self.execute_pair(pair)
    }

    pub fn commit_fold(
        &mut self,
        id: Uuid,
        folded: bool,
    ) -> Result<ActionPair, ActionApplyError> {
        let old = self
            .map
            .get(id)
            .ok_or(ActionApplyError(DocumentError::NodeNotFound(id)))?
            .folded;
        let pair = ActionPair::new(
            Action::FoldNode { id, folded },
            Action::FoldNode { id, folded: old },
        );
        self.execute_pair(pair)
    }

    pub fn commit_select(&mut self, id: Uuid) -> Result<ActionPair, ActionApplyError> {
        let undo = match self.map.selected() {
            Some(prev) => Action::SelectNode { node: prev.id },
            None => Action::ClearSelection,
        };
        let pair = ActionPair::new(Action::SelectNode { node: id }, undo);
        self.execute_pair(pair)
    }

    /// Undo the most recent edit. Returns the reverted pair, if any.
    pub fn undo(&mut self) -> Result<Option<ActionPair>, ActionApplyError> {
        let Some(pair) = self.undo_stack.pop() else {
            return Ok(None);
        };
        if let Err(e) = pair.undo_action.apply(&mut self.map) {
            // Leave history consistent with the document.
            self.undo_stack.push(pair);
            return Err(e.into());
        }
        self.redo_stack.push(pair.clone());
        Ok(Some(pair))
    }

    /// Re-apply the most recently undone edit.
    pub fn redo(&mut self) -> Result<Option<ActionPair>, ActionApplyError> {
        let Some(pair) = self.redo_stack.pop() else {
            return Ok(None);
        };
        if let Err(e) = pair.do_action.apply(&mut self.map) {
            self.redo_stack.push(pair);
            return Err(e.into());
        }
        self.undo_stack.push(pair.clone());
        Ok(Some(pair))
    }
}

impl ActionApplier for ActionFactory {
    fn execute_action(&mut self, pair: &ActionPair) -> Result<(), ActionApplyError> {
        // Remote pairs go through the same path as local ones: the do-action
        // is applied, the undo-action only enters the history.
        self.execute_pair(pair.clone()).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory_with_child() -> (ActionFactory, Uuid, Uuid) {
        let map = MindMap::new("root");
        let root = map.root_id();
        let mut factory = ActionFactory::new(map);
        let pair = factory.commit_insert(root, 0, "child").unwrap();
        let Action::InsertNode { id, .. } = pair.do_action() else {
            panic!("insert commit must produce an insert do-action");
        };
        (factory, root, *id)
    }

    #[test]
    fn test_commit_insert_then_undo_restores() {
        let (mut factory, _root, child) = factory_with_child();
        assert!(factory.map().contains(child));

        factory.undo().unwrap().unwrap();
        assert!(!factory.map().contains(child));
        assert_eq!(factory.map().len(), 1);

        factory.redo().unwrap().unwrap();
        assert!(factory.map().contains(child));
    }

    #[test]
    fn test_set_text_pair_is_inverse() {
        let (mut factory, _root, child) = factory_with_child();
        let pair = factory.commit_set_text(child, "renamed").unwrap();
        assert_eq!(
            pair.undo_action(),
            &Action::SetNodeText {
                id: child,
                text: "child".to_string()
            }
        );
        factory.undo().unwrap();
        assert_eq!(factory.map().get(child).unwrap().text, "child");
    }

    #[test]
    fn test_delete_pair_restores_position() {
        let (mut factory, root, child) = factory_with_child();
        let pair = factory.commit_delete(child).unwrap();
        assert!(!factory.map().contains(child));
        assert_eq!(
            pair.undo_action(),
            &Action::InsertNode {
                id: child,
                parent: root,
                index: 0,
                text: "child".to_string()
            }
        );
        factory.undo().unwrap();
        assert_eq!(factory.map().root().children, vec![child]);
    }

    #[test]
    fn test_move_pair_round_trips() {
        let (mut factory, root, a) = factory_with_child();
        let pair_b = factory.commit_insert(root, 1, "b").unwrap();
        let Action::InsertNode { id: b, .. } = *pair_b.do_action() else {
            unreachable!()
        };

        factory.commit_move(b, a, 0).unwrap();
        assert_eq!(factory.map().get(a).unwrap().children, vec![b]);

        factory.undo().unwrap();
        assert_eq!(factory.map().root().children, vec![a, b]);
        assert!(factory.map().get(a).unwrap().children.is_empty());
    }

    #[test]
    fn test_select_undo_clears_when_nothing_was_selected() {
        let (mut factory, _root, child) = factory_with_child();
        let pair = factory.commit_select(child).unwrap();
        assert_eq!(pair.undo_action(), &Action::ClearSelection);
        assert_eq!(factory.map().selected().unwrap().id, child);

        factory.undo().unwrap();
        assert!(factory.map().selected().is_none());
    }

    #[test]
    fn test_commit_clears_redo_stack() {
        let (mut factory, root, _child) = factory_with_child();
        factory.undo().unwrap();
        assert_eq!(factory.redo_depth(), 1);
        factory.commit_insert(root, 0, "other").unwrap();
        assert_eq!(factory.redo_depth(), 0);
    }

    #[test]
    fn test_execute_action_applies_do_only() {
        let (mut factory, _root, child) = factory_with_child();
        let remote = ActionPair::new(
            Action::SetNodeText {
                id: child,
                text: "from peer".to_string(),
            },
            Action::SetNodeText {
                id: child,
                text: "child".to_string(),
            },
        );
        factory.execute_action(&remote).unwrap();
        assert_eq!(factory.map().get(child).unwrap().text, "from peer");
        // The pair is in local history, so the remote edit is undoable.
        factory.undo().unwrap();
        assert_eq!(factory.map().get(child).unwrap().text, "child");
    }

    #[test]
    fn test_execute_action_failure_surfaces() {
        let (mut factory, _root, _child) = factory_with_child();
        let ghost = Uuid::new_v4();
        let remote = ActionPair::new(
            Action::DeleteNode { id: ghost },
            Action::InsertNode {
                id: ghost,
                parent: _root,
                index: 0,
                text: String::new(),
            },
        );
        let err = factory.execute_action(&remote).unwrap_err();
        assert_eq!(err, ActionApplyError(DocumentError::NodeNotFound(ghost)));
    }

    #[test]
    fn test_undo_empty_history_is_none() {
        let mut factory = ActionFactory::new(MindMap::new("root"));
        assert!(factory.undo().unwrap().is_none());
        assert!(factory.redo().unwrap().is_none());
    }

    #[test]
    fn test_action_type_tags_match_serde() {
        let action = Action::SetNodeText {
            id: Uuid::new_v4(),
            text: "t".to_string(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "set_node_text");
        assert_eq!(action.type_tag(), "set_node_text");
        assert!(Action::KNOWN_TYPES.contains(&"set_node_text"));
    }
}

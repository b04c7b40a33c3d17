//! # arbor-core — document model for the Arbor note editor
//!
//! A mind map is a rooted tree of text nodes with a single selection. Edits
//! are never applied ad hoc: each one is captured by the [`ActionFactory`]
//! as an [`ActionPair`] — the mutation plus its exact inverse — which feeds
//! both the local undo history and the collaboration layer in
//! `arbor-collab`.
//!
//! ## Modules
//!
//! - [`node`] — tree node type
//! - [`document`] — the [`MindMap`] and its structural operations
//! - [`action`] — [`Action`], [`ActionPair`], [`ActionFactory`], and the
//!   [`ActionApplier`] mutation seam

pub mod action;
pub mod document;
pub mod node;

pub use action::{Action, ActionApplier, ActionApplyError, ActionFactory, ActionPair};
pub use document::{DocumentError, MindMap};
pub use node::Node;

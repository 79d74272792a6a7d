use thiserror::Error;

use super::graph::NodeId;
use super::registry::NodeKind;

/// Every way an editing command can be refused.
///
/// None of these are fatal: a failed command leaves the store and the
/// history exactly as they were, and the caller decides whether to show an
/// upgrade prompt, revert an input, or ignore the gesture.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditorError {
    #[error("node limit reached for the current plan ({limit} nodes)")]
    CapacityExceeded { limit: usize },
    #[error("node type '{kind}' requires an upgraded plan")]
    PlanRestricted { kind: NodeKind },
    #[error("cannot connect node {node} to itself")]
    SelfLoop { node: NodeId },
    #[error("label cannot be empty")]
    EmptyLabel,
    #[error("nothing to undo")]
    NoOpUndo,
    #[error("nothing to redo")]
    NoOpRedo,
    #[error("node {0} does not exist")]
    NodeNotFound(NodeId),
    #[error("node type '{0}' is not registered")]
    UnknownKind(NodeKind),
    #[error("the diagram is in presentation mode")]
    ReadOnly,
}

impl EditorError {
    /// Errors the host answers with an upgrade prompt rather than a plain notice.
    pub fn wants_upgrade(&self) -> bool {
        matches!(self, EditorError::CapacityExceeded { .. } | EditorError::PlanRestricted { .. })
    }
}

pub type Result<T> = std::result::Result<T, EditorError>;

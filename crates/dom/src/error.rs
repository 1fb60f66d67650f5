use indextree::{NodeError, NodeId};

/// Failures of document tree operations.
#[derive(Debug, thiserror::Error)]
pub enum DomError {
    #[error("node {0:?} does not exist in this document")]
    UnknownNode(NodeId),
    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),
    #[error("node {0:?} has no parent to insert next to")]
    Orphan(NodeId),
    #[error("invalid tree operation: {0}")]
    Tree(#[from] NodeError),
    #[error("failed to parse html: {0}")]
    Parse(#[from] std::io::Error),
}

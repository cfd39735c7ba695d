//! Error types for the lazy tree core.
//!
//! Fragment problems and fetch problems are kept apart: a malformed fragment
//! is rejected as a whole, a failed fetch leaves the node revealable.

use crate::id::NodeId;
use thiserror::Error;

/// Reasons a fragment or initial payload is rejected before anything is merged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FragmentError {
    #[error("field '{field}' has {actual} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("wire id 0 is not valid (wire ids are 1-based)")]
    ZeroWireId,

    #[error("node {0} is introduced more than once")]
    DuplicateNode(NodeId),

    #[error("node {0} appears among its own descendants")]
    RootInOwnSubtree(NodeId),

    #[error("unexpanded node {0} is not introduced by this fragment")]
    UnknownUnexpanded(NodeId),

    #[error("child {0} has no entry in the payload")]
    UnknownChild(NodeId),

    #[error("unexpanded node {0} also lists children")]
    UnexpandedWithChildren(NodeId),

    #[error("node {0} has no presentation data and cannot be rendered")]
    UnrenderableRoot(NodeId),

    #[error("node {0} is already resolved with a different child list")]
    ConflictingChildren(NodeId),

    #[error("requested node {requested} but the fragment describes {actual}")]
    UnexpectedRoot { requested: NodeId, actual: NodeId },

    #[error("node {id} exceeds the store limit of {limit} nodes")]
    IdOutOfRange { id: NodeId, limit: usize },
}

/// Failures of a single fetch. The node stays in the frontier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("server returned status {0}")]
    Status(u16),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("fetch worker panicked")]
    WorkerPanicked,

    #[error("{0}")]
    Injected(String),
}

/// A single configuration field that failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

/// Crate-level error.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TreeError {
    #[error("malformed initial payload")]
    MalformedPayload(#[source] FragmentError),

    #[error("fetch of node {node} failed")]
    Fetch {
        node: NodeId,
        #[source]
        source: FetchError,
    },

    #[error("unknown display node")]
    UnknownDisplayNode,

    #[error("invalid configuration: {}", format_config_errors(.0))]
    Config(Vec<ConfigError>),

    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode JSON")]
    Json(#[from] serde_json::Error),
}

fn format_config_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, TreeError>;

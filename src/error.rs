use thiserror::Error;

use crate::sbp::BlobDesc;

/// Fatal contract violations. Any of these aborts the job compilation; edges that are merely
/// unsupported are reported as [`crate::SkipReason`] values instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("operator `{0}` is defined more than once in the job")]
    DuplicateOperator(String),

    #[error("operator `{0}` is not part of the job")]
    UnknownOperator(String),

    #[error("operator `{0}` has no placement")]
    MissingPlacement(String),

    #[error("operator `{0}` is listed in more than one placement group")]
    DuplicatePlacement(String),

    #[error("operator `{op}` consumes `{lbn}` which no operator produces")]
    UnknownBlob { op: String, lbn: String },

    #[error("operator `{op}` has no input slot `{ibn}`")]
    UnknownInputSlot { op: String, ibn: String },

    #[error("operator `{op}` has no sbp for blob `{lbn}`")]
    MissingSbp { op: String, lbn: String },

    #[error("operator `{op}` has no logical blob desc for `{lbn}`")]
    MissingBlobDesc { op: String, lbn: String },

    #[error("operator `{0}` consumes its own output")]
    SelfLoop(String),

    #[error("the job graph contains a cycle through data or ctrl edges ({visited} of {total} operators ordered)")]
    Cycle { visited: usize, total: usize },

    #[error("malformed shape {desc} for blob `{lbn}`")]
    MalformedShape { lbn: String, desc: BlobDesc },

    #[error("split axis {axis} is out of range for blob `{lbn}` with shape {desc}")]
    SplitAxisOutOfRange { lbn: String, axis: usize, desc: BlobDesc },

    #[error("operator `{name}` placed on {found} inside a subgraph placed on {expected}")]
    PlacementMismatch { name: String, expected: String, found: String },

    #[error("operator `{0}` is the last in the subgraph order but feeds a collective")]
    NoSuccessor(String),

    #[error("operator `{0}` is replaced more than once")]
    DuplicateReplacement(String),

    #[error("invalid placement: {0}")]
    InvalidPlacement(String),

    #[error("invalid sbp `{0}`")]
    InvalidSbp(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

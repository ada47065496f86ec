use crate::rule::FlowType;

/// Errors surfaced by the workflow core. Every variant is reported
/// synchronously to the caller; nothing here is retried internally.
#[derive(thiserror::Error, Debug)]
pub enum ApprovalError {
    #[error("validation failed: {0}")]
    Validation(String),
    /// Also covers cross-tenant references, so existence is never leaked.
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("unsupported approval flow: {0:?}")]
    UnsupportedFlow(FlowType),
    #[error("storage failure")]
    Store(#[from] sled::Error),
    #[error("codec failure: {0}")]
    Codec(String),
}

pub type Result<T> = std::result::Result<T, ApprovalError>;

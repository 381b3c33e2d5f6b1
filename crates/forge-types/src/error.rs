use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("unknown developer style: {0}")]
    UnknownStyle(String),

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("invalid project: {0}")]
    InvalidProject(String),
}

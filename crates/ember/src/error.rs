use crate::ber::DecodeError;
use crate::glow::{PathParseError, TreePath};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("unknown element at path {0:?}")]
    UnknownElement(String),
    #[error("missing contents at {0}")]
    MissingContents(TreePath),
    #[error("invalid connection on {path}: {reason}")]
    InvalidConnection { path: TreePath, reason: String },
    #[error("invalid request format: {0}")]
    InvalidRequestFormat(&'static str),
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("invalid node {path:?}: {reason}")]
    InvalidNode { path: String, reason: &'static str },
    #[error("invalid command {0}")]
    InvalidCommand(u32),
    #[error(transparent)]
    InvalidPath(#[from] PathParseError),
    #[error("tree definition: {0}")]
    Definition(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn unknown(path: &TreePath) -> Self {
        Error::UnknownElement(path.to_string())
    }

    pub(crate) fn invalid_connection(path: &TreePath, reason: impl Into<String>) -> Self {
        Error::InvalidConnection {
            path: path.clone(),
            reason: reason.into(),
        }
    }
}

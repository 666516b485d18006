//! Error taxonomy shared by every resolver.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResolveError>;

/// Failures reported by an event transport (relays).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("no relays configured")]
    NoRelays,

    #[error("relay {relay}: {reason}")]
    Relay { relay: String, reason: String },

    #[error("event rejected: {0}")]
    Rejected(String),

    #[error("cannot sign: {0}")]
    Signing(String),
}

/// Failures reported by a content-addressed store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Terminal failure of a single resolution call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("this repository does not exist")]
    RepositoryNotFound,

    #[error("invalid repository owner: {0}")]
    InvalidIdentity(String),

    #[error("invalid repository name: {0}")]
    InvalidRepositoryName(String),

    #[error("unsupported protocol: {0}")]
    UnsupportedScheme(String),

    #[error("{0} is a directory")]
    IsADirectory(String),

    #[error("{0} is not a directory")]
    NotADirectory(String),

    #[error("{0} does not exist")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<StoreError> for ResolveError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => ResolveError::NotFound(path),
            StoreError::Unavailable(reason) => ResolveError::StoreUnavailable(reason),
        }
    }
}

use crate::{rpc::RpcError, store::StoreError};

/// Core error type for the relay.
///
/// Adapter crates map their specific errors into this type so the application
/// layer can decide between retrying, re-prompting and giving up.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("unexpected platform response: {0}")]
    Protocol(String),

    #[error("srp error: {0}")]
    Srp(String),

    #[error("no groups or channels found")]
    NoGroupsFound,

    #[error("no valid selection after {attempts} attempts")]
    SelectionInvalid { attempts: u32 },

    #[error("operator input closed")]
    OperatorClosed,

    #[error("giving up after {attempts} consecutive failures; last error: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn as_rpc(&self) -> Option<&RpcError> {
        match self {
            Error::Rpc(e) => Some(e),
            _ => None,
        }
    }

    /// Errors that end the run regardless of the recovery policy.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::OperatorClosed | Error::RetriesExhausted { .. } | Error::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

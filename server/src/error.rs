//! Server-side error type, generalizing [`synckit_core::SyncError`] with
//! the variants specific to the connection/hub layer (spec.md §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug, Clone)]
pub enum ServerError {
    #[error(transparent)]
    Core(#[from] synckit_core::SyncError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {0:?}")]
    RateLimited(std::time::Duration),

    #[error("hub for document {0} is no longer running")]
    HubGone(String),
}

impl ServerError {
    pub fn wire_code(&self) -> synckit_core::wire::WireErrorCode {
        use synckit_core::wire::WireErrorCode;
        match self {
            ServerError::Core(e) => (e).into(),
            ServerError::AuthFailed(_) => WireErrorCode::AuthFailed,
            ServerError::RateLimited(_) => WireErrorCode::RateLimited,
            ServerError::Storage(_) | ServerError::HubGone(_) => WireErrorCode::Internal,
        }
    }
}

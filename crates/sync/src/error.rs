use vrfleet_client::ClientError;
use vrfleet_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl SyncError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Core(CoreError::Validation(message.into()))
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Client(e) => e.is_not_found(),
            Self::Core(e) => matches!(e, CoreError::NotFound { .. }),
        }
    }
}

use shoutout_storage::StoreError;
use thiserror::Error;

/// Errors surfaced by the referral engine's exposed operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found")]
    NotFound,

    #[error("invalid post url: {0}")]
    InvalidUrl(String),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => EngineError::NotFound,
            other => EngineError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        assert!(matches!(
            EngineError::from(StoreError::NotFound),
            EngineError::NotFound
        ));
        assert!(matches!(
            EngineError::from(StoreError::Backend("boom".into())),
            EngineError::Storage(_)
        ));
    }
}

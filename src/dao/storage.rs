use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by room stores regardless of the backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or refused the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A stored room exists but does not decode into the current model.
    #[error("stored room `{key}` could not be decoded")]
    Corrupted {
        key: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Wrap a backend failure that left the store unusable for this call.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a decoding error for the room stored under `key`.
    pub fn corrupted(key: impl Into<String>, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Corrupted {
            key: key.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let err = StorageError::unavailable(
            "write refused".to_string(),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.to_string(), "storage unavailable: write refused");
        assert!(err.source().is_some());

        let err = StorageError::corrupted("ROOM", io::Error::other("bad json"));
        assert_eq!(err.to_string(), "stored room `ROOM` could not be decoded");
    }
}

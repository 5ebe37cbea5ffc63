use thiserror::Error;
use tokenmint_core::{CoreError, StorageError};

pub type Result<T> = std::result::Result<T, AllocError>;

/// Errors returned by allocator construction and allocation.
///
/// Store failures pass through unmodified via the transparent `Storage`
/// variant; the allocator performs no local recovery for them.
#[derive(Debug, Clone, Error)]
pub enum AllocError {
    #[error("invalid code format: {0}")]
    InvalidFormat(String),
    #[error("sequence space exhausted for prefix '{prefix}' at width {width}")]
    WidthExhausted { prefix: String, width: u8 },
    #[error("could not reserve a unique code after {attempts} attempts")]
    Contention { attempts: u32 },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<CoreError> for AllocError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidToken(message) | CoreError::InvalidFormat(message) => {
                Self::InvalidFormat(message)
            }
        }
    }
}

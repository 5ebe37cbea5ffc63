use crate::error::StorageResult;
use crate::token::CodeToken;
use async_trait::async_trait;

/// A read-only view of a code store.
///
/// This trait provides only the read operations from [`CodeStore`]: the
/// allocator's lookup and existence probes need no write access, and
/// callers that own the terminal write can hold the full trait separately.
#[async_trait]
pub trait ReadCodeStore: Send + Sync + 'static {
    /// Returns the single code starting with `prefix` that sorts highest
    /// in descending string order, or `None` if the prefix space is empty.
    ///
    /// With fixed-width zero-padded sequences, string-descending order
    /// matches numeric-descending order, so this is the current maximum.
    /// Idempotent: two calls without intervening writes return the same
    /// value.
    async fn last_code_with_prefix(&self, prefix: &str) -> StorageResult<Option<CodeToken>>;

    /// Checks whether a code token is already present in the store.
    async fn exists(&self, token: &CodeToken) -> StorageResult<bool>;
}

#[async_trait]
pub trait CodeStore: ReadCodeStore {
    /// Reserves a code token. Returns `Err(Conflict)` if the token is
    /// already present; the store must enforce this atomically (a unique
    /// constraint at write time), since it is what closes the
    /// read-then-write race between concurrent allocators.
    async fn insert(&self, token: &CodeToken) -> StorageResult<()>;
}

use async_trait::async_trait;
use dashmap::DashSet;
use tokenmint_core::error::{StorageError, StorageResult};
use tokenmint_core::store::{CodeStore, ReadCodeStore};
use tokenmint_core::token::CodeToken;

/// In-memory implementation of the code store using a DashSet.
///
/// `insert` relies on the set's atomic insert for its check-and-reserve
/// semantics, so two tasks racing on the same token see exactly one
/// success and one `Conflict`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    codes: DashSet<String>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with existing codes, mirroring a
    /// collection that already holds allocated tokens.
    pub fn seeded<I>(codes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let store = Self::new();
        for code in codes {
            store.codes.insert(code.into());
        }
        store
    }
}

#[async_trait]
impl ReadCodeStore for InMemoryStore {
    async fn last_code_with_prefix(&self, prefix: &str) -> StorageResult<Option<CodeToken>> {
        let last = self
            .codes
            .iter()
            .filter(|code| code.starts_with(prefix))
            .map(|code| code.key().clone())
            .max();
        Ok(last.map(CodeToken::new_unchecked))
    }

    async fn exists(&self, token: &CodeToken) -> StorageResult<bool> {
        Ok(self.codes.contains(token.as_str()))
    }
}

#[async_trait]
impl CodeStore for InMemoryStore {
    async fn insert(&self, token: &CodeToken) -> StorageResult<()> {
        if self.codes.insert(token.as_str().to_owned()) {
            Ok(())
        } else {
            Err(StorageError::Conflict(token.to_string()))
        }
    }
}

use crate::clock::{Clock, SystemClock};
use crate::error::{AllocError, Result};
use jiff::Timestamp;
use std::sync::Arc;
use tokenmint_core::{CodeFormat, CodeStore, CodeToken, ReadCodeStore, StorageError};
use tracing::{debug, warn};

/// Default bound on collision retries before the degraded fallback.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Outcome of a successful allocation.
///
/// Callers that care about the uniqueness guarantee must distinguish the
/// two variants: a `Unique` token was verified absent from the store at
/// allocation time, while a `Degraded` token is a timestamp-derived
/// fallback produced after the retry budget ran out and carries only a
/// probabilistic uniqueness claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    /// Verified absent from the store when allocated.
    Unique(CodeToken),
    /// Timestamp-derived fallback; uniqueness is not guaranteed.
    Degraded(CodeToken),
}

impl Allocation {
    /// Returns the allocated token.
    pub fn token(&self) -> &CodeToken {
        match self {
            Allocation::Unique(token) | Allocation::Degraded(token) => token,
        }
    }

    /// Consumes the allocation, returning the token.
    pub fn into_token(self) -> CodeToken {
        match self {
            Allocation::Unique(token) | Allocation::Degraded(token) => token,
        }
    }

    /// Whether this allocation took the degraded fallback path.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Allocation::Degraded(_))
    }
}

/// Collision-checked sequential code allocator.
///
/// Each allocation re-derives the next sequence number from the store's
/// current maximum under the effective prefix; no counter is held in
/// memory. The read-then-check loop defends against codes committed by a
/// previous writer, not against two allocators racing within the same
/// instant — [`allocate_and_insert`](Self::allocate_and_insert) closes
/// that gap by letting the store's unique constraint arbitrate at write
/// time.
#[derive(Debug, Clone)]
pub struct Allocator<S, C = SystemClock> {
    store: Arc<S>,
    format: CodeFormat,
    max_attempts: u32,
    clock: C,
}

impl<S: ReadCodeStore> Allocator<S, SystemClock> {
    /// Creates an allocator backed by the real system clock.
    ///
    /// Fails if the format settings are invalid (empty prefix, width
    /// outside `1..=9`, separator outside the token charset).
    pub fn new(store: S, format: CodeFormat) -> Result<Self> {
        Self::with_clock(store, format, SystemClock)
    }
}

impl<S: ReadCodeStore, C: Clock> Allocator<S, C> {
    fn with_clock(store: S, format: CodeFormat, clock: C) -> Result<Self> {
        format.validate()?;
        Ok(Self {
            store: Arc::new(store),
            format,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            clock,
        })
    }

    /// Overrides the collision retry budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Allocates the next code under this allocator's format.
    ///
    /// The candidate is recomputed from the store's current maximum on
    /// every attempt, so a collision caused by another writer having
    /// advanced the sequence resolves on the next pass. After
    /// `max_attempts` collisions the degraded fallback is returned —
    /// never an error, but logged at warn level and marked
    /// [`Allocation::Degraded`] so callers can tell it apart.
    ///
    /// The returned token is *not* reserved; callers own the terminal
    /// write and should treat a store conflict on that write as a cue to
    /// re-run allocation.
    pub async fn allocate(&self) -> Result<Allocation> {
        for attempt in 1..=self.max_attempts {
            let now = self.clock.now();
            let candidate = self.next_candidate(now).await?;
            if !self.store.exists(&candidate).await? {
                return Ok(Allocation::Unique(candidate));
            }
            debug!(code = %candidate, attempt, "candidate code collided, retrying");
        }

        let fallback = self.format.render_fallback(self.clock.now());
        warn!(
            code = %fallback,
            attempts = self.max_attempts,
            "collision retries exhausted, falling back to timestamp-derived code"
        );
        Ok(Allocation::Degraded(fallback))
    }

    async fn next_candidate(&self, now: Timestamp) -> Result<CodeToken> {
        let lookup_prefix = self.format.lookup_prefix(now);
        let last = self.store.last_code_with_prefix(&lookup_prefix).await?;

        // A last code that does not parse under this format (foreign or
        // fallback code sharing the prefix) contributes no sequence; the
        // existence check below absorbs any resulting collision.
        let next = match last.and_then(|code| self.format.parse_sequence(code.as_str(), now)) {
            Some(sequence) => sequence + 1,
            None => 1,
        };

        if next > self.format.max_sequence() {
            return Err(AllocError::WidthExhausted {
                prefix: self.format.effective_prefix(now),
                width: self.format.width,
            });
        }

        Ok(self.format.render(next, now))
    }
}

impl<S: CodeStore, C: Clock> Allocator<S, C> {
    /// Allocates a code and reserves it in the store in one bounded loop.
    ///
    /// A `Conflict` from the store's insert means another allocator won
    /// the race for the candidate between our existence check and our
    /// write; the whole allocate-and-insert step is retried so the next
    /// pass observes the winner's committed code. Exhausting the budget
    /// here *is* an error ([`AllocError::Contention`]), unlike the
    /// read-only path: the caller asked for a reserved token and did not
    /// get one.
    pub async fn allocate_and_insert(&self) -> Result<Allocation> {
        for attempt in 1..=self.max_attempts {
            let allocation = self.allocate().await?;
            match self.store.insert(allocation.token()).await {
                Ok(()) => return Ok(allocation),
                Err(StorageError::Conflict(code)) => {
                    warn!(%code, attempt, "code reserved concurrently, reallocating");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(AllocError::Contention {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_clock::TestClock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokenmint_core::error::StorageResult;
    use tokenmint_storage::InMemoryStore;

    fn supplier_format() -> CodeFormat {
        CodeFormat::builder().prefix("SUPP").build()
    }

    fn fixed_clock() -> TestClock {
        TestClock::new(Timestamp::from_millisecond(1_234_567_890).unwrap())
    }

    fn allocator<S: CodeStore>(store: S) -> Allocator<S, TestClock> {
        Allocator::with_clock(store, supplier_format(), fixed_clock()).unwrap()
    }

    #[tokio::test]
    async fn empty_prefix_space_starts_at_one() {
        let alloc = allocator(InMemoryStore::new());

        let allocation = alloc.allocate().await.unwrap();
        assert_eq!(allocation, Allocation::Unique(CodeToken::new_unchecked("SUPP-0001")));
    }

    #[tokio::test]
    async fn continues_from_seeded_maximum() {
        let store = InMemoryStore::seeded([
            "SUPP-0001",
            "SUPP-0002",
            "SUPP-0003",
            "SUPP-0004",
            "SUPP-0005",
        ]);
        let alloc = allocator(store);

        let allocation = alloc.allocate().await.unwrap();
        assert_eq!(allocation.token().as_str(), "SUPP-0006");
        assert!(!allocation.is_degraded());
    }

    #[tokio::test]
    async fn sibling_prefixes_do_not_advance_the_sequence() {
        let store = InMemoryStore::seeded(["SUPPLIER-0009", "SUPP-0002"]);
        let alloc = allocator(store);

        let allocation = alloc.allocate().await.unwrap();
        assert_eq!(allocation.token().as_str(), "SUPP-0003");
    }

    #[tokio::test]
    async fn unparsable_last_code_restarts_at_one() {
        // A foreign code under the same prefix contributes no sequence.
        let store = InMemoryStore::seeded(["SUPP-LEGACY"]);
        let alloc = allocator(store);

        let allocation = alloc.allocate().await.unwrap();
        assert_eq!(allocation.token().as_str(), "SUPP-0001");
    }

    #[tokio::test]
    async fn year_segment_scopes_the_sequence() {
        let store = InMemoryStore::seeded(["PRJ-2025-0041", "PRJ-2026-0006"]);
        let format = CodeFormat::builder()
            .prefix("PRJ")
            .date_segment(Some(tokenmint_core::DateSegment::Year))
            .build();
        // 2026-01-01T00:00:00Z
        let clock = TestClock::new(Timestamp::from_second(1_767_225_600).unwrap());
        let alloc = Allocator::with_clock(store, format, clock).unwrap();

        let allocation = alloc.allocate().await.unwrap();
        assert_eq!(allocation.token().as_str(), "PRJ-2026-0007");
    }

    #[tokio::test]
    async fn width_exhaustion_is_an_error_not_a_wider_code() {
        let store = InMemoryStore::seeded(["SUPP-9999"]);
        let alloc = allocator(store);

        let err = alloc.allocate().await.unwrap_err();
        assert!(matches!(
            err,
            AllocError::WidthExhausted { ref prefix, width: 4 } if prefix == "SUPP"
        ));
    }

    #[tokio::test]
    async fn invalid_format_is_rejected_at_construction() {
        let format = CodeFormat::builder().prefix("SU PP").build();
        let err = Allocator::new(InMemoryStore::new(), format).unwrap_err();
        assert!(matches!(err, AllocError::InvalidFormat(_)));
    }

    /// Store wrapper that commits a concurrent writer's code between the
    /// allocator's last-value lookup and its existence check.
    struct InjectBeforeFirstExists {
        inner: InMemoryStore,
        injected: std::sync::Mutex<Option<&'static str>>,
    }

    #[async_trait]
    impl ReadCodeStore for InjectBeforeFirstExists {
        async fn last_code_with_prefix(&self, prefix: &str) -> StorageResult<Option<CodeToken>> {
            self.inner.last_code_with_prefix(prefix).await
        }

        async fn exists(&self, token: &CodeToken) -> StorageResult<bool> {
            let injected = self.injected.lock().unwrap().take();
            if let Some(code) = injected {
                self.inner.insert(&CodeToken::new_unchecked(code)).await?;
            }
            self.inner.exists(token).await
        }
    }

    #[async_trait]
    impl CodeStore for InjectBeforeFirstExists {
        async fn insert(&self, token: &CodeToken) -> StorageResult<()> {
            self.inner.insert(token).await
        }
    }

    #[tokio::test]
    async fn detects_concurrent_insert_and_retries_past_it() {
        let store = InjectBeforeFirstExists {
            inner: InMemoryStore::seeded([
                "SUPP-0001",
                "SUPP-0002",
                "SUPP-0003",
                "SUPP-0004",
                "SUPP-0005",
            ]),
            injected: std::sync::Mutex::new(Some("SUPP-0006")),
        };
        let alloc = allocator(store);

        // The first candidate (SUPP-0006) is taken by the injected writer
        // before the existence check; the retry must move past it rather
        // than reuse it or fail.
        let allocation = alloc.allocate().await.unwrap();
        assert_eq!(allocation, Allocation::Unique(CodeToken::new_unchecked("SUPP-0007")));
    }

    /// Store wrapper whose existence check always reports a collision.
    struct AlwaysCollides {
        inner: InMemoryStore,
        exists_calls: AtomicU32,
    }

    #[async_trait]
    impl ReadCodeStore for AlwaysCollides {
        async fn last_code_with_prefix(&self, prefix: &str) -> StorageResult<Option<CodeToken>> {
            self.inner.last_code_with_prefix(prefix).await
        }

        async fn exists(&self, _token: &CodeToken) -> StorageResult<bool> {
            self.exists_calls.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    #[async_trait]
    impl CodeStore for AlwaysCollides {
        async fn insert(&self, token: &CodeToken) -> StorageResult<()> {
            self.inner.insert(token).await
        }
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back_to_degraded_timestamp_code() {
        let store = AlwaysCollides {
            inner: InMemoryStore::new(),
            exists_calls: AtomicU32::new(0),
        };
        let alloc = allocator(store);

        let allocation = alloc.allocate().await.unwrap();
        assert!(allocation.is_degraded());
        // Low six digits of the fixed test clock's millisecond value.
        assert_eq!(allocation.token().as_str(), "SUPP-567890");
        assert_eq!(
            alloc.store.exists_calls.load(Ordering::SeqCst),
            DEFAULT_MAX_ATTEMPTS
        );
    }

    #[tokio::test]
    async fn allocate_and_insert_reserves_the_token() {
        let alloc = allocator(InMemoryStore::new());

        let allocation = alloc.allocate_and_insert().await.unwrap();
        assert_eq!(allocation.token().as_str(), "SUPP-0001");
        assert!(alloc.store.exists(allocation.token()).await.unwrap());

        let next = alloc.allocate_and_insert().await.unwrap();
        assert_eq!(next.token().as_str(), "SUPP-0002");
    }

    /// Store wrapper where a concurrent writer wins the first insert race.
    struct LoseFirstInsertRace {
        inner: InMemoryStore,
        raced: std::sync::Mutex<bool>,
    }

    #[async_trait]
    impl ReadCodeStore for LoseFirstInsertRace {
        async fn last_code_with_prefix(&self, prefix: &str) -> StorageResult<Option<CodeToken>> {
            self.inner.last_code_with_prefix(prefix).await
        }

        async fn exists(&self, token: &CodeToken) -> StorageResult<bool> {
            self.inner.exists(token).await
        }
    }

    #[async_trait]
    impl CodeStore for LoseFirstInsertRace {
        async fn insert(&self, token: &CodeToken) -> StorageResult<()> {
            let first = {
                let mut raced = self.raced.lock().unwrap();
                !std::mem::replace(&mut *raced, true)
            };
            if first {
                // The other writer's row lands first; ours hits the
                // unique constraint.
                self.inner.insert(token).await?;
                return Err(StorageError::Conflict(token.to_string()));
            }
            self.inner.insert(token).await
        }
    }

    #[tokio::test]
    async fn insert_conflict_retries_the_whole_allocation() {
        let store = LoseFirstInsertRace {
            inner: InMemoryStore::new(),
            raced: std::sync::Mutex::new(false),
        };
        let alloc = allocator(store);

        let allocation = alloc.allocate_and_insert().await.unwrap();
        // SUPP-0001 went to the concurrent writer; the retry re-reads the
        // committed state and reserves the next sequence.
        assert_eq!(allocation, Allocation::Unique(CodeToken::new_unchecked("SUPP-0002")));
    }

    /// Store wrapper whose insert always loses.
    struct NeverWinsInsert {
        inner: InMemoryStore,
    }

    #[async_trait]
    impl ReadCodeStore for NeverWinsInsert {
        async fn last_code_with_prefix(&self, prefix: &str) -> StorageResult<Option<CodeToken>> {
            self.inner.last_code_with_prefix(prefix).await
        }

        async fn exists(&self, token: &CodeToken) -> StorageResult<bool> {
            self.inner.exists(token).await
        }
    }

    #[async_trait]
    impl CodeStore for NeverWinsInsert {
        async fn insert(&self, token: &CodeToken) -> StorageResult<()> {
            Err(StorageError::Conflict(token.to_string()))
        }
    }

    #[tokio::test]
    async fn sustained_insert_contention_is_an_error() {
        let store = NeverWinsInsert {
            inner: InMemoryStore::new(),
        };
        let alloc = allocator(store);

        let err = alloc.allocate_and_insert().await.unwrap_err();
        assert!(matches!(
            err,
            AllocError::Contention {
                attempts: DEFAULT_MAX_ATTEMPTS
            }
        ));
    }

    /// Store wrapper whose reads fail outright.
    struct UnavailableStore;

    #[async_trait]
    impl ReadCodeStore for UnavailableStore {
        async fn last_code_with_prefix(&self, _prefix: &str) -> StorageResult<Option<CodeToken>> {
            Err(StorageError::Unavailable("connection refused".into()))
        }

        async fn exists(&self, _token: &CodeToken) -> StorageResult<bool> {
            Err(StorageError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn store_failures_propagate_unmodified() {
        let alloc =
            Allocator::with_clock(UnavailableStore, supplier_format(), fixed_clock()).unwrap();

        let err = alloc.allocate().await.unwrap_err();
        assert!(matches!(
            err,
            AllocError::Storage(StorageError::Unavailable(_))
        ));
    }
}

use async_trait::async_trait;
use jiff::Timestamp;
use sqlx::{MySqlPool, Row};
use tokenmint_core::error::{StorageError, StorageResult};
use tokenmint_core::store::{CodeStore, ReadCodeStore};
use tokenmint_core::token::CodeToken;

/// MySQL implementation of the code store contract.
///
/// The `code_tokens` table (see `ddl/mysql/code_tokens.sql`) has its
/// primary key on the code column, so `insert` surfaces concurrent
/// allocation of the same token as a `Conflict` rather than silently
/// overwriting. Tokens are immutable once written; there is no update or
/// delete path.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Creates a store from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a store by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

fn now_unix_seconds() -> i64 {
    Timestamp::now().as_second()
}

/// Escapes `LIKE` metacharacters in a prefix.
///
/// Validated prefixes never contain `%` or `_` wildcards that mean
/// anything to us, but `_` is a legal token character and would otherwise
/// match any single character.
fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl ReadCodeStore for MySqlStore {
    async fn last_code_with_prefix(&self, prefix: &str) -> StorageResult<Option<CodeToken>> {
        // String-descending order over fixed-width zero-padded codes is
        // numeric-descending order, so LIMIT 1 is the current maximum.
        let row = sqlx::query(
            r#"
            SELECT code
            FROM code_tokens
            WHERE code LIKE ? ESCAPE '\\'
            ORDER BY code DESC
            LIMIT 1
            "#,
        )
        .bind(format!("{}%", escape_like(prefix)))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let code: String = row.try_get("code").map_err(map_sqlx_error)?;
        Ok(Some(CodeToken::new_unchecked(code)))
    }

    async fn exists(&self, token: &CodeToken) -> StorageResult<bool> {
        let exists = sqlx::query(
            r#"
            SELECT 1
            FROM code_tokens
            WHERE code = ?
            LIMIT 1
            "#,
        )
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .is_some();

        Ok(exists)
    }
}

#[async_trait]
impl CodeStore for MySqlStore {
    async fn insert(&self, token: &CodeToken) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO code_tokens (code, created_at)
            VALUES (?, ?)
            "#,
        )
        .bind(token.as_str())
        .bind(now_unix_seconds())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StorageError::Conflict(token.to_string())),
            Err(err) => Err(map_sqlx_error(err)),
        }
    }
}

//! durable storage for quotes, backed by a sqlite connection pool.
//!
//! every operation runs as a single statement on a pooled connection, so sqlite's own write
//! serialization is what keeps id assignment atomic across concurrent callers.

use std::{
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use time::PrimitiveDateTime;

use crate::{
    constants::TIMESTAMP_FORMAT,
    error::{Result, ValidationError},
    models::quotes::{DeleteOutcome, NewQuote, Quote, Scope},
};

const MAX_CONNECTIONS: u32 = 20;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

type SharedRng = Arc<Mutex<Box<dyn RngCore + Send>>>;

#[derive(Clone)]
pub struct QuoteStore {
    pool: SqlitePool,
    rng: SharedRng,
}

impl QuoteStore {
    /// open a pool against `url`, creating the database file if it does not exist yet.
    ///
    /// the schema is not touched here, call [`QuoteStore::initialize`] afterwards.
    pub async fn connect(url: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(opts)
            .await
            .inspect_err(|e| tracing::error!(err = ?e, "an error occurred when connecting to database"))?;

        tracing::info!("connected to database (pool size: {})", MAX_CONNECTIONS);

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            rng: Arc::new(Mutex::new(Box::new(StdRng::from_entropy()))),
        }
    }

    /// replace the source used by [`QuoteStore::random_quote`].
    #[cfg(test)]
    pub fn with_rng(self, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            rng: Arc::new(Mutex::new(Box::new(rng))),
            ..self
        }
    }

    /// make sure the schema exists. safe to run on every start.
    #[tracing::instrument(skip_all)]
    pub async fn initialize(&self) -> Result<()> {
        tracing::info!("running migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .inspect_err(|e| tracing::error!(err = ?e, "an error occurred when running migrations"))?;
        tracing::info!("finished running migrations!");

        Ok(())
    }

    /// save a new quote and return the id it was given.
    ///
    /// ids only ever grow: `AUTOINCREMENT` keeps sqlite from handing out the id of a deleted
    /// row again, even if it was the largest one.
    #[tracing::instrument(skip(self))]
    pub async fn insert(&self, quote: NewQuote<'_>) -> Result<i64> {
        validate(&quote)
            .inspect_err(|e| tracing::warn!(err = %e, "rejected quote before inserting"))?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"
                INSERT INTO
                    quotes (author, content, channel, timestamp, community)
                VALUES
                    ($1, $2, $3, $4, $5)
                RETURNING id;
            "#,
        )
        .bind(quote.author)
        .bind(quote.content)
        .bind(quote.channel)
        .bind(quote.timestamp)
        .bind(quote.community)
        .fetch_one(&self.pool)
        .await
        .inspect_err(|e| tracing::error!(err = ?e, "an error occurred when inserting quote"))?;

        tracing::info!(id, "saved quote");

        Ok(id)
    }

    /// pick a quote uniformly at random, or `None` if there is nothing to pick from.
    ///
    /// the count and the pick share one read transaction, so a concurrent delete can't push
    /// the drawn offset past the end.
    #[tracing::instrument(skip(self))]
    pub async fn random_quote(&self, scope: Scope<'_>) -> Result<Option<Quote>> {
        let mut tx = self.pool.begin().await.inspect_err(
            |e| tracing::error!(err = ?e, "an error occurred when starting transaction"),
        )?;

        let count = sqlx::query_scalar::<_, i64>(
            r#"
                SELECT COUNT(*)
                FROM quotes
                WHERE $1 IS NULL OR community = $1;
            "#,
        )
        .bind(scope.community())
        .fetch_one(&mut *tx)
        .await
        .inspect_err(|e| tracing::error!(err = ?e, "an error occurred when counting quotes"))?;

        if count == 0 {
            return Ok(None);
        }

        let offset = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.gen_range(0..count)
        };

        let quote = sqlx::query_as::<_, Quote>(
            r#"
                SELECT
                    id, author, content, channel, timestamp, community
                FROM quotes
                WHERE $1 IS NULL OR community = $1
                ORDER BY id
                LIMIT 1 OFFSET $2;
            "#,
        )
        .bind(scope.community())
        .bind(offset)
        .fetch_optional(&mut *tx)
        .await
        .inspect_err(|e| tracing::error!(err = ?e, "an error occurred when fetching quote"))?;

        tx.commit().await?;

        Ok(quote)
    }

    /// every quote whose author contains `needle`, ascii case-insensitively, oldest first.
    ///
    /// `%`, `_` and `\` in the needle match themselves. an empty needle matches everything.
    #[tracing::instrument(skip(self))]
    pub async fn quotes_by_author(&self, needle: &str, scope: Scope<'_>) -> Result<Vec<Quote>> {
        let pattern = format!("%{}%", escape_like(needle));

        let quotes = sqlx::query_as::<_, Quote>(
            r#"
                SELECT
                    id, author, content, channel, timestamp, community
                FROM quotes
                WHERE
                    author LIKE $1 ESCAPE '\'
                    AND ($2 IS NULL OR community = $2)
                ORDER BY id;
            "#,
        )
        .bind(pattern)
        .bind(scope.community())
        .fetch_all(&self.pool)
        .await
        .inspect_err(
            |e| tracing::error!(err = ?e, "an error occurred when fetching quotes by author"),
        )?;

        Ok(quotes)
    }

    #[tracing::instrument(skip(self))]
    pub async fn quote_by_id(&self, id: i64) -> Result<Option<Quote>> {
        let quote = sqlx::query_as::<_, Quote>(
            r#"
                SELECT
                    id, author, content, channel, timestamp, community
                FROM quotes
                WHERE id = $1;
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .inspect_err(|e| tracing::error!(err = ?e, "an error occurred when fetching quote"))?;

        Ok(quote)
    }

    /// remove a quote. permission checks are up to the caller.
    #[tracing::instrument(skip(self))]
    pub async fn delete_by_id(&self, id: i64) -> Result<DeleteOutcome> {
        let result = sqlx::query(
            r#"
                DELETE FROM quotes
                WHERE id = $1;
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .inspect_err(|e| tracing::error!(err = ?e, "an error occurred when deleting quote"))?;

        if result.rows_affected() == 0 {
            return Ok(DeleteOutcome::NotFound);
        }

        tracing::info!(id, "deleted quote");

        Ok(DeleteOutcome::Deleted)
    }

    #[tracing::instrument(skip(self))]
    pub async fn count(&self, scope: Scope<'_>) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
                SELECT COUNT(*)
                FROM quotes
                WHERE $1 IS NULL OR community = $1;
            "#,
        )
        .bind(scope.community())
        .fetch_one(&self.pool)
        .await
        .inspect_err(|e| tracing::error!(err = ?e, "an error occurred when counting quotes"))?;

        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn validate(quote: &NewQuote<'_>) -> std::result::Result<(), ValidationError> {
    let fields = [
        ("author", quote.author),
        ("content", quote.content),
        ("channel", quote.channel),
        ("timestamp", quote.timestamp),
        ("community", quote.community),
    ];

    for (field, value) in fields {
        if value.trim().is_empty() {
            return Err(ValidationError::Empty { field });
        }
    }

    if PrimitiveDateTime::parse(quote.timestamp, TIMESTAMP_FORMAT).is_err() {
        return Err(ValidationError::MalformedTimestamp {
            value: quote.timestamp.to_string(),
        });
    }

    Ok(())
}

fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());

    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use tempfile::TempDir;

    use super::*;
    use crate::error::StoreError;

    async fn test_store() -> (TempDir, QuoteStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("quotes.db").display());

        let store = QuoteStore::connect(&url).await.unwrap();
        store.initialize().await.unwrap();

        (dir, store)
    }

    fn quote_by(author: &'static str) -> NewQuote<'static> {
        NewQuote {
            author,
            content: "hello there",
            channel: "general",
            timestamp: "2024-01-01 00:00:00",
            community: "guild1",
        }
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let (_dir, store) = test_store().await;
        let id = store.insert(quote_by("Alice")).await.unwrap();

        store.initialize().await.unwrap();
        store.initialize().await.unwrap();

        assert!(store.quote_by_id(id).await.unwrap().is_some());
        assert_eq!(store.count(Scope::Global).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ids_increase_strictly() {
        let (_dir, store) = test_store().await;

        let mut ids = Vec::new();
        for _ in 0..10 {
            ids.push(store.insert(quote_by("Alice")).await.unwrap());
        }

        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_get_distinct_ids() {
        let (_dir, store) = test_store().await;

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.insert(quote_by("Alice")).await.unwrap() })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }

        assert_eq!(ids.len(), 32);
        assert_eq!(store.count(Scope::Global).await.unwrap(), 32);
    }

    #[tokio::test]
    async fn inserted_quote_is_readable_immediately() {
        let (_dir, store) = test_store().await;

        let new = NewQuote {
            author: "Carol",
            content: "ship it",
            channel: "dev",
            timestamp: "2024-03-04 05:06:07",
            community: "GuildY",
        };
        let id = store.insert(new).await.unwrap();

        let quote = store.quote_by_id(id).await.unwrap().unwrap();
        assert_eq!(
            quote,
            Quote {
                id,
                author: "Carol".into(),
                content: "ship it".into(),
                channel: "dev".into(),
                timestamp: "2024-03-04 05:06:07".into(),
                community: "GuildY".into(),
            }
        );
    }

    #[tokio::test]
    async fn delete_is_terminal() {
        let (_dir, store) = test_store().await;
        let id = store.insert(quote_by("Alice")).await.unwrap();

        assert_eq!(store.delete_by_id(id).await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(store.quote_by_id(id).await.unwrap(), None);
        assert_eq!(store.delete_by_id(id).await.unwrap(), DeleteOutcome::NotFound);
        assert_eq!(store.delete_by_id(9999).await.unwrap(), DeleteOutcome::NotFound);
    }

    #[tokio::test]
    async fn deleted_ids_are_not_reused() {
        let (_dir, store) = test_store().await;
        store.insert(quote_by("Alice")).await.unwrap();
        let last = store.insert(quote_by("Bob")).await.unwrap();

        store.delete_by_id(last).await.unwrap();
        let next = store.insert(quote_by("Carol")).await.unwrap();

        assert!(next > last);
        assert_eq!(store.quote_by_id(last).await.unwrap(), None);
    }

    #[tokio::test]
    async fn random_quote_on_empty_store_is_none() {
        let (_dir, store) = test_store().await;

        assert_eq!(store.random_quote(Scope::Global).await.unwrap(), None);
    }

    #[tokio::test]
    async fn random_quote_follows_the_seeded_source() {
        let (_dir, store) = test_store().await;
        let store = store.with_rng(StdRng::seed_from_u64(42));

        for author in ["Alice", "Bob", "Carol", "Dave", "Eve"] {
            store.insert(quote_by(author)).await.unwrap();
        }

        let all = store.quotes_by_author("", Scope::Global).await.unwrap();
        let mut expected_rng = StdRng::seed_from_u64(42);

        for _ in 0..8 {
            let offset = expected_rng.gen_range(0..all.len() as i64);
            let expected = all[offset as usize].clone();
            assert_eq!(
                store.random_quote(Scope::Global).await.unwrap(),
                Some(expected)
            );
        }
    }

    #[tokio::test]
    async fn author_lookup_matches_substrings_in_id_order() {
        let (_dir, store) = test_store().await;
        let ana = store.insert(quote_by("Ana")).await.unwrap();
        let banana = store.insert(quote_by("Banana")).await.unwrap();
        store.insert(quote_by("Bob")).await.unwrap();

        let quotes = store.quotes_by_author("ana", Scope::Global).await.unwrap();
        let ids: Vec<i64> = quotes.iter().map(|q| q.id).collect();

        assert_eq!(ids, vec![ana, banana]);
        assert_eq!(quotes[0].author, "Ana");
        assert_eq!(quotes[1].author, "Banana");
    }

    #[tokio::test]
    async fn author_lookup_without_matches_is_empty() {
        let (_dir, store) = test_store().await;
        store.insert(quote_by("Bob")).await.unwrap();

        assert!(store
            .quotes_by_author("zed", Scope::Global)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn author_lookup_treats_wildcards_literally() {
        let (_dir, store) = test_store().await;
        let percent = store.insert(quote_by("50%off")).await.unwrap();
        let underscore = store.insert(quote_by("snake_case")).await.unwrap();
        store.insert(quote_by("fifty")).await.unwrap();
        store.insert(quote_by("snakeXcase")).await.unwrap();

        let by_percent = store.quotes_by_author("%", Scope::Global).await.unwrap();
        assert_eq!(by_percent.iter().map(|q| q.id).collect::<Vec<_>>(), vec![percent]);

        let by_underscore = store.quotes_by_author("e_c", Scope::Global).await.unwrap();
        assert_eq!(
            by_underscore.iter().map(|q| q.id).collect::<Vec<_>>(),
            vec![underscore]
        );
    }

    #[tokio::test]
    async fn empty_fields_are_rejected_without_a_trace() {
        let (_dir, store) = test_store().await;

        let err = store
            .insert(NewQuote {
                author: "",
                content: "hi",
                channel: "general",
                timestamp: "2024-01-01 00:00:00",
                community: "guild1",
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::Empty { field: "author" })
        ));
        assert!(!err.is_storage());

        let blank_channel = NewQuote {
            channel: "   ",
            ..quote_by("Alice")
        };
        assert!(matches!(
            store.insert(blank_channel).await,
            Err(StoreError::Validation(ValidationError::Empty { field: "channel" }))
        ));

        assert_eq!(store.random_quote(Scope::Global).await.unwrap(), None);
        assert!(store
            .quotes_by_author("", Scope::Global)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn malformed_timestamps_are_rejected() {
        let (_dir, store) = test_store().await;

        let quote = NewQuote {
            timestamp: "yesterday",
            ..quote_by("Alice")
        };

        assert!(matches!(
            store.insert(quote).await,
            Err(StoreError::Validation(ValidationError::MalformedTimestamp { .. }))
        ));
        assert_eq!(store.count(Scope::Global).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn community_scope_filters_reads() {
        let (_dir, store) = test_store().await;
        let here = store.insert(quote_by("Alice")).await.unwrap();
        store
            .insert(NewQuote {
                community: "elsewhere",
                ..quote_by("Alice")
            })
            .await
            .unwrap();

        let scope = Scope::Community("guild1");

        let listed = store.quotes_by_author("Alice", scope).await.unwrap();
        assert_eq!(listed.iter().map(|q| q.id).collect::<Vec<_>>(), vec![here]);
        assert_eq!(store.count(scope).await.unwrap(), 1);
        assert_eq!(store.count(Scope::Global).await.unwrap(), 2);

        for _ in 0..5 {
            let picked = store.random_quote(scope).await.unwrap().unwrap();
            assert_eq!(picked.id, here);
        }

        assert_eq!(
            store.random_quote(Scope::Community("nowhere")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn end_to_end_scenario() {
        let (_dir, store) = test_store().await;

        let alice = store
            .insert(NewQuote {
                author: "Alice",
                content: "Hello world",
                channel: "general",
                timestamp: "2024-01-01 12:00:00",
                community: "GuildX",
            })
            .await
            .unwrap();
        let bob = store
            .insert(NewQuote {
                author: "Bob",
                content: "Second quote",
                channel: "general",
                timestamp: "2024-01-02 09:00:00",
                community: "GuildX",
            })
            .await
            .unwrap();

        assert_eq!((alice, bob), (1, 2));

        let fetched = store.quote_by_id(1).await.unwrap().unwrap();
        assert_eq!(fetched.author, "Alice");
        assert_eq!(fetched.content, "Hello world");

        let by_bob = store.quotes_by_author("Bob", Scope::Global).await.unwrap();
        assert_eq!(by_bob.len(), 1);
        assert_eq!(by_bob[0].id, 2);

        assert_eq!(store.delete_by_id(1).await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(store.quote_by_id(1).await.unwrap(), None);

        let remaining = store.quote_by_id(2).await.unwrap().unwrap();
        assert_eq!(remaining.author, "Bob");
        assert_eq!(remaining.content, "Second quote");
    }

    #[tokio::test]
    async fn random_quote_reaches_every_row() {
        let (_dir, store) = test_store().await;
        let store = store.with_rng(StdRng::seed_from_u64(7));

        let mut ids = HashSet::new();
        for author in ["Alice", "Bob", "Carol"] {
            ids.insert(store.insert(quote_by(author)).await.unwrap());
        }

        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.insert(store.random_quote(Scope::Global).await.unwrap().unwrap().id);
        }

        assert_eq!(seen, ids);
    }

    #[tokio::test]
    async fn closed_store_reports_storage_errors() {
        let (_dir, store) = test_store().await;
        let id = store.insert(quote_by("Alice")).await.unwrap();

        store.close().await;

        let err = store.insert(quote_by("Bob")).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert!(err.is_storage());

        let err = store.quote_by_id(id).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert!(err.is_storage());

        assert!(store.random_quote(Scope::Global).await.unwrap_err().is_storage());
        assert!(store.delete_by_id(id).await.unwrap_err().is_storage());
    }

    #[tokio::test]
    async fn connect_fails_when_the_file_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}",
            dir.path().join("missing").join("quotes.db").display()
        );

        let err = QuoteStore::connect(&url).await.err().unwrap();
        assert!(matches!(err, StoreError::Storage(_)));
        assert!(err.is_storage());
    }

    #[test]
    fn escape_like_escapes_wildcards() {
        assert_eq!(escape_like("a%b_c\\d"), "a\\%b\\_c\\\\d");
        assert_eq!(escape_like("plain"), "plain");
    }
}

//! Message table operations for leaseq.
//!
//! This module provides the statements run against a queue's table: DDL,
//! inserts and debounce upserts, the atomic claim, lease extension and
//! finalization, counts, cleanup, and the legacy timestamp migration.
//! Policy (retry budgets, defaulting, dead-letter promotion) stays in
//! `queue.rs`.
//!
//! Table names are caller-supplied and validated as SQL identifiers before
//! a `Messages` instance exists, so rendering them into the statement
//! templates below is safe.

use crate::error::Result;
use crate::types::MessageRecord;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

// DDL for a queue table and its indexes. All statements are idempotent.
const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS "{table}" (
        id         BIGSERIAL PRIMARY KEY,
        payload    JSONB       NOT NULL,
        visible_at TIMESTAMPTZ NOT NULL,
        ack        TEXT,
        tries      INTEGER     NOT NULL DEFAULT 0,
        deleted_at TIMESTAMPTZ,
        debounce   TEXT
    );
"#;

const CREATE_CLAIM_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS "{table}_claim_idx"
    ON "{table}" (deleted_at, visible_at);
"#;

const CREATE_ACK_INDEX: &str = r#"
    CREATE UNIQUE INDEX IF NOT EXISTS "{table}_ack_idx"
    ON "{table}" (ack)
    WHERE ack IS NOT NULL;
"#;

// Also enforces that at most one pending or delayed row carries a given
// debounce key.
const CREATE_DEBOUNCE_INDEX: &str = r#"
    CREATE UNIQUE INDEX IF NOT EXISTS "{table}_debounce_idx"
    ON "{table}" (debounce)
    WHERE ack IS NULL AND deleted_at IS NULL;
"#;

const CREATE_DONE_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS "{table}_done_idx"
    ON "{table}" (deleted_at)
    WHERE deleted_at IS NOT NULL;
"#;

const INSERT_MESSAGE: &str = r#"
    INSERT INTO "{table}" (payload, visible_at)
    VALUES ($1, $2)
    RETURNING id;
"#;

const BATCH_INSERT_MESSAGES: &str = r#"
    INSERT INTO "{table}" (payload, visible_at)
    SELECT unnest($1::jsonb[]), $2
    RETURNING id;
"#;

// The conflict target must spell out the partial-index predicate, otherwise
// the planner will not match "{table}_debounce_idx". Leased and acked rows
// fall outside the predicate and are never coalesced.
const UPSERT_DEBOUNCED: &str = r#"
    INSERT INTO "{table}" (payload, visible_at, debounce)
    VALUES ($1, $2, $3)
    ON CONFLICT (debounce) WHERE ack IS NULL AND deleted_at IS NULL
    DO UPDATE SET payload = EXCLUDED.payload, visible_at = EXCLUDED.visible_at
    RETURNING id, (xmax = 0) AS inserted;
"#;

// A row whose lease expired still satisfies visible_at <= $1 and is claimed
// like any pending row; its ack token is overwritten.
const CLAIM_MESSAGE: &str = r#"
    UPDATE "{table}"
    SET tries = tries + 1,
        ack = $2,
        visible_at = $1 + make_interval(secs => $3::double precision)
    WHERE id IN (
        SELECT id
        FROM "{table}"
        WHERE deleted_at IS NULL
          AND visible_at <= $1
        ORDER BY id ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
    )
    RETURNING id, payload, visible_at, ack, tries, deleted_at, debounce;
"#;

const EXTEND_LEASE: &str = r#"
    UPDATE "{table}"
    SET visible_at = $2 + make_interval(secs => $3::double precision)
    WHERE ack = $1 AND visible_at > $2 AND deleted_at IS NULL
    RETURNING id;
"#;

const FINALIZE_MESSAGE: &str = r#"
    UPDATE "{table}"
    SET deleted_at = $2
    WHERE ack = $1 AND visible_at > $2 AND deleted_at IS NULL
    RETURNING id;
"#;

const CLEAN_ALL: &str = r#"
    DELETE FROM "{table}" WHERE deleted_at IS NOT NULL;
"#;

const CLEAN_BEFORE: &str = r#"
    DELETE FROM "{table}" WHERE deleted_at IS NOT NULL AND deleted_at <= $1;
"#;

const COUNT_TOTAL: &str = r#"
    SELECT COUNT(*) FROM "{table}";
"#;

const COUNT_CLAIMABLE: &str = r#"
    SELECT COUNT(*) FROM "{table}"
    WHERE deleted_at IS NULL AND visible_at <= $1;
"#;

const COUNT_IN_FLIGHT: &str = r#"
    SELECT COUNT(*) FROM "{table}"
    WHERE ack IS NOT NULL AND visible_at > $1 AND deleted_at IS NULL;
"#;

const COUNT_DONE: &str = r#"
    SELECT COUNT(*) FROM "{table}" WHERE deleted_at IS NOT NULL;
"#;

// Tables created before 0.2 stored timestamps as text.
const CHECK_LEGACY_TIMESTAMPS: &str = r#"
    SELECT data_type
    FROM information_schema.columns
    WHERE table_schema = current_schema()
      AND table_name = $1
      AND column_name = 'visible_at';
"#;

const MIGRATE_TIMESTAMP_COLUMNS: &str = r#"
    ALTER TABLE "{table}"
        ALTER COLUMN visible_at TYPE TIMESTAMPTZ USING visible_at::timestamptz,
        ALTER COLUMN deleted_at TYPE TIMESTAMPTZ USING deleted_at::timestamptz;
"#;

/// Statements against a single queue table.
#[derive(Debug, Clone)]
pub struct Messages {
    pub pool: PgPool,
    table: String,
}

impl Messages {
    /// Create a new Messages instance bound to `table`.
    ///
    /// The table name must already be validated as a SQL identifier.
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn render(&self, template: &str) -> String {
        template.replace("{table}", &self.table)
    }

    /// Create the table and its indexes. Idempotent.
    ///
    /// `with_done_index` additionally creates the partial index backing
    /// retention sweeps over acked rows.
    ///
    /// # Returns
    /// The name of the claim-query index.
    pub async fn create_all(&self, with_done_index: bool) -> Result<String> {
        let mut statements = vec![
            ("CREATE_TABLE", CREATE_TABLE),
            ("CREATE_CLAIM_INDEX", CREATE_CLAIM_INDEX),
            ("CREATE_ACK_INDEX", CREATE_ACK_INDEX),
            ("CREATE_DEBOUNCE_INDEX", CREATE_DEBOUNCE_INDEX),
        ];
        if with_done_index {
            statements.push(("CREATE_DONE_INDEX", CREATE_DONE_INDEX));
        }

        for (name, template) in statements {
            sqlx::query(&self.render(template))
                .execute(&self.pool)
                .await
                .map_err(|e| crate::error::Error::QueryFailed {
                    query: name.into(),
                    source: Box::new(e),
                    context: format!("Failed to create table or index for '{}'", self.table),
                })?;
        }

        tracing::debug!("Ensured table and indexes for queue '{}'", self.table);
        Ok(format!("{}_claim_idx", self.table))
    }

    /// Insert a single message, claimable at `visible_at`.
    pub async fn insert(
        &self,
        payload: &serde_json::Value,
        visible_at: DateTime<Utc>,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(&self.render(INSERT_MESSAGE))
            .bind(payload)
            .bind(visible_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| crate::error::Error::QueryFailed {
                query: "INSERT_MESSAGE".into(),
                source: Box::new(e),
                context: format!("Failed to insert message into '{}'", self.table),
            })?;

        Ok(id)
    }

    /// Insert a batch of messages in one statement.
    ///
    /// Returned ids align with the input slot order.
    pub async fn insert_many(
        &self,
        payloads: &[serde_json::Value],
        visible_at: DateTime<Utc>,
    ) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(&self.render(BATCH_INSERT_MESSAGES))
            .bind(payloads)
            .bind(visible_at)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| crate::error::Error::QueryFailed {
                query: "BATCH_INSERT_MESSAGES".into(),
                source: Box::new(e),
                context: format!(
                    "Failed to batch insert {} messages into '{}'",
                    payloads.len(),
                    self.table
                ),
            })?;

        Ok(ids)
    }

    /// Insert-or-coalesce on a debounce key.
    ///
    /// If a pending or delayed row already carries `key`, its payload is
    /// replaced and its `visible_at` pushed forward; otherwise a new row is
    /// inserted with the key.
    ///
    /// # Returns
    /// The row id and whether the statement inserted (`true`) or coalesced
    /// into an existing row (`false`).
    pub async fn upsert_debounced(
        &self,
        payload: &serde_json::Value,
        key: &str,
        visible_at: DateTime<Utc>,
    ) -> Result<(i64, bool)> {
        let row: (i64, bool) = sqlx::query_as(&self.render(UPSERT_DEBOUNCED))
            .bind(payload)
            .bind(visible_at)
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| crate::error::Error::QueryFailed {
                query: "UPSERT_DEBOUNCED".into(),
                source: Box::new(e),
                context: format!(
                    "Failed to upsert debounced message with key '{}' into '{}'",
                    key, self.table
                ),
            })?;

        Ok(row)
    }

    /// Upsert a batch of payloads on one debounce key, inside a single
    /// transaction.
    ///
    /// A multi-row `INSERT … ON CONFLICT` on one key would touch the same
    /// row twice in one statement, which PostgreSQL rejects, so the batch
    /// runs as sequential statements in one transaction.
    pub async fn upsert_debounced_many(
        &self,
        payloads: &[serde_json::Value],
        key: &str,
        visible_at: DateTime<Utc>,
    ) -> Result<Vec<(i64, bool)>> {
        let mut tx =
            self.pool
                .begin()
                .await
                .map_err(|e| crate::error::Error::TransactionFailed {
                    source: Box::new(e),
                    context: format!("Failed to begin debounce batch on '{}'", self.table),
                })?;

        let statement = self.render(UPSERT_DEBOUNCED);
        let mut results = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let row: (i64, bool) = sqlx::query_as(&statement)
                .bind(payload)
                .bind(visible_at)
                .bind(key)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| crate::error::Error::QueryFailed {
                    query: "UPSERT_DEBOUNCED".into(),
                    source: Box::new(e),
                    context: format!(
                        "Failed to upsert debounced batch with key '{}' into '{}'",
                        key, self.table
                    ),
                })?;
            results.push(row);
        }

        tx.commit()
            .await
            .map_err(|e| crate::error::Error::TransactionFailed {
                source: Box::new(e),
                context: format!("Failed to commit debounce batch on '{}'", self.table),
            })?;

        Ok(results)
    }

    /// Atomically claim the oldest claimable message.
    ///
    /// Increments `tries`, installs `ack` as the lease token, and hides the
    /// row until `now + visibility_seconds`, all in one statement. Returns
    /// the post-update row, or `None` when nothing is claimable.
    pub async fn claim(
        &self,
        now: DateTime<Utc>,
        ack: &str,
        visibility_seconds: u32,
    ) -> Result<Option<MessageRecord>> {
        let record = sqlx::query_as::<_, MessageRecord>(&self.render(CLAIM_MESSAGE))
            .bind(now)
            .bind(ack)
            .bind(visibility_seconds as i32)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| crate::error::Error::QueryFailed {
                query: "CLAIM_MESSAGE".into(),
                source: Box::new(e),
                context: format!("Failed to claim message from '{}'", self.table),
            })?;

        Ok(record)
    }

    /// Push a live lease forward to `now + visibility_seconds`.
    ///
    /// # Returns
    /// The message id, or `None` if `ack` does not match a live lease.
    pub async fn extend_lease(
        &self,
        ack: &str,
        now: DateTime<Utc>,
        visibility_seconds: u32,
    ) -> Result<Option<i64>> {
        let id: Option<i64> = sqlx::query_scalar(&self.render(EXTEND_LEASE))
            .bind(ack)
            .bind(now)
            .bind(visibility_seconds as i32)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| crate::error::Error::QueryFailed {
                query: "EXTEND_LEASE".into(),
                source: Box::new(e),
                context: format!("Failed to extend lease on '{}'", self.table),
            })?;

        Ok(id)
    }

    /// Mark a leased message done.
    ///
    /// # Returns
    /// The message id, or `None` if `ack` does not match a live lease.
    pub async fn finalize(&self, ack: &str, now: DateTime<Utc>) -> Result<Option<i64>> {
        let id: Option<i64> = sqlx::query_scalar(&self.render(FINALIZE_MESSAGE))
            .bind(ack)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| crate::error::Error::QueryFailed {
                query: "FINALIZE_MESSAGE".into(),
                source: Box::new(e),
                context: format!("Failed to finalize message on '{}'", self.table),
            })?;

        Ok(id)
    }

    /// Delete done rows, optionally only those acked at or before `cutoff`.
    ///
    /// # Returns
    /// Number of rows removed.
    pub async fn clean(&self, cutoff: Option<DateTime<Utc>>) -> Result<u64> {
        let result = match cutoff {
            Some(cutoff) => sqlx::query(&self.render(CLEAN_BEFORE))
                .bind(cutoff)
                .execute(&self.pool)
                .await,
            None => sqlx::query(&self.render(CLEAN_ALL)).execute(&self.pool).await,
        };

        let rows_affected = result
            .map_err(|e| crate::error::Error::QueryFailed {
                query: "CLEAN".into(),
                source: Box::new(e),
                context: format!("Failed to clean done messages from '{}'", self.table),
            })?
            .rows_affected();

        Ok(rows_affected)
    }

    /// Count all rows.
    pub async fn count_total(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&self.render(COUNT_TOTAL))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| crate::error::Error::QueryFailed {
                query: "COUNT_TOTAL".into(),
                source: Box::new(e),
                context: format!("Failed to count messages in '{}'", self.table),
            })?;
        Ok(count)
    }

    /// Count rows satisfying the claim filter.
    pub async fn count_claimable(&self, now: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&self.render(COUNT_CLAIMABLE))
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| crate::error::Error::QueryFailed {
                query: "COUNT_CLAIMABLE".into(),
                source: Box::new(e),
                context: format!("Failed to count claimable messages in '{}'", self.table),
            })?;
        Ok(count)
    }

    /// Count rows under a live lease.
    pub async fn count_in_flight(&self, now: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&self.render(COUNT_IN_FLIGHT))
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| crate::error::Error::QueryFailed {
                query: "COUNT_IN_FLIGHT".into(),
                source: Box::new(e),
                context: format!("Failed to count in-flight messages in '{}'", self.table),
            })?;
        Ok(count)
    }

    /// Count done rows.
    pub async fn count_done(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&self.render(COUNT_DONE))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| crate::error::Error::QueryFailed {
                query: "COUNT_DONE".into(),
                source: Box::new(e),
                context: format!("Failed to count done messages in '{}'", self.table),
            })?;
        Ok(count)
    }

    /// Rewrite legacy text timestamp columns as native `timestamptz`.
    ///
    /// Tables created before 0.2 stored `visible_at` and `deleted_at` as
    /// text. Detects the legacy layout from the catalog and converts both
    /// columns in one transaction.
    ///
    /// # Returns
    /// Number of rows carried over; 0 when the table is absent or already
    /// native.
    pub async fn migrate_legacy_timestamps(&self) -> Result<u64> {
        let data_type: Option<String> = sqlx::query_scalar(CHECK_LEGACY_TIMESTAMPS)
            .bind(&self.table)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| crate::error::Error::QueryFailed {
                query: "CHECK_LEGACY_TIMESTAMPS".into(),
                source: Box::new(e),
                context: format!("Failed to inspect column types of '{}'", self.table),
            })?;

        match data_type.as_deref() {
            Some("text") | Some("character varying") => {}
            _ => return Ok(0),
        }

        let mut tx =
            self.pool
                .begin()
                .await
                .map_err(|e| crate::error::Error::TransactionFailed {
                    source: Box::new(e),
                    context: format!("Failed to begin migration on '{}'", self.table),
                })?;

        let count: i64 = sqlx::query_scalar(&self.render(COUNT_TOTAL))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| crate::error::Error::QueryFailed {
                query: "COUNT_TOTAL".into(),
                source: Box::new(e),
                context: format!("Failed to count rows before migrating '{}'", self.table),
            })?;

        sqlx::query(&self.render(MIGRATE_TIMESTAMP_COLUMNS))
            .execute(&mut *tx)
            .await
            .map_err(|e| crate::error::Error::QueryFailed {
                query: "MIGRATE_TIMESTAMP_COLUMNS".into(),
                source: Box::new(e),
                context: format!("Failed to migrate timestamp columns of '{}'", self.table),
            })?;

        tx.commit()
            .await
            .map_err(|e| crate::error::Error::TransactionFailed {
                source: Box::new(e),
                context: format!("Failed to commit migration on '{}'", self.table),
            })?;

        tracing::info!(
            "Migrated {} rows of '{}' to native timestamps",
            count,
            self.table
        );
        Ok(count as u64)
    }
}

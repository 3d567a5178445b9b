//! SQLite state store for ClaimIndex.
//!
//! Persists the checkpoint and the processed-event log to a single SQLite
//! file. Uses `sqlx` with WAL mode; the checkpoint advance and its covering
//! events land in one transaction, as do rollbacks. A partial unique index
//! enforces at most one active record per `(tx_hash, log_index)`.
//!
//! # Usage
//! ```rust,no_run
//! use claimindex_storage::sqlite::SqliteStateStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStateStore::open("./claims.db", "base").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStateStore::in_memory("base").await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use claimindex_core::error::IndexError;
use claimindex_core::store::StateStore;
use claimindex_core::types::{Checkpoint, EventStatus, ProcessedEvent, RawChainEvent};

/// SQLite-backed state store, scoped to one chain's pipeline.
pub struct SqliteStateStore {
    pool: SqlitePool,
    chain_id: String,
}

impl SqliteStateStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./claims.db"`) or a full SQLite
    /// URL (`"sqlite:./claims.db?mode=rwc"`).
    pub async fn open(path: &str, chain_id: impl Into<String>) -> Result<Self, IndexError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let store = Self {
            pool,
            chain_id: chain_id.into(),
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests. Pinned to
    /// a single connection — each `:memory:` connection is its own database.
    pub async fn in_memory(chain_id: impl Into<String>) -> Result<Self, IndexError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;
        let store = Self {
            pool,
            chain_id: chain_id.into(),
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                chain_id     TEXT    NOT NULL PRIMARY KEY,
                block_number INTEGER NOT NULL,
                block_hash   TEXT    NOT NULL,
                updated_at   INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS events (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                chain_id         TEXT    NOT NULL,
                tx_hash          TEXT    NOT NULL,
                log_index        INTEGER NOT NULL,
                contract_address TEXT    NOT NULL,
                event_type       TEXT    NOT NULL,
                block_number     INTEGER NOT NULL,
                block_hash       TEXT    NOT NULL,
                parent_hash      TEXT    NOT NULL,
                payload          TEXT    NOT NULL,
                timestamp        INTEGER NOT NULL,
                status           TEXT    NOT NULL,
                indexed_at       INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        // At most one active record per (tx_hash, log_index); orphans are
        // exempt so replay can re-admit the same identity.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_events_active_identity
             ON events (chain_id, tx_hash, log_index) WHERE status = 'active';",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_block
             ON events (chain_id, block_number, log_index);",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn checkpoint(&self) -> Result<Option<Checkpoint>, IndexError> {
        let row = sqlx::query(
            "SELECT block_number, block_hash, updated_at
             FROM checkpoints WHERE chain_id = ?1;",
        )
        .bind(&self.chain_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| Checkpoint {
            block_number: r.get::<i64, _>("block_number") as u64,
            block_hash: r.get("block_hash"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn commit(
        &self,
        checkpoint: Checkpoint,
        events: Vec<RawChainEvent>,
    ) -> Result<(), IndexError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let indexed_at = chrono::Utc::now().timestamp();

        for event in &events {
            sqlx::query(
                "INSERT INTO events (
                    chain_id, tx_hash, log_index, contract_address, event_type,
                    block_number, block_hash, parent_hash, payload, timestamp,
                    status, indexed_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'active', ?11);",
            )
            .bind(&self.chain_id)
            .bind(&event.tx_hash)
            .bind(event.log_index as i64)
            .bind(&event.contract_address)
            .bind(&event.event_type)
            .bind(event.block_number as i64)
            .bind(&event.block_hash)
            .bind(&event.parent_hash)
            .bind(event.payload.to_string())
            .bind(event.timestamp)
            .bind(indexed_at)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        sqlx::query(
            "INSERT INTO checkpoints (chain_id, block_number, block_hash, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chain_id) DO UPDATE SET
                block_number = excluded.block_number,
                block_hash   = excluded.block_hash,
                updated_at   = excluded.updated_at;",
        )
        .bind(&self.chain_id)
        .bind(checkpoint.block_number as i64)
        .bind(&checkpoint.block_hash)
        .bind(checkpoint.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        tracing::debug!(
            chain = %self.chain_id,
            block = checkpoint.block_number,
            "checkpoint and events committed"
        );
        Ok(())
    }

    async fn rollback(&self, checkpoint: Checkpoint) -> Result<u64, IndexError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let orphaned = sqlx::query(
            "UPDATE events SET status = 'orphaned'
             WHERE chain_id = ?1 AND status = 'active' AND block_number > ?2;",
        )
        .bind(&self.chain_id)
        .bind(checkpoint.block_number as i64)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?
        .rows_affected();

        sqlx::query(
            "INSERT INTO checkpoints (chain_id, block_number, block_hash, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chain_id) DO UPDATE SET
                block_number = excluded.block_number,
                block_hash   = excluded.block_hash,
                updated_at   = excluded.updated_at;",
        )
        .bind(&self.chain_id)
        .bind(checkpoint.block_number as i64)
        .bind(&checkpoint.block_hash)
        .bind(checkpoint.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        tracing::info!(
            chain = %self.chain_id,
            block = checkpoint.block_number,
            orphaned,
            "log rolled back"
        );
        Ok(orphaned)
    }

    async fn is_active(&self, tx_hash: &str, log_index: u32) -> Result<bool, IndexError> {
        let row = sqlx::query(
            "SELECT 1 FROM events
             WHERE chain_id = ?1 AND tx_hash = ?2 AND log_index = ?3
               AND status = 'active'
             LIMIT 1;",
        )
        .bind(&self.chain_id)
        .bind(tx_hash)
        .bind(log_index as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(row.is_some())
    }

    async fn active_events(&self) -> Result<Vec<ProcessedEvent>, IndexError> {
        let rows = sqlx::query(
            "SELECT id, tx_hash, log_index, contract_address, event_type,
                    block_number, block_hash, parent_hash, payload, timestamp,
                    status, indexed_at
             FROM events
             WHERE chain_id = ?1 AND status = 'active'
             ORDER BY block_number, log_index;",
        )
        .bind(&self.chain_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.into_iter().map(row_to_event).collect()
    }
}

fn row_to_event(row: sqlx::sqlite::SqliteRow) -> Result<ProcessedEvent, IndexError> {
    let payload: String = row.get("payload");
    let payload = serde_json::from_str(&payload)
        .map_err(|e| IndexError::Storage(format!("corrupt payload column: {e}")))?;
    let status = match row.get::<String, _>("status").as_str() {
        "active" => EventStatus::Active,
        "orphaned" => EventStatus::Orphaned,
        other => return Err(IndexError::Storage(format!("unknown status '{other}'"))),
    };
    Ok(ProcessedEvent {
        id: row.get::<i64, _>("id") as u64,
        event: RawChainEvent {
            tx_hash: row.get("tx_hash"),
            log_index: row.get::<i64, _>("log_index") as u32,
            contract_address: row.get("contract_address"),
            event_type: row.get("event_type"),
            block_number: row.get::<i64, _>("block_number") as u64,
            block_hash: row.get("block_hash"),
            parent_hash: row.get("parent_hash"),
            payload,
            timestamp: row.get("timestamp"),
        },
        status,
        indexed_at: row.get("indexed_at"),
    })
}

fn storage_err(err: sqlx::Error) -> IndexError {
    IndexError::Storage(err.to_string())
}

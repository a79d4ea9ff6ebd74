//! Partition/sort-keyed document store.
//!
//! The engine's only write primitives are the ones this trait exposes:
//! point get, conditional put, partition range query, partition-prefix scan,
//! and a multi-item atomic transaction. All cross-record consistency comes
//! from these primitives; there are no in-process locks.
//!
//! The bundled implementation keeps items in a single SQLite table keyed by
//! `(pk, sk)`, which gives the conditional-write and transaction semantics
//! the engine requires.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

/// A stored item: partition key, sort key, JSON payload
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub pk: String,
    pub sk: String,
    pub payload: serde_json::Value,
}

/// Condition attached to a put
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition {
    /// Write unconditionally, replacing any existing item
    Overwrite,

    /// Write only if no item exists at (pk, sk)
    IfAbsent,
}

/// One write inside a transaction
#[derive(Debug, Clone)]
pub struct TransactPut {
    pub item: Item,
    pub condition: PutCondition,
}

/// Sort-key ordering for range queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    Ascending,
    Descending,
}

/// Options for a partition range query
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Restrict to sort keys with this prefix
    pub sk_prefix: Option<String>,

    /// Return at most this many items
    pub limit: Option<usize>,

    /// Sort-key order (default ascending)
    pub order: Option<QueryOrder>,
}

/// Errors surfaced by document store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write found the condition unmet
    #[error("conditional write failed for {pk}/{sk}")]
    ConditionFailed { pk: String, sk: String },

    /// A transaction exceeded the store's item limit; nothing was written
    #[error("transaction of {requested} items exceeds store limit of {limit}")]
    TransactTooLarge { requested: usize, limit: usize },

    /// Anything else from the underlying store
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// The document store collaborator contract
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read
    async fn get(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError>;

    /// Single conditional write
    async fn put(&self, item: Item, condition: PutCondition) -> Result<(), StoreError>;

    /// Range query within one partition
    async fn query(&self, pk: &str, options: QueryOptions) -> Result<Vec<Item>, StoreError>;

    /// Scan all items whose partition key starts with `pk_prefix`
    async fn scan_prefix(&self, pk_prefix: &str) -> Result<Vec<Item>, StoreError>;

    /// Atomic multi-item write: either every put applies or none does.
    ///
    /// Fails with [`StoreError::TransactTooLarge`] before touching the store
    /// when the item count exceeds [`DocumentStore::max_transact_items`].
    async fn transact_put(&self, puts: Vec<TransactPut>) -> Result<(), StoreError>;

    /// Maximum number of items accepted by a single transaction
    fn max_transact_items(&self) -> usize;
}

/// SQLite-backed document store.
///
/// The transaction limit of 100 comfortably covers the largest publish
/// fan-out: one version row, one feed row, 20 entity rows, 50 citation rows.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

const MAX_TRANSACT_ITEMS: usize = 100;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS items (
    pk      TEXT NOT NULL,
    sk      TEXT NOT NULL,
    payload TEXT NOT NULL,
    PRIMARY KEY (pk, sk)
);
";

impl SqliteDocumentStore {
    /// Open (creating if needed) a store at the given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create store directory: {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open document store: {}", path.display()))?;
        Self::init(conn)
    }

    /// Open an in-memory store (used by tests)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize document store schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend(anyhow!("document store connection poisoned")))
    }
}

/// Apply one conditional put on an open connection/transaction.
/// Returns false when an `IfAbsent` condition was not met.
fn apply_put(conn: &Connection, put: &TransactPut) -> Result<bool, StoreError> {
    let payload = put.item.payload.to_string();
    let changed = match put.condition {
        PutCondition::Overwrite => conn
            .execute(
                "INSERT INTO items (pk, sk, payload) VALUES (?1, ?2, ?3)
                 ON CONFLICT (pk, sk) DO UPDATE SET payload = excluded.payload",
                params![put.item.pk, put.item.sk, payload],
            )
            .context("Failed to write item")?,
        PutCondition::IfAbsent => conn
            .execute(
                "INSERT INTO items (pk, sk, payload) VALUES (?1, ?2, ?3)
                 ON CONFLICT (pk, sk) DO NOTHING",
                params![put.item.pk, put.item.sk, payload],
            )
            .context("Failed to write item")?,
    };
    Ok(changed == 1)
}

/// Exclusive upper bound for "starts with `prefix`" over ASCII keys.
/// U+10FFFF sorts after every ASCII character in UTF-8 byte order.
fn prefix_upper_bound(prefix: &str) -> String {
    format!("{}\u{10FFFF}", prefix)
}

fn row_to_item(pk: String, sk: String, payload: String) -> Result<Item, StoreError> {
    let payload = serde_json::from_str(&payload)
        .with_context(|| format!("Corrupt payload for {}/{}", pk, sk))?;
    Ok(Item { pk, sk, payload })
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
        let conn = self.conn()?;
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT pk, sk, payload FROM items WHERE pk = ?1 AND sk = ?2",
                params![pk, sk],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .context("Failed to read item")?;

        row.map(|(pk, sk, payload)| row_to_item(pk, sk, payload))
            .transpose()
    }

    async fn put(&self, item: Item, condition: PutCondition) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let put = TransactPut { item, condition };
        if !apply_put(&conn, &put)? {
            return Err(StoreError::ConditionFailed {
                pk: put.item.pk,
                sk: put.item.sk,
            });
        }
        Ok(())
    }

    async fn query(&self, pk: &str, options: QueryOptions) -> Result<Vec<Item>, StoreError> {
        let conn = self.conn()?;

        let order = match options.order.unwrap_or(QueryOrder::Ascending) {
            QueryOrder::Ascending => "ASC",
            QueryOrder::Descending => "DESC",
        };
        let limit = options.limit.map(|l| l as i64).unwrap_or(-1);
        let lower = options.sk_prefix.clone().unwrap_or_default();
        let upper = prefix_upper_bound(&lower);

        let sql = format!(
            "SELECT pk, sk, payload FROM items
             WHERE pk = ?1 AND sk >= ?2 AND sk < ?3
             ORDER BY sk {} LIMIT ?4",
            order
        );
        let mut stmt = conn.prepare(&sql).context("Failed to prepare query")?;
        let rows = stmt
            .query_map(params![pk, lower, upper, limit], |row| {
                Ok((row.get::<_, String>(0)?, row.get(1)?, row.get(2)?))
            })
            .context("Failed to run query")?;

        let mut items = Vec::new();
        for row in rows {
            let (pk, sk, payload) = row.context("Failed to read query row")?;
            items.push(row_to_item(pk, sk, payload)?);
        }
        Ok(items)
    }

    async fn scan_prefix(&self, pk_prefix: &str) -> Result<Vec<Item>, StoreError> {
        let conn = self.conn()?;
        let upper = prefix_upper_bound(pk_prefix);
        let mut stmt = conn
            .prepare(
                "SELECT pk, sk, payload FROM items
                 WHERE pk >= ?1 AND pk < ?2
                 ORDER BY pk ASC, sk ASC",
            )
            .context("Failed to prepare scan")?;
        let rows = stmt
            .query_map(params![pk_prefix, upper], |row| {
                Ok((row.get::<_, String>(0)?, row.get(1)?, row.get(2)?))
            })
            .context("Failed to run scan")?;

        let mut items = Vec::new();
        for row in rows {
            let (pk, sk, payload) = row.context("Failed to read scan row")?;
            items.push(row_to_item(pk, sk, payload)?);
        }
        Ok(items)
    }

    async fn transact_put(&self, puts: Vec<TransactPut>) -> Result<(), StoreError> {
        if puts.len() > MAX_TRANSACT_ITEMS {
            return Err(StoreError::TransactTooLarge {
                requested: puts.len(),
                limit: MAX_TRANSACT_ITEMS,
            });
        }

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .context("Failed to begin transaction")?;

        for put in &puts {
            if !apply_put(&tx, put)? {
                // Dropping the transaction rolls back every prior put
                return Err(StoreError::ConditionFailed {
                    pk: put.item.pk.clone(),
                    sk: put.item.sk.clone(),
                });
            }
        }

        tx.commit().context("Failed to commit transaction")?;
        Ok(())
    }

    fn max_transact_items(&self) -> usize {
        MAX_TRANSACT_ITEMS
    }
}

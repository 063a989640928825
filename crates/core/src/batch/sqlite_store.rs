//! SQLite-backed counter and ledger.
//!
//! Both records live in one database so a single connection serves the two
//! traits. The `batch_number` primary key of `batch_assignments` makes the
//! database itself refuse a second assignment of the same batch.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::counter::{check_release, BatchCounter};
use super::error::StoreError;
use super::ledger::AssignmentLedger;
use super::types::{BatchNumber, WorkerId};

/// SQLite-backed batch counter and assignment ledger.
pub struct SqliteBatchStore {
    conn: Mutex<Connection>,
}

impl SqliteBatchStore {
    /// Opens the database at `path`, creating the tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS batch_counter (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                next_batch_number INTEGER NOT NULL CHECK (next_batch_number >= 0)
            );

            INSERT OR IGNORE INTO batch_counter (id, next_batch_number) VALUES (0, 0);

            CREATE TABLE IF NOT EXISTS batch_assignments (
                batch_number INTEGER PRIMARY KEY,
                worker TEXT NOT NULL,
                seq INTEGER NOT NULL,
                assigned_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_batch_assignments_worker
                ON batch_assignments(worker, seq);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }
}

fn to_sql(batch: BatchNumber) -> Result<i64, StoreError> {
    i64::try_from(batch.value()).map_err(|_| StoreError::CounterOverflow(batch))
}

fn from_sql(value: i64) -> Result<BatchNumber, StoreError> {
    u64::try_from(value)
        .map(BatchNumber)
        .map_err(|_| StoreError::Database(format!("negative batch number {value}")))
}

fn worker_from_sql(value: String) -> Result<WorkerId, StoreError> {
    WorkerId::new(value).map_err(|e| StoreError::Database(e.to_string()))
}

fn read_counter(conn: &Connection) -> Result<BatchNumber, StoreError> {
    let value: i64 = conn.query_row(
        "SELECT next_batch_number FROM batch_counter WHERE id = 0",
        [],
        |row| row.get(0),
    )?;
    from_sql(value)
}

fn write_counter(conn: &Connection, next: BatchNumber) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE batch_counter SET next_batch_number = ? WHERE id = 0",
        params![to_sql(next)?],
    )?;
    Ok(())
}

impl BatchCounter for SqliteBatchStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn peek(&self) -> Result<BatchNumber, StoreError> {
        let conn = self.conn()?;
        read_counter(&conn)
    }

    fn reserve(&self) -> Result<BatchNumber, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = read_counter(&tx)?;
        let next = current
            .checked_next()
            .ok_or(StoreError::CounterOverflow(current))?;
        write_counter(&tx, next)?;
        tx.commit()?;
        Ok(current)
    }

    fn release(&self, batch: BatchNumber) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = read_counter(&tx)?;
        check_release(current, batch)?;
        write_counter(&tx, batch)?;
        tx.commit()?;
        Ok(())
    }
}

impl AssignmentLedger for SqliteBatchStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn assign(&self, worker: &WorkerId, batch: BatchNumber) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), -1) + 1 FROM batch_assignments WHERE worker = ?",
            params![worker.as_str()],
            |row| row.get(0),
        )?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO batch_assignments (batch_number, worker, seq, assigned_at)
             VALUES (?, ?, ?, ?)",
            params![
                to_sql(batch)?,
                worker.as_str(),
                seq,
                Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;
        Ok(inserted == 1)
    }

    fn unassign_last(&self, worker: &WorkerId) -> Result<Option<BatchNumber>, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let last: Option<i64> = tx
            .query_row(
                "SELECT batch_number FROM batch_assignments
                 WHERE worker = ? ORDER BY seq DESC LIMIT 1",
                params![worker.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(last) = last else {
            return Ok(None);
        };

        tx.execute(
            "DELETE FROM batch_assignments WHERE batch_number = ?",
            params![last],
        )?;
        tx.commit()?;
        from_sql(last).map(Some)
    }

    fn list_for(&self, worker: &WorkerId) -> Result<Vec<BatchNumber>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT batch_number FROM batch_assignments WHERE worker = ? ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![worker.as_str()], |row| row.get::<_, i64>(0))?;

        let mut batches = Vec::new();
        for row in rows {
            batches.push(from_sql(row?)?);
        }
        Ok(batches)
    }

    fn owner_of(&self, batch: BatchNumber) -> Result<Option<WorkerId>, StoreError> {
        let conn = self.conn()?;
        let worker: Option<String> = conn
            .query_row(
                "SELECT worker FROM batch_assignments WHERE batch_number = ?",
                params![to_sql(batch)?],
                |row| row.get(0),
            )
            .optional()?;
        worker.map(worker_from_sql).transpose()
    }

    fn snapshot(&self) -> Result<BTreeMap<WorkerId, Vec<BatchNumber>>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT worker, batch_number FROM batch_assignments ORDER BY worker, seq")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut lists: BTreeMap<WorkerId, Vec<BatchNumber>> = BTreeMap::new();
        for row in rows {
            let (worker, batch) = row?;
            lists
                .entry(worker_from_sql(worker)?)
                .or_default()
                .push(from_sql(batch)?);
        }
        Ok(lists)
    }
}

//! Transactional persistence (C1, spec.md §4.1). A single `rusqlite`
//! connection wrapped in a `parking_lot::Mutex` — `rusqlite::Connection` is
//! `!Sync`, so the mutex is what lets `Store` be shared across tasks the way
//! the teacher shares its `signals/db_storage.rs` connection. Every write
//! path runs inside exactly one `rusqlite::Transaction` spanning all of its
//! reads and writes; nothing opens a nested or cross-component transaction.

pub mod acumula;
pub mod audit;
pub mod counters;
pub mod metrics;
pub mod orders;
pub mod pauses;
mod schema;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::error::{CoreError, CoreResult};

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &str) -> CoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(schema::SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `f` inside a single transaction. On `Ok`, commits and returns
    /// the value; on `Err`, rolls back and propagates the error. Any
    /// `rusqlite::Error` raised while opening/committing surfaces as
    /// `CoreError::Internal` (spec.md §7: "any storage error surfaces as an
    /// opaque StorageError").
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        match f(&tx) {
            Ok(value) => {
                tx.commit().map_err(|e| CoreError::Internal(e.to_string()))?;
                Ok(value)
            }
            Err(e) => {
                // Explicit rollback isn't required (Transaction::drop does
                // it), but being explicit documents the intent at the call
                // site the way the teacher documents its WAL pragmas.
                let _ = tx.rollback();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_on_a_real_file_applies_the_schema_and_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cremer.sqlite3");
        let path = path.to_str().unwrap();

        {
            let store = Store::open(path).unwrap();
            store
                .with_transaction(|tx| {
                    tx.execute(
                        "INSERT INTO orders (cod_order, operario, lote, articulo, descripcion, \
                         estado, cantidad, botes_caja, std_referencia, hora_creacion, repercap, acumula) \
                         VALUES ('OF-1','A','L1','X','','CREADA',1000,10,20,'2026-01-01T00:00:00+01:00',0,0)",
                        [],
                    )?;
                    Ok(())
                })
                .unwrap();
        }

        let store = Store::open(path).unwrap();
        let count: i64 = store
            .with_transaction(|tx| Ok(tx.query_row("SELECT COUNT(*) FROM orders", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn a_failed_transaction_rolls_back() {
        let store = Store::open_in_memory().unwrap();
        let result: CoreResult<()> = store.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO orders (cod_order, operario, lote, articulo, descripcion, estado, cantidad, botes_caja, std_referencia, hora_creacion, repercap, acumula) VALUES ('OF-1','A','L1','X','','CREADA',1000,10,20,'2026-01-01T00:00:00+01:00',0,0)",
                [],
            )?;
            Err(CoreError::invalid_state("force rollback"))
        });
        assert!(result.is_err());

        let count: i64 = store
            .with_transaction(|tx| Ok(tx.query_row("SELECT COUNT(*) FROM orders", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }
}

use std::{
    path::PathBuf,
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::oneshot;

mod migrations;

use crate::models::{parse_timestamp, OccupancyState, Slot};
use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn row_to_slot(row: &Row) -> Result<Slot> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;

    Ok(Slot {
        id: row.get("id")?,
        index: row.get("slot")?,
        occupancy: OccupancyState::parse(&status),
        distance_cm: row.get("jarak")?,
        observed_at: parse_timestamp(&created_at)
            .with_context(|| format!("bad created_at in slot row: {created_at}"))?,
    })
}

/// SQLite-backed slot table. All statements run on one dedicated thread;
/// async callers hand closures over and await the reply.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    table: Arc<str>,
}

impl Database {
    /// `table` must already be a validated SQL identifier.
    pub fn open(db_path: PathBuf, table: &str) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();
        let table_for_thread = table.to_string();

        let worker = thread::Builder::new()
            .name("parkwatch-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result = run_migrations(&mut conn, &table_for_thread)
                    .context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!(
            "Slot table '{}' ready at {}",
            table,
            db_path.as_path().display()
        );

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            table: Arc::from(table),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    pub async fn fetch_slots(&self) -> Result<Vec<Slot>> {
        let sql = format!(
            "SELECT id, slot, status, jarak, created_at FROM {} ORDER BY slot ASC",
            self.table
        );
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut slots = Vec::new();
            while let Some(row) = rows.next()? {
                slots.push(row_to_slot(row)?);
            }
            Ok(slots)
        })
        .await
    }

    /// Writes the reading for `index`, inserting the row on first sight.
    pub async fn upsert_slot(
        &self,
        index: i64,
        occupancy: OccupancyState,
        distance_cm: f64,
        observed_at: DateTime<Utc>,
    ) -> Result<Slot> {
        let table = self.table.to_string();
        self.execute(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {table} (slot, status, jarak, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(slot) DO UPDATE SET
                         status = excluded.status,
                         jarak = excluded.jarak,
                         created_at = excluded.created_at"
                ),
                params![
                    index,
                    occupancy.as_str(),
                    distance_cm,
                    observed_at.to_rfc3339()
                ],
            )
            .with_context(|| format!("failed to upsert slot {index}"))?;

            conn.query_row(
                &format!(
                    "SELECT id, slot, status, jarak, created_at FROM {table} WHERE slot = ?1"
                ),
                params![index],
                |row| Ok(row_to_slot(row)),
            )
            .optional()?
            .ok_or_else(|| anyhow!("slot {index} missing after upsert"))?
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn upsert_inserts_then_updates_in_place() {
        let temp = TempDir::new().unwrap();
        let db = Database::open(temp.path().join("slots.sqlite3"), "parkingg").unwrap();

        let first = db
            .upsert_slot(2, OccupancyState::Occupied, 12.0, Utc::now())
            .await
            .unwrap();
        let second = db
            .upsert_slot(2, OccupancyState::Empty, 180.5, Utc::now())
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.occupancy, OccupancyState::Empty);
        assert_eq!(second.distance_cm, 180.5);

        let rows = db.fetch_slots().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], second);
    }

    #[tokio::test]
    async fn fetch_orders_by_slot_index() {
        let temp = TempDir::new().unwrap();
        let db = Database::open(temp.path().join("slots.sqlite3"), "lot_a").unwrap();

        for index in [5, 1, 3] {
            db.upsert_slot(index, OccupancyState::Maintenance, 0.0, Utc::now())
                .await
                .unwrap();
        }

        let indices: Vec<i64> = db
            .fetch_slots()
            .await
            .unwrap()
            .iter()
            .map(|slot| slot.index)
            .collect();
        assert_eq!(indices, vec![1, 3, 5]);
        assert_eq!(db.table(), "lot_a");
    }

    #[tokio::test]
    async fn reopening_keeps_rows() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("slots.sqlite3");
        {
            let db = Database::open(path.clone(), "parkingg").unwrap();
            db.upsert_slot(4, OccupancyState::Occupied, 9.0, Utc::now())
                .await
                .unwrap();
        }

        let db = Database::open(path, "parkingg").unwrap();
        assert_eq!(db.fetch_slots().await.unwrap().len(), 1);
    }
}

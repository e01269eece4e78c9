use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::{
    db::Database,
    models::{OccupancyState, Slot},
};

use super::{FeedEvent, SlotSource, Subscription, TransportSignal};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const CHANGE_BUFFER: usize = 64;

/// Slot table kept in a local SQLite file. Writes made through this handle
/// are fanned out to every subscriber.
pub struct LocalSource {
    db: Database,
    changes: broadcast::Sender<Slot>,
}

impl LocalSource {
    pub fn open(db_path: PathBuf, table: &str) -> Result<Self> {
        let db = Database::open(db_path, table)?;
        Ok(Self::with_database(db))
    }

    fn with_database(db: Database) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self { db, changes }
    }

    /// Records a sensor reading and publishes the stored row.
    pub async fn upsert_slot(
        &self,
        index: i64,
        occupancy: OccupancyState,
        distance_cm: f64,
        observed_at: DateTime<Utc>,
    ) -> Result<Slot> {
        let slot = self
            .db
            .upsert_slot(index, occupancy, distance_cm, observed_at)
            .await?;

        // No receivers just means nobody is subscribed yet.
        let _ = self.changes.send(slot.clone());
        log_debug!("slot {} stored as {}", slot.index, slot.occupancy.label());
        Ok(slot)
    }
}

#[async_trait]
impl SlotSource for LocalSource {
    fn table(&self) -> &str {
        self.db.table()
    }

    async fn fetch_slots(&self) -> Result<Vec<Slot>> {
        self.db.fetch_slots().await
    }

    fn subscribe(&self, inbox: mpsc::Sender<FeedEvent>) -> Result<Subscription> {
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(forward_changes(
            self.db.clone(),
            self.changes.subscribe(),
            inbox,
            cancel_token.clone(),
        ));
        log_info!("subscribed to local slot table '{}'", self.db.table());
        Ok(Subscription::new(cancel_token, handle))
    }
}

async fn forward_changes(
    db: Database,
    mut changes: broadcast::Receiver<Slot>,
    inbox: mpsc::Sender<FeedEvent>,
    cancel_token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel_token.cancelled() => break,
            received = changes.recv() => received,
        };

        let delivered = match event {
            Ok(slot) => inbox.send(FeedEvent::Changed(slot)).await.is_ok(),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log_warn!("change feed lagged, {} updates dropped; resyncing", skipped);
                resync(&db, &inbox).await
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if !delivered {
            break;
        }
    }

    log_info!("local change feed stopped");
}

/// Replays the whole table after dropped updates so the consumer converges.
async fn resync(db: &Database, inbox: &mpsc::Sender<FeedEvent>) -> bool {
    if inbox
        .send(FeedEvent::Transport(TransportSignal::Error))
        .await
        .is_err()
    {
        return false;
    }

    let rows = match db.fetch_slots().await {
        Ok(rows) => rows,
        Err(err) => {
            log_warn!("resync read failed: {err:?}");
            return true;
        }
    };

    for slot in rows {
        if inbox.send(FeedEvent::Changed(slot)).await.is_err() {
            return false;
        }
    }

    inbox
        .send(FeedEvent::Transport(TransportSignal::Restored))
        .await
        .is_ok()
}

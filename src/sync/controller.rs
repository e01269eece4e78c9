use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use chrono::Utc;
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};

use crate::{
    models::Slot,
    source::{FeedEvent, SlotSource, Subscription, TransportSignal},
};

use super::{SyncError, SyncState};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const INBOX_CAPACITY: usize = 128;

/// Keeps the client-side slot view in step with a [`SlotSource`].
///
/// State lives behind one lock; every mutation publishes a fresh snapshot on
/// a `watch` channel. The synchronizer starts on the first [`observe`] and
/// tears itself down once every observer has gone away.
///
/// [`observe`]: SlotSynchronizer::observe
#[derive(Clone)]
pub struct SlotSynchronizer {
    state: Arc<Mutex<SyncState>>,
    source: Arc<dyn SlotSource>,
    events: Arc<watch::Sender<SyncState>>,
    subscription: Arc<Mutex<Option<Subscription>>>,
    inbox_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    started: Arc<AtomicBool>,
}

impl SlotSynchronizer {
    pub fn new(source: Arc<dyn SlotSource>) -> Self {
        let (events, _) = watch::channel(SyncState::new());
        Self {
            state: Arc::new(Mutex::new(SyncState::new())),
            source,
            events: Arc::new(events),
            subscription: Arc::new(Mutex::new(None)),
            inbox_task: Arc::new(Mutex::new(None)),
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn get_state(&self) -> SyncState {
        self.state.lock().await.clone()
    }

    /// Returns a receiver of state snapshots. The first call loads the table
    /// and opens the push subscription.
    pub async fn observe(&self) -> Result<watch::Receiver<SyncState>> {
        let receiver = self.events.subscribe();

        if !self.started.swap(true, Ordering::SeqCst) {
            if let Err(err) = self.start().await {
                self.started.store(false, Ordering::SeqCst);
                return Err(err);
            }

            let this = self.clone();
            tokio::spawn(async move {
                this.events.closed().await;
                log_info!("no observers left for '{}'", this.source.table());
                this.teardown().await;
            });
        }

        Ok(receiver)
    }

    async fn start(&self) -> Result<()> {
        let (inbox_tx, mut inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let subscription = self.source.subscribe(inbox_tx)?;
        *self.subscription.lock().await = Some(subscription);

        // Observers must see a loading view before the first fetch settles.
        {
            let mut state = self.state.lock().await;
            state.begin_load();
            self.emit(&state);
        }

        let this = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = inbox_rx.recv().await {
                match event {
                    FeedEvent::Changed(slot) => this.apply_push_update(slot).await,
                    FeedEvent::Transport(signal) => this.handle_transport_signal(signal).await,
                }
            }
            log_debug!("slot inbox closed");
        });
        *self.inbox_task.lock().await = Some(handle);

        self.refetch();
        Ok(())
    }

    /// Pulls the whole table and rebuilds the slot view. On failure the
    /// previous slots are kept and the error is recorded in the state.
    pub async fn initial_load(&self) -> Result<(), SyncError> {
        {
            let mut state = self.state.lock().await;
            state.begin_load();
            self.emit(&state);
        }

        let fetched = self.source.fetch_slots().await;

        let mut state = self.state.lock().await;
        let result = match fetched {
            Ok(rows) => {
                log_info!("loaded {} rows from '{}'", rows.len(), self.source.table());
                state.finish_load(rows, Utc::now());
                Ok(())
            }
            Err(err) => {
                log_warn!("loading '{}' failed: {err:?}", self.source.table());
                let message = format!("{err:#}");
                state.fail_load(&message);
                Err(SyncError::Fetch(
                    state.error.clone().unwrap_or(message),
                ))
            }
        };
        self.emit(&state);
        result
    }

    /// Reloads in the background; completion shows up as a state change.
    pub fn refetch(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            // The failure is already recorded in the state.
            let _ = this.initial_load().await;
        });
    }

    pub async fn apply_push_update(&self, slot: Slot) {
        let index = slot.index;
        let mut state = self.state.lock().await;
        if state.apply_push_update(slot) {
            self.emit(&state);
        } else {
            log_debug!("{}", SyncError::OutOfRange(index));
        }
    }

    pub async fn handle_transport_signal(&self, signal: TransportSignal) {
        if signal == TransportSignal::Error {
            log_warn!(
                "{}",
                SyncError::Transport(format!("push channel for '{}'", self.source.table()))
            );
        }

        let mut state = self.state.lock().await;
        state.handle_transport_signal(signal);
        self.emit(&state);
    }

    /// Releases the push subscription. Later calls find nothing to release;
    /// a later `observe` starts a fresh subscription.
    pub async fn teardown(&self) {
        let subscription = self.subscription.lock().await.take();
        let Some(subscription) = subscription else {
            return;
        };

        subscription.unsubscribe();
        if let Some(handle) = self.inbox_task.lock().await.take() {
            handle.abort();
        }
        self.started.store(false, Ordering::SeqCst);
        log_info!("unsubscribed from '{}'", self.source.table());
    }

    pub async fn is_subscribed(&self) -> bool {
        self.subscription.lock().await.is_some()
    }

    fn emit(&self, state: &SyncState) {
        self.events.send_replace(state.clone());
    }
}

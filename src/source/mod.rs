pub mod local;
pub mod rest;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    models::Slot,
    settings::{Settings, SourceKind},
};

pub use local::LocalSource;
pub use rest::RestSource;

/// Health of the push channel as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSignal {
    Error,
    Restored,
}

/// Everything a subscription can deliver into the synchronizer's inbox.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Changed(Slot),
    Transport(TransportSignal),
}

/// Handle for a live push subscription. Dropping it also stops the feed.
pub struct Subscription {
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(cancel_token: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self {
            cancel_token,
            handle: Some(handle),
        }
    }

    /// Stops the feed task. Consumes the handle so a subscription can only be
    /// released once. A task stuck in a request is aborted rather than left to
    /// notice the cancellation on its next turn.
    pub fn unsubscribe(mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel_token.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Where slot rows come from: a point-in-time query plus a change feed.
#[async_trait]
pub trait SlotSource: Send + Sync {
    fn table(&self) -> &str;

    /// All rows of the slot table, ordered by slot index.
    async fn fetch_slots(&self) -> Result<Vec<Slot>>;

    /// Starts delivering change and transport events into `inbox` until the
    /// returned subscription is released.
    fn subscribe(&self, inbox: mpsc::Sender<FeedEvent>) -> Result<Subscription>;
}

pub enum BuiltSource {
    Rest(Arc<RestSource>),
    Local(Arc<LocalSource>),
}

impl BuiltSource {
    pub fn as_source(&self) -> Arc<dyn SlotSource> {
        match self {
            BuiltSource::Rest(source) => source.clone(),
            BuiltSource::Local(source) => source.clone(),
        }
    }

    pub fn local(&self) -> Option<Arc<LocalSource>> {
        match self {
            BuiltSource::Local(source) => Some(source.clone()),
            BuiltSource::Rest(_) => None,
        }
    }
}

pub fn build_source(settings: &Settings) -> Result<BuiltSource> {
    match settings.source {
        SourceKind::Rest => {
            let url = settings
                .supabase_url
                .clone()
                .context("SUPABASE_URL is required for the rest source")?;
            let key = settings
                .supabase_key
                .clone()
                .context("SUPABASE_ANON_KEY is required for the rest source")?;
            let source = RestSource::new(url, key, settings.table_name.clone(), settings.poll_interval)?;
            Ok(BuiltSource::Rest(Arc::new(source)))
        }
        SourceKind::Local => {
            let source = LocalSource::open(settings.db_path.clone(), &settings.table_name)?;
            Ok(BuiltSource::Local(Arc::new(source)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unsubscribe_cancels_feed_task() {
        let token = CancellationToken::new();
        let watched = token.clone();
        let handle = tokio::spawn(async move { watched.cancelled().await });

        let subscription = Subscription::new(token.clone(), handle);
        assert!(subscription.is_active());
        subscription.unsubscribe();

        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn unsubscribe_stops_a_task_that_ignores_the_token() {
        let (tx, mut rx) = mpsc::channel::<FeedEvent>(1);
        let handle = tokio::spawn(async move {
            let _inbox = tx;
            std::future::pending::<()>().await;
        });

        Subscription::new(CancellationToken::new(), handle).unsubscribe();

        // The aborted task drops its sender, which closes the channel.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn dropping_subscription_cancels_feed_task() {
        let token = CancellationToken::new();
        let handle = tokio::spawn(async {});
        drop(Subscription::new(token.clone(), handle));
        assert!(token.is_cancelled());
    }
}

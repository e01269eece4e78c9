use std::{collections::HashMap, time::Duration};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::models::Slot;

use super::{FeedEvent, SlotSource, Subscription, TransportSignal};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Slot table served by the hosted database's REST endpoint.
#[derive(Clone)]
pub struct RestSource {
    client: Client,
    base_url: String,
    api_key: String,
    table: String,
    poll_interval: Duration,
}

impl RestSource {
    pub fn new(
        base_url: String,
        api_key: String,
        table: String,
        poll_interval: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            table,
            poll_interval,
        })
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/rest/v1/{}?select=*&order=slot.asc",
            self.base_url, self.table
        )
    }

    async fn query(&self) -> Result<Vec<Slot>> {
        let response = self
            .client
            .get(self.endpoint())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("slot query on '{}' failed with {status}: {body}", self.table);
        }

        response
            .json::<Vec<Slot>>()
            .await
            .context("slot query returned malformed rows")
    }
}

#[async_trait]
impl SlotSource for RestSource {
    fn table(&self) -> &str {
        &self.table
    }

    async fn fetch_slots(&self) -> Result<Vec<Slot>> {
        self.query().await
    }

    fn subscribe(&self, inbox: mpsc::Sender<FeedEvent>) -> Result<Subscription> {
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(poll_changes(self.clone(), inbox, cancel_token.clone()));
        log_info!(
            "polling '{}' for changes every {}ms",
            self.table,
            self.poll_interval.as_millis()
        );
        Ok(Subscription::new(cancel_token, handle))
    }
}

/// Remembers the last row seen per slot index so each poll only reports
/// rows whose content moved.
#[derive(Debug, Default)]
pub struct RowDiff {
    seen: HashMap<i64, Slot>,
}

impl RowDiff {
    pub fn changes(&mut self, rows: Vec<Slot>) -> Vec<Slot> {
        let mut changed = Vec::new();
        for row in rows {
            if self.seen.get(&row.index) == Some(&row) {
                continue;
            }
            self.seen.insert(row.index, row.clone());
            changed.push(row);
        }
        changed
    }
}

async fn poll_changes(
    source: RestSource,
    inbox: mpsc::Sender<FeedEvent>,
    cancel_token: CancellationToken,
) {
    let start = time::Instant::now() + source.poll_interval;
    let mut ticker = time::interval_at(start, source.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut diff = RowDiff::default();
    let mut degraded = false;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let events = match source.query().await {
            Ok(rows) => {
                let mut events = Vec::new();
                if degraded {
                    log_info!("change feed for '{}' recovered", source.table);
                    events.push(FeedEvent::Transport(TransportSignal::Restored));
                    degraded = false;
                }
                events.extend(diff.changes(rows).into_iter().map(FeedEvent::Changed));
                events
            }
            Err(err) if !degraded => {
                log_warn!("change feed for '{}' failed: {err:?}", source.table);
                degraded = true;
                vec![FeedEvent::Transport(TransportSignal::Error)]
            }
            Err(err) => {
                log_debug!("change feed still down: {err}");
                Vec::new()
            }
        };

        for event in events {
            if inbox.send(event).await.is_err() {
                log_info!("change feed consumer gone; stopping");
                return;
            }
        }
    }

    log_info!("change feed for '{}' stopped", source.table);
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    models::{OccupancyState, Slot, SLOT_COUNT},
    source::TransportSignal,
};

pub const CONNECTION_LOST_MESSAGE: &str = "Connection lost. Attempting to reconnect...";
const FETCH_FAILED_MESSAGE: &str = "Failed to fetch parking data";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Connectivity {
    Connected,
    Disconnected,
}

impl Connectivity {
    pub fn label(&self) -> &'static str {
        match self {
            Connectivity::Connected => "CONNECTED",
            Connectivity::Disconnected => "DISCONNECTED",
        }
    }
}

/// Counts shown in the dashboard's statistics strip.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SlotSummary {
    pub available: usize,
    pub occupied: usize,
    pub maintenance: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub slots: Vec<Slot>,
    pub connectivity: Connectivity,
    pub error: Option<String>,
    pub is_loading: bool,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            connectivity: Connectivity::Connected,
            error: None,
            is_loading: false,
        }
    }
}

/// Builds the full `1..=SLOT_COUNT` view from whatever the source returned.
/// The first row for an index wins; out-of-range rows are dropped and
/// missing indices get a placeholder stamped with `now`.
pub fn normalize_slots(rows: Vec<Slot>, now: DateTime<Utc>) -> Vec<Slot> {
    (1..=SLOT_COUNT)
        .map(|index| {
            rows.iter()
                .find(|row| row.index == index)
                .cloned()
                .unwrap_or_else(|| Slot::placeholder(index, now))
        })
        .collect()
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connectivity == Connectivity::Connected
    }

    /// A retry drops the previous message; connectivity stays as it was until
    /// the load settles.
    pub fn begin_load(&mut self) {
        self.is_loading = true;
        self.error = None;
    }

    pub fn finish_load(&mut self, rows: Vec<Slot>, now: DateTime<Utc>) {
        self.slots = normalize_slots(rows, now);
        self.mark_connected();
        self.is_loading = false;
    }

    /// Slots stay as they were; only status and the message change.
    pub fn fail_load(&mut self, message: &str) {
        let message = if message.trim().is_empty() {
            FETCH_FAILED_MESSAGE
        } else {
            message
        };
        self.connectivity = Connectivity::Disconnected;
        self.error = Some(message.to_string());
        self.is_loading = false;
    }

    /// Returns `false` without touching anything when the index is outside
    /// the tracked range.
    pub fn apply_push_update(&mut self, updated: Slot) -> bool {
        if !Slot::in_range(updated.index) {
            return false;
        }

        if let Some(existing) = self.slots.iter_mut().find(|slot| slot.index == updated.index) {
            *existing = updated;
        }
        self.mark_connected();
        true
    }

    pub fn handle_transport_signal(&mut self, signal: TransportSignal) {
        match signal {
            TransportSignal::Error => {
                self.connectivity = Connectivity::Disconnected;
                self.error = Some(CONNECTION_LOST_MESSAGE.to_string());
            }
            TransportSignal::Restored => self.mark_connected(),
        }
    }

    pub fn summary(&self) -> SlotSummary {
        let count = |state: OccupancyState| {
            self.slots
                .iter()
                .filter(|slot| slot.occupancy == state)
                .count()
        };

        SlotSummary {
            available: count(OccupancyState::Empty),
            occupied: count(OccupancyState::Occupied),
            maintenance: count(OccupancyState::Maintenance),
            total: SLOT_COUNT as usize,
        }
    }

    fn mark_connected(&mut self) {
        self.connectivity = Connectivity::Connected;
        self.error = None;
    }
}

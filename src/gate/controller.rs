use std::sync::Arc;

use anyhow::{bail, Result};
use rand::seq::SliceRandom;
use tokio::{
    sync::{watch, Mutex},
    time::{self, Instant},
};
use uuid::Uuid;

use crate::models::{default_candidates, Vehicle};

use super::{
    GateInfo, GateSession, GateStep, OccupancyDisplay, DENIED_SEQUENCE, DETECTION_DELAY,
    GRANTED_SEQUENCE,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Runs the barrier gate mock. Each accepted trigger becomes one session:
/// a detection delay, a random vehicle, then a fixed timer schedule.
#[derive(Clone)]
pub struct GateSimulator {
    state: Arc<Mutex<GateSession>>,
    info: Arc<GateInfo>,
    candidates: Arc<Vec<Vehicle>>,
    events: Arc<watch::Sender<GateSession>>,
}

impl GateSimulator {
    pub fn new(info: GateInfo) -> Self {
        Self::build(info, default_candidates())
    }

    pub fn with_candidates(info: GateInfo, candidates: Vec<Vehicle>) -> Result<Self> {
        if candidates.is_empty() {
            bail!("gate simulator needs at least one candidate vehicle");
        }
        Ok(Self::build(info, candidates))
    }

    fn build(info: GateInfo, candidates: Vec<Vehicle>) -> Self {
        let (events, _) = watch::channel(GateSession::new());
        Self {
            state: Arc::new(Mutex::new(GateSession::new())),
            info: Arc::new(info),
            candidates: Arc::new(candidates),
            events: Arc::new(events),
        }
    }

    pub fn info(&self) -> &GateInfo {
        &self.info
    }

    pub fn occupancy(&self) -> OccupancyDisplay {
        self.info.occupancy()
    }

    pub fn subscribe(&self) -> watch::Receiver<GateSession> {
        self.events.subscribe()
    }

    pub async fn get_state(&self) -> GateSession {
        self.state.lock().await.clone()
    }

    /// Starts a detection. Returns `false` and changes nothing while a
    /// detection is pending or the barrier is not closed.
    pub async fn trigger_detection(&self) -> bool {
        let session_id = {
            let mut state = self.state.lock().await;
            if !state.can_trigger() {
                log_debug!(
                    "trigger ignored: detecting={} phase={}",
                    state.detecting,
                    state.phase.as_str()
                );
                return false;
            }
            let session_id = Uuid::new_v4().to_string();
            state.begin_detection(session_id.clone());
            self.emit(&state);
            session_id
        };

        log_info!("{}: detecting vehicle (session {})", self.info.gate_id, session_id);

        let this = self.clone();
        tokio::spawn(async move {
            time::sleep(DETECTION_DELAY).await;
            this.resolve_detection(session_id).await;
        });
        true
    }

    async fn resolve_detection(&self, session_id: String) {
        let Some(vehicle) = self.pick_candidate() else {
            return;
        };
        let plate = vehicle.plate.clone();

        let (granted, deferred, grant_moment) = {
            let mut state = self.state.lock().await;
            let Some(granted) = state.resolve(&session_id, vehicle) else {
                log_debug!("detection for stale session {} dropped", session_id);
                return;
            };
            let schedule: &[_] = if granted {
                &GRANTED_SEQUENCE
            } else {
                &DENIED_SEQUENCE
            };
            let deferred = state.begin_sequence(&session_id, schedule);
            self.emit(&state);
            (granted, deferred, Instant::now())
        };

        log_info!(
            "{}: {} {}",
            self.info.gate_id,
            plate,
            if granted { "access granted" } else { "access denied" }
        );

        for (offset, step) in deferred {
            let this = self.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                time::sleep_until(grant_moment + offset).await;
                this.fire(&session_id, step).await;
            });
        }
    }

    async fn fire(&self, session_id: &str, step: GateStep) {
        let mut state = self.state.lock().await;
        if state.apply(session_id, step) {
            log_debug!(
                "{}: {:?} -> {} / {}",
                self.info.gate_id,
                step,
                state.phase.as_str(),
                state.signal.as_str()
            );
            self.emit(&state);
        } else {
            log_debug!("{:?} for session {} skipped", step, session_id);
        }
    }

    fn pick_candidate(&self) -> Option<Vehicle> {
        self.candidates.choose(&mut rand::thread_rng()).cloned()
    }

    fn emit(&self, state: &GateSession) {
        self.events.send_replace(state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gate::{GatePhase, SignalColor},
        models::{AccessLevel, VehicleClass},
    };
    use std::time::Duration;

    fn simulator(level: AccessLevel) -> GateSimulator {
        let vehicle = Vehicle::new("TST-001", VehicleClass::Car, level);
        GateSimulator::with_candidates(GateInfo::default(), vec![vehicle]).unwrap()
    }

    /// Sleeps until `ms` after `start` on the paused test clock.
    async fn at(start: Instant, ms: u64) {
        time::sleep_until(start + Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn authorized_vehicle_runs_full_cycle() {
        let gate = simulator(AccessLevel::Authorized);
        let start = Instant::now();
        assert!(gate.trigger_detection().await);

        let pending = gate.get_state().await;
        assert!(pending.detecting);
        assert_eq!(pending.vehicle, None);
        assert_eq!(pending.access_granted, None);

        // Detection resolves at 2000ms; the grant sequence is relative to that.
        at(start, 2001).await;
        let granted = gate.get_state().await;
        assert!(!granted.detecting);
        assert_eq!(granted.access_granted, Some(true));
        assert_eq!(granted.signal, SignalColor::Green);
        assert_eq!(granted.phase, GatePhase::Opening);
        assert!(!gate.trigger_detection().await);
        assert_eq!(gate.get_state().await, granted);

        at(start, 3499).await;
        assert_eq!(gate.get_state().await.phase, GatePhase::Opening);
        at(start, 3501).await;
        assert_eq!(gate.get_state().await.phase, GatePhase::Open);

        at(start, 6001).await;
        let closing = gate.get_state().await;
        assert_eq!(closing.phase, GatePhase::Closing);
        assert_eq!(closing.signal, SignalColor::Yellow);

        at(start, 8001).await;
        assert_eq!(gate.get_state().await, GateSession::default());
    }

    #[tokio::test(start_paused = true)]
    async fn denied_vehicle_keeps_barrier_closed() {
        let gate = simulator(AccessLevel::Denied);
        let mut observer = gate.subscribe();
        let start = Instant::now();
        gate.trigger_detection().await;

        at(start, 2001).await;
        let denied = gate.get_state().await;
        assert_eq!(denied.access_granted, Some(false));
        assert_eq!(denied.signal, SignalColor::Red);
        assert_eq!(denied.phase, GatePhase::Closed);
        assert_eq!(denied.vehicle.as_ref().map(|v| v.plate.as_str()), Some("TST-001"));

        at(start, 4999).await;
        assert!(gate.get_state().await.vehicle.is_some());

        at(start, 5001).await;
        let reset = gate.get_state().await;
        assert_eq!(reset.vehicle, None);
        assert_eq!(reset.access_granted, None);
        assert_eq!(reset.phase, GatePhase::Closed);

        assert!(observer.has_changed().unwrap());
        assert_eq!(*observer.borrow_and_update(), GateSession::default());
    }

    #[tokio::test(start_paused = true)]
    async fn retrigger_while_busy_is_a_noop() {
        let gate = simulator(AccessLevel::Visitor);
        let start = Instant::now();
        assert!(gate.trigger_detection().await);

        let pending = gate.get_state().await;
        assert!(!gate.trigger_detection().await);
        assert_eq!(gate.get_state().await, pending);

        at(start, 4000).await;
        let open = gate.get_state().await;
        assert_eq!(open.phase, GatePhase::Open);
        assert!(!gate.trigger_detection().await);
        assert_eq!(gate.get_state().await, open);

        at(start, 8001).await;
        assert!(gate.trigger_detection().await);
    }

    #[tokio::test(start_paused = true)]
    async fn retrigger_during_denied_display_supersedes_it() {
        let gate = simulator(AccessLevel::Denied);
        let start = Instant::now();
        gate.trigger_detection().await;

        at(start, 2500).await;
        assert!(gate.trigger_detection().await);
        let second = gate.get_state().await.session_id;

        // The first session's reset fires at 5000ms and must not clear the
        // second session, which resolves at 4500ms and resets at 7500ms.
        at(start, 5001).await;
        let state = gate.get_state().await;
        assert_eq!(state.session_id, second);
        assert_eq!(state.access_granted, Some(false));

        at(start, 7501).await;
        assert_eq!(gate.get_state().await, GateSession::default());
    }

    #[test]
    fn empty_candidate_list_is_rejected() {
        assert!(GateSimulator::with_candidates(GateInfo::default(), Vec::new()).is_err());
    }

    #[tokio::test]
    async fn default_simulator_exposes_display_values() {
        let gate = GateSimulator::new(GateInfo::default());
        assert_eq!(gate.info().gate_id, "GATE-001");
        assert_eq!(gate.occupancy().available, 63);
    }
}

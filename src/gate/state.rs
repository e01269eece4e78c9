use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::Vehicle;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum GatePhase {
    #[default]
    Closed,
    Opening,
    Open,
    Closing,
}

impl GatePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatePhase::Closed => "closed",
            GatePhase::Opening => "opening",
            GatePhase::Open => "open",
            GatePhase::Closing => "closing",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SignalColor {
    #[default]
    Red,
    Yellow,
    Green,
}

impl SignalColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalColor::Red => "red",
            SignalColor::Yellow => "yellow",
            SignalColor::Green => "green",
        }
    }
}

/// One scheduled move of the barrier. Each step only applies from the phase
/// it expects, so a late or repeated fire is harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStep {
    BeginOpening,
    FinishOpening,
    BeginClosing,
    FinishClosing,
    ClearDenied,
}

pub const DETECTION_DELAY: Duration = Duration::from_millis(2000);

/// Offsets from the grant moment.
pub const GRANTED_SEQUENCE: [(Duration, GateStep); 4] = [
    (Duration::ZERO, GateStep::BeginOpening),
    (Duration::from_millis(1500), GateStep::FinishOpening),
    (Duration::from_millis(4000), GateStep::BeginClosing),
    (Duration::from_millis(6000), GateStep::FinishClosing),
];

pub const DENIED_SEQUENCE: [(Duration, GateStep); 1] =
    [(Duration::from_millis(3000), GateStep::ClearDenied)];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GateSession {
    pub session_id: Option<String>,
    pub detecting: bool,
    pub vehicle: Option<Vehicle>,
    pub access_granted: Option<bool>,
    pub phase: GatePhase,
    pub signal: SignalColor,
}

impl GateSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new detection may start only from an idle, closed barrier.
    pub fn can_trigger(&self) -> bool {
        !self.detecting && self.phase == GatePhase::Closed
    }

    pub fn begin_detection(&mut self, session_id: String) {
        *self = Self {
            session_id: Some(session_id),
            detecting: true,
            ..Self::default()
        };
    }

    /// Records the detected vehicle and the access decision. Returns the
    /// decision, or `None` if `session_id` is no longer the active session.
    pub fn resolve(&mut self, session_id: &str, vehicle: Vehicle) -> Option<bool> {
        if !self.is_session(session_id) || !self.detecting {
            return None;
        }

        let granted = vehicle.access_level.grants_access();
        self.detecting = false;
        self.vehicle = Some(vehicle);
        self.access_granted = Some(granted);
        self.signal = if granted {
            SignalColor::Green
        } else {
            SignalColor::Red
        };
        Some(granted)
    }

    /// Applies `step` if it belongs to the active session and the barrier is
    /// where the step expects it. Returns whether anything changed.
    pub fn apply(&mut self, session_id: &str, step: GateStep) -> bool {
        if !self.is_session(session_id) {
            return false;
        }

        match (step, self.phase, self.access_granted) {
            (GateStep::BeginOpening, GatePhase::Closed, Some(true)) => {
                self.phase = GatePhase::Opening;
            }
            (GateStep::FinishOpening, GatePhase::Opening, _) => {
                self.phase = GatePhase::Open;
            }
            (GateStep::BeginClosing, GatePhase::Open, _) => {
                self.phase = GatePhase::Closing;
                self.signal = SignalColor::Yellow;
            }
            (GateStep::FinishClosing, GatePhase::Closing, _)
            | (GateStep::ClearDenied, GatePhase::Closed, Some(false)) => {
                *self = Self::default();
            }
            _ => return false,
        }
        true
    }

    /// Applies the steps of `schedule` that are due at the grant moment and
    /// returns the ones left to time. Called under the same lock as
    /// [`resolve`](Self::resolve) so a granted session never sits closed and
    /// idle, where a new trigger could take its place.
    pub fn begin_sequence(
        &mut self,
        session_id: &str,
        schedule: &[(Duration, GateStep)],
    ) -> Vec<(Duration, GateStep)> {
        let mut deferred = Vec::new();
        for &(offset, step) in schedule {
            if offset.is_zero() {
                self.apply(session_id, step);
            } else {
                deferred.push((offset, step));
            }
        }
        deferred
    }

    fn is_session(&self, session_id: &str) -> bool {
        self.session_id.as_deref() == Some(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccessLevel, VehicleClass};

    fn vehicle(level: AccessLevel) -> Vehicle {
        Vehicle::new("ABC-123", VehicleClass::Car, level)
    }

    #[test]
    fn idle_gate_is_closed_and_red() {
        let gate = GateSession::new();
        assert_eq!(gate.phase, GatePhase::Closed);
        assert_eq!(gate.signal, SignalColor::Red);
        assert!(gate.can_trigger());
    }

    #[test]
    fn granted_session_walks_every_phase() {
        let mut gate = GateSession::new();
        gate.begin_detection("s1".into());
        assert!(!gate.can_trigger());

        assert_eq!(gate.resolve("s1", vehicle(AccessLevel::Visitor)), Some(true));
        assert_eq!(gate.signal, SignalColor::Green);

        for (_, step) in GRANTED_SEQUENCE {
            assert!(gate.apply("s1", step));
        }
        assert_eq!(gate, GateSession::default());
        assert!(gate.can_trigger());
    }

    #[test]
    fn granted_session_is_opening_before_anyone_can_retrigger() {
        let mut gate = GateSession::new();
        gate.begin_detection("s1".into());
        gate.resolve("s1", vehicle(AccessLevel::Authorized));

        let deferred = gate.begin_sequence("s1", &GRANTED_SEQUENCE);

        assert_eq!(gate.phase, GatePhase::Opening);
        assert!(!gate.can_trigger());
        assert_eq!(deferred, GRANTED_SEQUENCE[1..].to_vec());
    }

    #[test]
    fn denied_sequence_has_nothing_due_immediately() {
        let mut gate = GateSession::new();
        gate.begin_detection("s1".into());
        gate.resolve("s1", vehicle(AccessLevel::Denied));
        let before = gate.clone();

        let deferred = gate.begin_sequence("s1", &DENIED_SEQUENCE);

        assert_eq!(gate, before);
        assert_eq!(deferred, DENIED_SEQUENCE.to_vec());
    }

    #[test]
    fn steps_out_of_order_are_ignored() {
        let mut gate = GateSession::new();
        gate.begin_detection("s1".into());
        gate.resolve("s1", vehicle(AccessLevel::Authorized));

        assert!(!gate.apply("s1", GateStep::BeginClosing));
        assert!(gate.apply("s1", GateStep::BeginOpening));
        assert!(!gate.apply("s1", GateStep::BeginOpening));
        assert_eq!(gate.phase, GatePhase::Opening);
        assert_eq!(gate.signal, SignalColor::Green);
    }

    #[test]
    fn denied_vehicle_never_moves_the_barrier() {
        let mut gate = GateSession::new();
        gate.begin_detection("s1".into());
        assert_eq!(gate.resolve("s1", vehicle(AccessLevel::Denied)), Some(false));
        assert_eq!(gate.signal, SignalColor::Red);

        assert!(!gate.apply("s1", GateStep::BeginOpening));
        assert_eq!(gate.phase, GatePhase::Closed);

        assert!(gate.apply("s1", GateStep::ClearDenied));
        assert_eq!(gate.vehicle, None);
        assert_eq!(gate.access_granted, None);
    }

    #[test]
    fn stale_session_cannot_touch_a_newer_one() {
        let mut gate = GateSession::new();
        gate.begin_detection("old".into());
        gate.resolve("old", vehicle(AccessLevel::Denied));

        assert!(gate.can_trigger());
        gate.begin_detection("new".into());

        assert!(!gate.apply("old", GateStep::ClearDenied));
        assert_eq!(gate.resolve("old", vehicle(AccessLevel::Visitor)), None);
        assert!(gate.detecting);
        assert_eq!(gate.session_id.as_deref(), Some("new"));
    }

    #[test]
    fn unrecognized_access_level_is_refused() {
        let mut gate = GateSession::new();
        gate.begin_detection("s1".into());
        let decision = gate.resolve("s1", vehicle(AccessLevel::Unrecognized("vip".into())));
        assert_eq!(decision, Some(false));
    }
}

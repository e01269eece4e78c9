pub mod controller;
pub mod occupancy;
pub mod state;

pub use controller::GateSimulator;
pub use occupancy::{GateInfo, LoadLevel, OccupancyDisplay};
pub use state::{
    GatePhase, GateSession, GateStep, SignalColor, DENIED_SEQUENCE, DETECTION_DELAY,
    GRANTED_SEQUENCE,
};

use std::fmt::Write as _;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;

use crate::{
    gate::{GateInfo, GateSession},
    models::{OccupancyState, Slot},
    sync::SyncState,
    AppState,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Refresh,
    Detect,
    Status,
    Gate,
    Set {
        index: i64,
        occupancy: OccupancyState,
        distance_cm: f64,
    },
    Help,
    Quit,
}

pub const HELP: &str = "commands:
  refresh                 reload every slot from the source
  detect                  simulate a vehicle at the gate
  status                  show slots and connection state
  gate                    show gate state and occupancy
  set <slot> <status> <cm>  record a reading (local source only)
  help                    this text
  quit                    stop";

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let Some(head) = parts.next() else {
            bail!("empty command");
        };

        let command = match head.to_ascii_lowercase().as_str() {
            "refresh" | "retry" => Command::Refresh,
            "detect" => Command::Detect,
            "status" => Command::Status,
            "gate" => Command::Gate,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "set" => {
                let index = parts
                    .next()
                    .ok_or_else(|| anyhow!("usage: set <slot> <status> <cm>"))?
                    .parse::<i64>()
                    .map_err(|_| anyhow!("slot must be a number"))?;
                if !Slot::in_range(index) {
                    bail!("slot {index} is outside 1..=6");
                }
                let occupancy = parts
                    .next()
                    .map(OccupancyState::parse)
                    .ok_or_else(|| anyhow!("usage: set <slot> <status> <cm>"))?;
                if occupancy == OccupancyState::Unknown {
                    bail!("status must be kosong, terisi or maintenance");
                }
                let distance_cm = parts
                    .next()
                    .unwrap_or("0")
                    .parse::<f64>()
                    .map_err(|_| anyhow!("distance must be a number"))?;
                if !distance_cm.is_finite() || distance_cm < 0.0 {
                    bail!("distance must be a non-negative number");
                }
                Command::Set {
                    index,
                    occupancy,
                    distance_cm,
                }
            }
            other => bail!("unknown command '{other}' (try 'help')"),
        };

        if parts.next().is_some() {
            bail!("too many arguments for '{head}'");
        }
        Ok(command)
    }
}

/// Runs one command. Returns `false` once the operator asked to quit.
pub async fn dispatch(app: &AppState, command: Command) -> Result<bool> {
    match command {
        Command::Refresh => {
            app.sync.refetch();
            println!("reloading slots...");
        }
        Command::Detect => {
            if app.gate.trigger_detection().await {
                println!("vehicle detection started");
            } else {
                println!("gate busy; wait for the current cycle to finish");
            }
        }
        Command::Status => println!("{}", render_slots(&app.sync.get_state().await)),
        Command::Gate => {
            println!("{}", render_gate(&app.gate.get_state().await, app.gate.info()))
        }
        Command::Set {
            index,
            occupancy,
            distance_cm,
        } => {
            let local = app
                .local
                .as_ref()
                .ok_or_else(|| anyhow!("'set' needs the local source"))?;
            local
                .upsert_slot(index, occupancy, distance_cm, Utc::now())
                .await?;
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

pub fn render_slots(state: &SyncState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{}]", state.connectivity.label());
    if let Some(error) = &state.error {
        let _ = writeln!(out, "error: {error} (type 'refresh' to retry)");
    }
    if state.is_loading {
        let _ = writeln!(out, "loading parking data...");
    }

    for slot in &state.slots {
        let _ = writeln!(
            out,
            "SLOT {} {:<11} {:>7.1} cm  updated {}",
            slot.index,
            slot.occupancy.label(),
            slot.distance_cm,
            slot.observed_at.format("%H:%M:%S")
        );
    }

    let summary = state.summary();
    let _ = write!(
        out,
        "available {} | occupied {} | maintenance {} | total {}",
        summary.available, summary.occupied, summary.maintenance, summary.total
    );
    out
}

pub fn render_gate(session: &GateSession, info: &GateInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} - {}", info.location, info.gate_id);

    let status = if session.detecting {
        "detecting...".to_string()
    } else {
        session.phase.as_str().to_string()
    };
    let _ = writeln!(out, "gate {status}, light {}", session.signal.as_str());

    if let Some(vehicle) = &session.vehicle {
        let decision = match session.access_granted {
            Some(true) => "ACCESS GRANTED",
            Some(false) => "ACCESS DENIED",
            None => "pending",
        };
        let _ = writeln!(
            out,
            "vehicle {} ({}, {}) {decision}",
            vehicle.plate,
            vehicle.class.as_str(),
            vehicle.access_level.as_str()
        );
    }

    let occupancy = info.occupancy();
    let _ = write!(
        out,
        "occupancy {}/{} ({:.1}%), {} spots free",
        occupancy.current, occupancy.max, occupancy.percent, occupancy.available
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gate::{GatePhase, SignalColor},
        models::{AccessLevel, Vehicle, VehicleClass},
        sync::state::normalize_slots,
    };

    #[test]
    fn parses_simple_commands() {
        assert_eq!(Command::parse("refresh").unwrap(), Command::Refresh);
        assert_eq!(Command::parse("  DETECT ").unwrap(), Command::Detect);
        assert_eq!(Command::parse("exit").unwrap(), Command::Quit);
        assert!(Command::parse("").is_err());
        assert!(Command::parse("status now").is_err());
        assert!(Command::parse("dance").is_err());
    }

    #[test]
    fn parses_set_readings() {
        assert_eq!(
            Command::parse("set 3 Terisi 12.5").unwrap(),
            Command::Set {
                index: 3,
                occupancy: OccupancyState::Occupied,
                distance_cm: 12.5,
            }
        );
        assert_eq!(
            Command::parse("set 1 kosong").unwrap(),
            Command::Set {
                index: 1,
                occupancy: OccupancyState::Empty,
                distance_cm: 0.0,
            }
        );
        assert!(Command::parse("set 9 kosong 1").is_err());
        assert!(Command::parse("set 2 parked 1").is_err());
        assert!(Command::parse("set 2 kosong -4").is_err());
    }

    #[test]
    fn slot_rendering_shows_error_and_summary() {
        let state = SyncState {
            slots: normalize_slots(Vec::new(), Utc::now()),
            connectivity: crate::sync::Connectivity::Disconnected,
            error: Some("timeout".into()),
            is_loading: false,
        };
        let text = render_slots(&state);
        assert!(text.starts_with("[DISCONNECTED]"));
        assert!(text.contains("error: timeout"));
        assert!(text.contains("SLOT 6 EMPTY"));
        assert!(text.ends_with("available 6 | occupied 0 | maintenance 0 | total 6"));
    }

    #[test]
    fn gate_rendering_shows_decision() {
        let session = GateSession {
            session_id: Some("s".into()),
            detecting: false,
            vehicle: Some(Vehicle::new("DEF-456", VehicleClass::Car, AccessLevel::Denied)),
            access_granted: Some(false),
            phase: GatePhase::Closed,
            signal: SignalColor::Red,
        };
        let text = render_gate(&session, &GateInfo::default());
        assert!(text.contains("Main Entrance - GATE-001"));
        assert!(text.contains("gate closed, light red"));
        assert!(text.contains("DEF-456 (car, denied) ACCESS DENIED"));
        assert!(text.ends_with("occupancy 87/150 (58.0%), 63 spots free"));
    }
}

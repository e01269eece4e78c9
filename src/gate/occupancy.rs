use serde::{Deserialize, Serialize};

/// Display-only facts about the gate. Nothing here is derived from slot
/// state or gate transitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GateInfo {
    pub gate_id: String,
    pub location: String,
    pub max_capacity: u32,
    pub current_occupancy: u32,
}

impl Default for GateInfo {
    fn default() -> Self {
        Self {
            gate_id: "GATE-001".into(),
            location: "Main Entrance".into(),
            max_capacity: 150,
            current_occupancy: 87,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LoadLevel {
    Normal,
    Busy,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyDisplay {
    pub current: u32,
    pub max: u32,
    pub percent: f64,
    pub available: u32,
    pub level: LoadLevel,
}

impl GateInfo {
    pub fn occupancy(&self) -> OccupancyDisplay {
        let percent = if self.max_capacity == 0 {
            0.0
        } else {
            f64::from(self.current_occupancy) / f64::from(self.max_capacity) * 100.0
        };

        let level = if percent > 90.0 {
            LoadLevel::Critical
        } else if percent > 70.0 {
            LoadLevel::Busy
        } else {
            LoadLevel::Normal
        };

        OccupancyDisplay {
            current: self.current_occupancy,
            max: self.max_capacity,
            percent,
            available: self.max_capacity.saturating_sub(self.current_occupancy),
            level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(current: u32, max: u32) -> GateInfo {
        GateInfo {
            current_occupancy: current,
            max_capacity: max,
            ..GateInfo::default()
        }
    }

    #[test]
    fn defaults_leave_spots_available() {
        let display = GateInfo::default().occupancy();
        assert_eq!(display.available, 63);
        assert!((display.percent - 58.0).abs() < 0.01);
        assert_eq!(display.level, LoadLevel::Normal);
    }

    #[test]
    fn level_thresholds_are_exclusive() {
        assert_eq!(info(70, 100).occupancy().level, LoadLevel::Normal);
        assert_eq!(info(71, 100).occupancy().level, LoadLevel::Busy);
        assert_eq!(info(90, 100).occupancy().level, LoadLevel::Busy);
        assert_eq!(info(91, 100).occupancy().level, LoadLevel::Critical);
    }

    #[test]
    fn zero_capacity_and_overfull_lots_do_not_panic() {
        let empty = info(5, 0).occupancy();
        assert_eq!(empty.percent, 0.0);
        assert_eq!(empty.available, 0);

        let overfull = info(160, 150).occupancy();
        assert_eq!(overfull.available, 0);
        assert_eq!(overfull.level, LoadLevel::Critical);
    }
}

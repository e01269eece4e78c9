mod slot;
mod vehicle;

pub use slot::{parse_timestamp, OccupancyState, Slot, SLOT_COUNT};
pub use vehicle::{default_candidates, AccessLevel, Vehicle, VehicleClass};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of physical slots the dashboard tracks. Indices run `1..=SLOT_COUNT`.
pub const SLOT_COUNT: i64 = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OccupancyState {
    #[default]
    Empty,
    Occupied,
    Maintenance,
    /// Status string the dashboard does not recognise. Kept so one odd row
    /// does not fail the whole fetch.
    Unknown,
}

impl OccupancyState {
    /// Case-insensitive parse of the `status` column. The table is written by
    /// sensor firmware using Indonesian labels; English labels are accepted too.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "kosong" | "empty" => OccupancyState::Empty,
            "terisi" | "occupied" => OccupancyState::Occupied,
            "maintenance" => OccupancyState::Maintenance,
            _ => OccupancyState::Unknown,
        }
    }

    /// Value written back to the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            OccupancyState::Empty => "kosong",
            OccupancyState::Occupied => "terisi",
            OccupancyState::Maintenance => "maintenance",
            OccupancyState::Unknown => "unknown",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OccupancyState::Empty => "EMPTY",
            OccupancyState::Occupied => "OCCUPIED",
            OccupancyState::Maintenance => "MAINTENANCE",
            OccupancyState::Unknown => "UNKNOWN",
        }
    }
}

impl Serialize for OccupancyState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OccupancyState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(OccupancyState::parse(&raw))
    }
}

/// One parking space, in the row shape the slot table uses on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: i64,
    #[serde(rename = "slot")]
    pub index: i64,
    #[serde(rename = "status")]
    pub occupancy: OccupancyState,
    #[serde(rename = "jarak")]
    pub distance_cm: f64,
    #[serde(
        rename = "created_at",
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub observed_at: DateTime<Utc>,
}

impl Slot {
    /// Stand-in for an index the source has no row for.
    pub fn placeholder(index: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: index,
            index,
            occupancy: OccupancyState::Empty,
            distance_cm: 0.0,
            observed_at: now,
        }
    }

    pub fn in_range(index: i64) -> bool {
        (1..=SLOT_COUNT).contains(&index)
    }
}

/// Parses `created_at` values. Hosted tables emit RFC 3339; `timestamp`
/// columns without a zone come back naive and are taken as UTC.
pub fn parse_timestamp(value: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(anyhow::anyhow!("invalid timestamp '{value}'"))
}

fn serialize_timestamp<S: Serializer>(
    value: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339())
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

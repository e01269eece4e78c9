use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::gate::GateInfo;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const DEFAULT_TABLE_NAME: &str = "parkingg";
const DEFAULT_DB_PATH: &str = "parkwatch.sqlite3";
const DEFAULT_POLL_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Rest,
    Local,
}

/// Optional JSON file for the display-only gate values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DisplaySettings {
    gate_id: Option<String>,
    location: Option<String>,
    max_capacity: Option<u32>,
    current_occupancy: Option<u32>,
}

impl DisplaySettings {
    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        Ok(serde_json::from_str(&contents).unwrap_or_else(|err| {
            log_warn!("ignoring malformed settings file {}: {err}", path.display());
            Self::default()
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub source: SourceKind,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub table_name: String,
    pub db_path: PathBuf,
    pub poll_interval: Duration,
    pub gate: GateInfo,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let supabase_url = get("SUPABASE_URL");
        let supabase_key = get("SUPABASE_ANON_KEY");

        let table_name = get("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string());
        validate_table_name(&table_name)?;

        let source = match get("PARKWATCH_SOURCE").map(|v| v.to_ascii_lowercase()) {
            Some(kind) if kind == "rest" => SourceKind::Rest,
            Some(kind) if kind == "local" => SourceKind::Local,
            Some(other) => bail!("unknown PARKWATCH_SOURCE '{other}' (expected rest or local)"),
            None if supabase_url.is_some() => SourceKind::Rest,
            None => SourceKind::Local,
        };

        if source == SourceKind::Rest && (supabase_url.is_none() || supabase_key.is_none()) {
            bail!("the rest source needs both SUPABASE_URL and SUPABASE_ANON_KEY");
        }

        let db_path = get("PARKWATCH_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let poll_ms = parse_or(get("PARKWATCH_POLL_MS"), "PARKWATCH_POLL_MS", DEFAULT_POLL_MS)
            .max(1);

        let display = match get("PARKWATCH_SETTINGS") {
            Some(path) => DisplaySettings::load(Path::new(&path))?,
            None => DisplaySettings::default(),
        };
        let defaults = GateInfo::default();
        let gate = GateInfo {
            gate_id: get("GATE_ID")
                .or(display.gate_id)
                .unwrap_or(defaults.gate_id),
            location: get("GATE_LOCATION")
                .or(display.location)
                .unwrap_or(defaults.location),
            max_capacity: parse_or(
                get("GATE_MAX_CAPACITY"),
                "GATE_MAX_CAPACITY",
                display.max_capacity.unwrap_or(defaults.max_capacity),
            ),
            current_occupancy: parse_or(
                get("GATE_CURRENT_OCCUPANCY"),
                "GATE_CURRENT_OCCUPANCY",
                display.current_occupancy.unwrap_or(defaults.current_occupancy),
            ),
        };

        Ok(Self {
            source,
            supabase_url,
            supabase_key,
            table_name,
            db_path,
            poll_interval: Duration::from_millis(poll_ms),
            gate,
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, fallback: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match value {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            log_warn!("{key}='{raw}' is not a valid number; using default");
            fallback
        }),
        None => fallback,
    }
}

/// The table name is spliced into SQL for the local source, so only plain
/// identifiers are accepted.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("invalid TABLE_NAME '{name}': use letters, digits and underscores");
    }
    Ok(())
}

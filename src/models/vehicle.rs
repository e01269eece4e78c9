use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum VehicleClass {
    Car,
    Truck,
    Motorcycle,
}

impl VehicleClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleClass::Car => "car",
            VehicleClass::Truck => "truck",
            VehicleClass::Motorcycle => "motorcycle",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AccessLevel {
    Authorized,
    Visitor,
    Denied,
    /// Anything the access list hands back that we have no rule for.
    #[serde(untagged)]
    Unrecognized(String),
}

impl AccessLevel {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "authorized" => AccessLevel::Authorized,
            "visitor" => AccessLevel::Visitor,
            "denied" => AccessLevel::Denied,
            other => AccessLevel::Unrecognized(other.to_string()),
        }
    }

    /// Authorized and visitor pass; everything else, including levels we do
    /// not recognise, is refused.
    pub fn grants_access(&self) -> bool {
        matches!(self, AccessLevel::Authorized | AccessLevel::Visitor)
    }

    pub fn as_str(&self) -> &str {
        match self {
            AccessLevel::Authorized => "authorized",
            AccessLevel::Visitor => "visitor",
            AccessLevel::Denied => "denied",
            AccessLevel::Unrecognized(raw) => raw.as_str(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub plate: String,
    pub class: VehicleClass,
    pub access_level: AccessLevel,
}

impl Vehicle {
    pub fn new(plate: &str, class: VehicleClass, access_level: AccessLevel) -> Self {
        Self {
            plate: plate.to_string(),
            class,
            access_level,
        }
    }
}

/// Vehicles the gate sensor mock picks from.
pub fn default_candidates() -> Vec<Vehicle> {
    vec![
        Vehicle::new("ABC-123", VehicleClass::Car, AccessLevel::Authorized),
        Vehicle::new("XYZ-789", VehicleClass::Truck, AccessLevel::Visitor),
        Vehicle::new("DEF-456", VehicleClass::Car, AccessLevel::Denied),
    ]
}

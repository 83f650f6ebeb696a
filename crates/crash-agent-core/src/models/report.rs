use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::damage::PartDamage;
use super::vehicle::VehicleSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportEventType {
    CrashDetected,
    VehicleDestroyed,
}

impl ReportEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CrashDetected => "crash_detected",
            Self::VehicleDestroyed => "vehicle_destroyed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub agent_version: String,
    pub host_version: String,
    pub damage_threshold: f64,
}

/// One crash report. Built only by `ReportBuilder`; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrashReport {
    pub(crate) event_type: ReportEventType,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) vehicle: VehicleSnapshot,
    pub(crate) total_damage: f64,
    pub(crate) damage_delta: f64,
    pub(crate) parts: Vec<PartDamage>,
    pub(crate) damaged_parts_count: usize,
    pub(crate) total_parts_count: usize,
    pub(crate) metadata: ReportMetadata,
}

impl CrashReport {
    pub fn event_type(&self) -> ReportEventType {
        self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn vehicle(&self) -> &VehicleSnapshot {
        &self.vehicle
    }

    pub fn total_damage(&self) -> f64 {
        self.total_damage
    }

    pub fn damage_delta(&self) -> f64 {
        self.damage_delta
    }

    /// Damaged parts, most damaged first.
    pub fn parts(&self) -> &[PartDamage] {
        &self.parts
    }

    pub fn damaged_parts_count(&self) -> usize {
        self.damaged_parts_count
    }

    pub fn total_parts_count(&self) -> usize {
        self.total_parts_count
    }

    pub fn broken_parts(&self) -> impl Iterator<Item = &PartDamage> {
        self.parts.iter().filter(|part| part.is_broken())
    }

    pub fn metadata(&self) -> &ReportMetadata {
        &self.metadata
    }
}

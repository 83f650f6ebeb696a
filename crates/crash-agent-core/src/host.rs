//! Capabilities the host simulation provides to the agent.

use crate::models::{Kinematics, VehicleIdentity};

/// One raw part reading as the host reports it, before sanitization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPartReading {
    pub part_id: String,
    pub label: String,
    pub damage: f64,
}

impl RawPartReading {
    pub fn new(part_id: impl Into<String>, label: impl Into<String>, damage: f64) -> Self {
        Self {
            part_id: part_id.into(),
            label: label.into(),
            damage,
        }
    }
}

pub trait DamageSource {
    /// Current per-part damage. Called at most once per tick.
    fn read_part_damage(&self) -> Vec<RawPartReading>;
}

pub trait KinematicsSource {
    fn identity(&self) -> VehicleIdentity;
    fn kinematics(&self) -> Kinematics;
}

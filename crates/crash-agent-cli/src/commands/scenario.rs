use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use crash_agent_core::host::{DamageSource, KinematicsSource, RawPartReading};
use crash_agent_core::models::{Kinematics, Quat, Vec3, VehicleIdentity};
use crash_agent_core::transport::{Ack, DeliveryRequest, Transport, TransportError};
use crash_agent_core::wire::report_to_value;
use serde::Deserialize;
use serde_json::Value;

/// Recorded drive: one entry per host tick.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    #[serde(default)]
    pub vehicle: VehicleIdentity,
    /// Display names keyed by part id.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub ticks: Vec<ScenarioTick>,
}

/// Fields left out keep the value from the previous tick. A `null` damage
/// stands for a reading the host could not produce.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ScenarioTick {
    pub dt: Option<f64>,
    pub parts: Option<BTreeMap<String, Option<f64>>>,
    pub position: Option<Vec3>,
    pub velocity: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub reset: bool,
    pub destroyed: bool,
}

impl Scenario {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid scenario {}", path.display()))
    }

    pub(crate) fn parse(raw: &str) -> Result<Self> {
        let scenario = serde_json::from_str::<Self>(raw)?;
        for (index, tick) in scenario.ticks.iter().enumerate() {
            if let Some(dt) = tick.dt
                && (!dt.is_finite() || dt < 0.0)
            {
                bail!("tick {index}: dt must be finite and >= 0, got {dt}");
            }
        }
        Ok(scenario)
    }
}

/// Vehicle state driven by scenario ticks.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScenarioHost {
    identity: VehicleIdentity,
    labels: BTreeMap<String, String>,
    parts: BTreeMap<String, Option<f64>>,
    kinematics: Kinematics,
}

impl ScenarioHost {
    pub(crate) fn new(scenario: &Scenario) -> Self {
        Self {
            identity: scenario.vehicle.clone(),
            labels: scenario.labels.clone(),
            ..Self::default()
        }
    }

    pub(crate) fn apply(&mut self, tick: &ScenarioTick) {
        if let Some(parts) = &tick.parts {
            self.parts.clone_from(parts);
        }
        if let Some(position) = tick.position {
            self.kinematics.position = position;
        }
        if let Some(velocity) = tick.velocity {
            self.kinematics.velocity = velocity;
        }
        if let Some(rotation) = tick.rotation {
            self.kinematics.rotation = rotation;
        }
    }
}

impl DamageSource for ScenarioHost {
    fn read_part_damage(&self) -> Vec<RawPartReading> {
        self.parts
            .iter()
            .map(|(part_id, damage)| {
                let label = self.labels.get(part_id).cloned().unwrap_or_default();
                RawPartReading::new(part_id.clone(), label, damage.unwrap_or(f64::NAN))
            })
            .collect()
    }
}

impl KinematicsSource for ScenarioHost {
    fn identity(&self) -> VehicleIdentity {
        self.identity.clone()
    }

    fn kinematics(&self) -> Kinematics {
        self.kinematics
    }
}

/// Accepts every report and keeps its wire payload.
#[derive(Debug, Default)]
pub(crate) struct RecordingTransport {
    payloads: Mutex<Vec<Value>>,
}

impl RecordingTransport {
    pub(crate) fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn payloads(&self) -> Vec<Value> {
        self.payloads
            .lock()
            .map(|payloads| payloads.clone())
            .unwrap_or_default()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, request: &DeliveryRequest) -> std::result::Result<Ack, TransportError> {
        let value = report_to_value(&request.report)
            .map_err(|err| TransportError::Encode(err.to_string()))?;
        self.payloads
            .lock()
            .map_err(|_| TransportError::Request("payload log poisoned".to_string()))?
            .push(value);
        Ok(Ack { status: 202 })
    }
}

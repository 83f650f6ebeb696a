//! Collector wire format. Non-finite numbers are written as `null`.

use serde::Serialize;

use crate::models::CrashReport;

const ISO_SECONDS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Serialize)]
struct WireReport<'a> {
    event_type: &'static str,
    timestamp: i64,
    timestamp_iso: String,
    vehicle: WireVehicle<'a>,
    position: WireVec3,
    velocity: WireVelocity,
    rotation: WireQuat,
    damage: WireDamage<'a>,
    metadata: WireMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct WireVehicle<'a> {
    id: &'a str,
    name: &'a str,
    model: &'a str,
    brand: &'a str,
    year: Option<u32>,
    plate: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WireVec3 {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
}

#[derive(Debug, Serialize)]
struct WireVelocity {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
    speed_ms: Option<f64>,
    speed_kmh: Option<f64>,
    speed_mph: Option<f64>,
}

#[derive(Debug, Serialize)]
struct WireQuat {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
    w: Option<f64>,
}

#[derive(Debug, Serialize)]
struct WireDamage<'a> {
    total_damage: Option<f64>,
    damage_delta: Option<f64>,
    damaged_parts_count: usize,
    total_parts_count: usize,
    parts: Vec<WirePart<'a>>,
}

#[derive(Debug, Serialize)]
struct WirePart<'a> {
    name: &'a str,
    #[serde(rename = "partId")]
    part_id: &'a str,
    damage: Option<f64>,
}

#[derive(Debug, Serialize)]
struct WireMetadata<'a> {
    mod_version: &'a str,
    beamng_version: &'a str,
    damage_threshold: Option<f64>,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn wire_report(report: &CrashReport) -> WireReport<'_> {
    let vehicle = report.vehicle();
    let identity = &vehicle.identity;
    WireReport {
        event_type: report.event_type().as_str(),
        timestamp: report.timestamp().timestamp(),
        timestamp_iso: report.timestamp().format(ISO_SECONDS_FORMAT).to_string(),
        vehicle: WireVehicle {
            id: &identity.id,
            name: &identity.name,
            model: &identity.model,
            brand: &identity.brand,
            year: identity.year,
            plate: identity.plate.as_deref(),
        },
        position: WireVec3 {
            x: finite(vehicle.position.x),
            y: finite(vehicle.position.y),
            z: finite(vehicle.position.z),
        },
        velocity: WireVelocity {
            x: finite(vehicle.velocity.x),
            y: finite(vehicle.velocity.y),
            z: finite(vehicle.velocity.z),
            speed_ms: finite(vehicle.speed_ms()),
            speed_kmh: finite(vehicle.speed_kmh()),
            speed_mph: finite(vehicle.speed_mph()),
        },
        rotation: WireQuat {
            x: finite(vehicle.rotation.x),
            y: finite(vehicle.rotation.y),
            z: finite(vehicle.rotation.z),
            w: finite(vehicle.rotation.w),
        },
        damage: WireDamage {
            total_damage: finite(report.total_damage()),
            damage_delta: finite(report.damage_delta()),
            damaged_parts_count: report.damaged_parts_count(),
            total_parts_count: report.total_parts_count(),
            parts: report
                .parts()
                .iter()
                .map(|part| WirePart {
                    name: &part.label,
                    part_id: &part.part_id,
                    damage: part.damage.and_then(finite),
                })
                .collect(),
        },
        metadata: WireMetadata {
            mod_version: &report.metadata().agent_version,
            beamng_version: &report.metadata().host_version,
            damage_threshold: finite(report.metadata().damage_threshold),
        },
    }
}

pub fn encode_report(report: &CrashReport) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&wire_report(report))
}

pub fn report_to_value(report: &CrashReport) -> serde_json::Result<serde_json::Value> {
    serde_json::to_value(wire_report(report))
}

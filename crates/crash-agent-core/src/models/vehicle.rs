use serde::{Deserialize, Serialize};

const MS_TO_KMH: f64 = 3.6;
const MS_TO_MPH: f64 = 2.236_936;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quat {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleIdentity {
    pub id: String,
    pub name: String,
    pub model: String,
    pub brand: String,
    pub year: Option<u32>,
    pub plate: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Kinematics {
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Quat,
}

/// Identity and kinematics captured at report time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub identity: VehicleIdentity,
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Quat,
}

impl VehicleSnapshot {
    pub fn capture(identity: VehicleIdentity, kinematics: Kinematics) -> Self {
        Self {
            identity,
            position: kinematics.position,
            velocity: kinematics.velocity,
            rotation: kinematics.rotation,
        }
    }

    pub fn speed_ms(&self) -> f64 {
        self.velocity.length()
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_ms() * MS_TO_KMH
    }

    pub fn speed_mph(&self) -> f64 {
        self.speed_ms() * MS_TO_MPH
    }
}

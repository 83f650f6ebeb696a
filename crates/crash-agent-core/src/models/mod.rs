mod damage;
mod queue;
mod report;
mod vehicle;

pub use damage::{
    BROKEN_DAMAGE_THRESHOLD, DamageSeverity, ImpactZone, PartDamage, PartDamageMap,
    ZONE_DAMAGE_THRESHOLD, sanitize_ratio,
};
pub use queue::{DeliveryOutcome, DrainReport, QueueStats};
pub use report::{CrashReport, ReportEventType, ReportMetadata};
pub use vehicle::{Kinematics, Quat, Vec3, VehicleIdentity, VehicleSnapshot};

use crate::host::{DamageSource, RawPartReading};
use crate::models::{PartDamage, PartDamageMap};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DamageSample {
    pub parts: PartDamageMap,
    /// Readings that were non-finite, had an empty id, or repeated an id.
    pub anomalies: usize,
}

pub fn sample_damage(source: &dyn DamageSource) -> DamageSample {
    sanitize_readings(source.read_part_damage())
}

pub fn sanitize_readings(readings: impl IntoIterator<Item = RawPartReading>) -> DamageSample {
    let mut sample = DamageSample::default();
    for reading in readings {
        let part_id = reading.part_id.trim();
        if part_id.is_empty() {
            sample.anomalies += 1;
            continue;
        }
        if !reading.damage.is_finite() {
            sample.anomalies += 1;
        }
        let label = if reading.label.trim().is_empty() {
            part_id.to_string()
        } else {
            reading.label
        };
        if sample
            .parts
            .insert(PartDamage::new(part_id, label, reading.damage))
            .is_some()
        {
            sample.anomalies += 1;
        }
    }
    if sample.anomalies > 0 {
        log::debug!(
            "sanitized {} anomalous damage readings across {} parts",
            sample.anomalies,
            sample.parts.len()
        );
    }
    sample
}

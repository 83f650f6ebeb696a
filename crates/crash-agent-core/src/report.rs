use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::models::{
    CrashReport, PartDamage, PartDamageMap, ReportEventType, ReportMetadata, VehicleSnapshot,
};

pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
pub struct ReportBuilder {
    agent_version: String,
    host_version: String,
    threshold: f64,
}

impl ReportBuilder {
    pub fn new(host_version: impl Into<String>, threshold: f64) -> Self {
        Self {
            agent_version: AGENT_VERSION.to_string(),
            host_version: host_version.into(),
            threshold,
        }
    }

    pub fn build(
        &self,
        event_type: ReportEventType,
        snapshot: VehicleSnapshot,
        parts: &PartDamageMap,
        baseline_mean: f64,
        current_mean: f64,
        timestamp: DateTime<Utc>,
    ) -> CrashReport {
        CrashReport {
            event_type,
            timestamp,
            vehicle: snapshot,
            total_damage: current_mean,
            damage_delta: current_mean - baseline_mean,
            parts: ranked_parts(parts),
            damaged_parts_count: parts.damaged_count(),
            total_parts_count: parts.len(),
            metadata: ReportMetadata {
                agent_version: self.agent_version.clone(),
                host_version: self.host_version.clone(),
                damage_threshold: self.threshold,
            },
        }
    }

    /// Final report for a vehicle the host is tearing down. Damage totals are
    /// fixed at `1.0` with no delta whatever the last measurement said.
    pub fn build_terminal(
        &self,
        snapshot: VehicleSnapshot,
        parts: &PartDamageMap,
        timestamp: DateTime<Utc>,
    ) -> CrashReport {
        self.build(
            ReportEventType::VehicleDestroyed,
            snapshot,
            parts,
            1.0,
            1.0,
            timestamp,
        )
    }
}

/// Damaged parts by descending ratio, then parts with unknown readings.
/// Ties keep part-id order.
fn ranked_parts(parts: &PartDamageMap) -> Vec<PartDamage> {
    let mut ranked = parts
        .iter()
        .filter(|part| part.is_damaged() || part.damage.is_none())
        .cloned()
        .collect::<Vec<_>>();
    ranked.sort_by(|a, b| match (a.damage, b.damage) {
        (Some(left), Some(right)) => right.total_cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    ranked
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::{Kinematics, VehicleIdentity};

    fn snapshot() -> VehicleSnapshot {
        VehicleSnapshot::capture(
            VehicleIdentity {
                id: "veh-1".to_string(),
                name: "T-Cross".to_string(),
                model: "tcross".to_string(),
                brand: "Volkswagen".to_string(),
                year: Some(2024),
                plate: Some("VW-TCROSS".to_string()),
            },
            Kinematics::default(),
        )
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53)
            .single()
            .expect("valid timestamp")
    }

    fn parts() -> PartDamageMap {
        [
            PartDamage::new("bumper_F", "Front Bumper", 0.6),
            PartDamage::new("door_FL", "Front Left Door", 0.0),
            PartDamage::new("fender_FL", "Front Left Fender", 0.3),
            PartDamage::new("hood", "Hood", 0.6),
            PartDamage::new("headlight_L", "Left Headlight", f64::NAN),
            PartDamage::new("engine", "Engine", 0.9),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn parts_are_sorted_descending_with_part_id_tie_break() {
        let builder = ReportBuilder::new("0.34", 0.05);
        let map = parts();
        let report = builder.build(
            ReportEventType::CrashDetected,
            snapshot(),
            &map,
            0.1,
            map.mean_damage(),
            fixed_time(),
        );
        let ids = report
            .parts()
            .iter()
            .map(|part| part.part_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec!["engine", "bumper_F", "hood", "fender_FL", "headlight_L"]
        );
        let known = report
            .parts()
            .iter()
            .filter_map(|part| part.damage)
            .collect::<Vec<_>>();
        assert!(known.windows(2).all(|pair| pair[0] >= pair[1]));
        assert_eq!(report.damaged_parts_count(), 4);
        assert_eq!(report.total_parts_count(), 6);
        assert_eq!(report.broken_parts().count(), 1);
    }

    #[test]
    fn delta_and_metadata_come_from_inputs() {
        let builder = ReportBuilder::new("0.34", 0.05);
        let report = builder.build(
            ReportEventType::CrashDetected,
            snapshot(),
            &parts(),
            0.25,
            0.5,
            fixed_time(),
        );
        assert_eq!(report.total_damage(), 0.5);
        assert_eq!(report.damage_delta(), 0.25);
        assert_eq!(report.metadata().host_version, "0.34");
        assert_eq!(report.metadata().agent_version, AGENT_VERSION);
        assert_eq!(report.metadata().damage_threshold, 0.05);
    }

    #[test]
    fn terminal_report_forces_full_damage_and_zero_delta() {
        let builder = ReportBuilder::new("0.34", 0.05);
        let report = builder.build_terminal(snapshot(), &parts(), fixed_time());
        assert_eq!(report.event_type(), ReportEventType::VehicleDestroyed);
        assert_eq!(report.total_damage(), 1.0);
        assert_eq!(report.damage_delta(), 0.0);
        assert_eq!(report.parts().len(), 5);
    }

    #[test]
    fn build_is_deterministic_for_equal_inputs() {
        let builder = ReportBuilder::new("0.34", 0.05);
        let map = parts();
        let first = builder.build(
            ReportEventType::CrashDetected,
            snapshot(),
            &map,
            0.1,
            0.4,
            fixed_time(),
        );
        let second = builder.build(
            ReportEventType::CrashDetected,
            snapshot(),
            &map,
            0.1,
            0.4,
            fixed_time(),
        );
        assert_eq!(first, second);
        assert_eq!(
            crate::wire::encode_report(&first).expect("encode"),
            crate::wire::encode_report(&second).expect("encode")
        );
    }
}

use serde::Serialize;

use crate::models::PartDamageMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorState {
    /// No sample observed since creation or the last reset.
    Idle,
    Armed,
    /// A crash fired less than one cooldown ago.
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum CrashDecision {
    None,
    Crashed {
        delta: f64,
        baseline_mean: f64,
        current_mean: f64,
    },
}

impl CrashDecision {
    pub fn is_crash(&self) -> bool {
        matches!(self, Self::Crashed { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DamageBaseline {
    pub mean_damage: f64,
    pub parts: PartDamageMap,
    pub observed_at: f64,
}

/// Threshold and cooldown detector for one vehicle instance.
///
/// The baseline advances on every evaluation, so each delta is measured
/// against the previous sample rather than against the last crash.
#[derive(Debug, Clone)]
pub struct CrashDetector {
    threshold: f64,
    cooldown_secs: f64,
    state: DetectorState,
    baseline: Option<DamageBaseline>,
    last_crash_at: Option<f64>,
}

impl CrashDetector {
    pub fn new(threshold: f64, cooldown_secs: f64) -> Self {
        Self {
            threshold,
            cooldown_secs: cooldown_secs.max(0.0),
            state: DetectorState::Idle,
            baseline: None,
            last_crash_at: None,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn baseline(&self) -> Option<&DamageBaseline> {
        self.baseline.as_ref()
    }

    pub fn last_crash_at(&self) -> Option<f64> {
        self.last_crash_at
    }

    pub fn evaluate(&mut self, current: &PartDamageMap, now: f64) -> CrashDecision {
        let current_mean = current.mean_damage();
        let decision = match &self.baseline {
            None => CrashDecision::None,
            Some(baseline) => {
                let delta = current_mean - baseline.mean_damage;
                if delta >= self.threshold && self.cooldown_elapsed(now) {
                    CrashDecision::Crashed {
                        delta,
                        baseline_mean: baseline.mean_damage,
                        current_mean,
                    }
                } else {
                    CrashDecision::None
                }
            }
        };

        self.state = if decision.is_crash() {
            self.last_crash_at = Some(now);
            DetectorState::Cooldown
        } else if self.cooldown_elapsed(now) {
            DetectorState::Armed
        } else {
            DetectorState::Cooldown
        };
        self.baseline = Some(DamageBaseline {
            mean_damage: current_mean,
            parts: current.clone(),
            observed_at: now,
        });
        decision
    }

    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.baseline = None;
        self.last_crash_at = None;
    }

    fn cooldown_elapsed(&self, now: f64) -> bool {
        self.last_crash_at
            .is_none_or(|last| now - last >= self.cooldown_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PartDamage;

    fn uniform(mean: f64) -> PartDamageMap {
        [PartDamage::new("body", "Body", mean)].into_iter().collect()
    }

    fn crash_delta(decision: CrashDecision) -> Option<f64> {
        match decision {
            CrashDecision::Crashed { delta, .. } => Some(delta),
            CrashDecision::None => None,
        }
    }

    #[test]
    fn first_sample_arms_without_firing() {
        let mut detector = CrashDetector::new(0.05, 2.0);
        assert_eq!(detector.state(), DetectorState::Idle);
        assert_eq!(detector.evaluate(&uniform(0.9), 0.0), CrashDecision::None);
        assert_eq!(detector.state(), DetectorState::Armed);
        assert_eq!(detector.baseline().map(|b| b.mean_damage), Some(0.9));
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let mut at = CrashDetector::new(0.25, 2.0);
        at.evaluate(&uniform(0.25), 0.0);
        assert_eq!(crash_delta(at.evaluate(&uniform(0.5), 0.1)), Some(0.25));

        let mut below = CrashDetector::new(0.25, 2.0);
        below.evaluate(&uniform(0.25), 0.0);
        assert_eq!(below.evaluate(&uniform(0.5 - 1e-9), 0.1), CrashDecision::None);
    }

    #[test]
    fn cooldown_suppresses_second_crash_inside_window() {
        let mut detector = CrashDetector::new(0.1, 2.0);
        detector.evaluate(&uniform(0.0), 0.0);
        assert!(detector.evaluate(&uniform(0.2), 1.0).is_crash());
        assert!(!detector.evaluate(&uniform(0.4), 2.5).is_crash());
        assert_eq!(detector.state(), DetectorState::Cooldown);
        assert_eq!(detector.last_crash_at(), Some(1.0));
    }

    #[test]
    fn cooldown_allows_second_crash_once_elapsed() {
        let mut detector = CrashDetector::new(0.1, 2.0);
        detector.evaluate(&uniform(0.0), 0.0);
        assert!(detector.evaluate(&uniform(0.2), 1.0).is_crash());
        assert!(detector.evaluate(&uniform(0.4), 3.0).is_crash());
        assert_eq!(detector.last_crash_at(), Some(3.0));
    }

    #[test]
    fn state_returns_to_armed_after_quiet_cooldown() {
        let mut detector = CrashDetector::new(0.1, 1.0);
        detector.evaluate(&uniform(0.0), 0.0);
        detector.evaluate(&uniform(0.5), 0.5);
        assert_eq!(detector.state(), DetectorState::Cooldown);
        detector.evaluate(&uniform(0.5), 1.0);
        assert_eq!(detector.state(), DetectorState::Cooldown);
        detector.evaluate(&uniform(0.5), 2.0);
        assert_eq!(detector.state(), DetectorState::Armed);
    }

    #[test]
    fn slow_accumulation_below_threshold_never_fires() {
        let mut detector = CrashDetector::new(0.05, 0.0);
        let mut fired = false;
        for step in 0..40 {
            let mean = f64::from(step) * 0.02;
            fired |= detector.evaluate(&uniform(mean), f64::from(step)).is_crash();
        }
        assert!(!fired);
        assert!(detector.baseline().is_some_and(|b| b.mean_damage > 0.75));
    }

    #[test]
    fn reset_clears_baseline_and_cooldown() {
        let mut detector = CrashDetector::new(0.1, 10.0);
        detector.evaluate(&uniform(0.0), 0.0);
        assert!(detector.evaluate(&uniform(0.5), 1.0).is_crash());
        detector.reset();
        assert_eq!(detector.state(), DetectorState::Idle);
        assert!(detector.baseline().is_none());
        assert_eq!(detector.last_crash_at(), None);

        detector.evaluate(&uniform(0.0), 1.5);
        assert!(detector.evaluate(&uniform(0.5), 2.0).is_crash());
    }

    #[test]
    fn empty_part_set_never_crashes() {
        let mut detector = CrashDetector::new(0.05, 0.0);
        detector.evaluate(&PartDamageMap::new(), 0.0);
        assert_eq!(
            detector.evaluate(&PartDamageMap::new(), 1.0),
            CrashDecision::None
        );
    }

    #[test]
    fn reference_scenario_matches_expected_decisions() {
        let mut detector = CrashDetector::new(0.05, 2.0);
        detector.evaluate(&uniform(0.10), -0.1);

        assert_eq!(detector.evaluate(&uniform(0.12), 0.0), CrashDecision::None);
        assert!((detector.baseline().map(|b| b.mean_damage).unwrap_or_default() - 0.12).abs() < 1e-12);

        match detector.evaluate(&uniform(0.45), 0.3) {
            CrashDecision::Crashed {
                delta,
                current_mean,
                ..
            } => {
                assert!((delta - 0.33).abs() < 1e-9);
                assert!((current_mean - 0.45).abs() < 1e-12);
            }
            CrashDecision::None => panic!("expected crash at t=0.3"),
        }
        assert_eq!(detector.last_crash_at(), Some(0.3));

        assert_eq!(detector.evaluate(&uniform(0.60), 1.0), CrashDecision::None);
        assert!((detector.baseline().map(|b| b.mean_damage).unwrap_or_default() - 0.60).abs() < 1e-12);

        assert_eq!(detector.evaluate(&uniform(0.60), 2.5), CrashDecision::None);
    }
}

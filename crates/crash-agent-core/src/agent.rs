use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::Utc;
use reqwest::Url;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{AgentConfig, parse_endpoint};
use crate::delivery::{DeliveryCallback, DeliveryQueue};
use crate::detector::{CrashDecision, CrashDetector, DetectorState};
use crate::error::Result;
use crate::host::{DamageSource, KinematicsSource};
use crate::models::{
    CrashReport, DamageSeverity, DeliveryOutcome, DrainReport, Kinematics, PartDamageMap,
    QueueStats, ReportEventType, VehicleIdentity, VehicleSnapshot,
};
use crate::report::ReportBuilder;
use crate::sampler::{DamageSample, sample_damage};
use crate::transport::{HttpTransport, Transport};

pub type DeliveryListener = Arc<dyn Fn(&DeliveryOutcome) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TickReport {
    pub now: f64,
    pub decision: CrashDecision,
    pub report_id: Option<Uuid>,
    pub anomalies: usize,
    pub drain: DrainReport,
}

/// Crash detection and delivery for one vehicle instance.
///
/// The host calls `on_tick` once per simulation step and the lifecycle
/// methods when the vehicle is reset or torn down. None of them block on the
/// network or return an error.
pub struct CrashAgent<H: DamageSource + KinematicsSource> {
    config: AgentConfig,
    endpoint: Url,
    host: H,
    detector: CrashDetector,
    builder: ReportBuilder,
    queue: DeliveryQueue,
    listener: Option<DeliveryListener>,
    last_snapshot: Option<VehicleSnapshot>,
    clock: f64,
    crashes_detected: u64,
    terminated: bool,
}

impl<H: DamageSource + KinematicsSource> CrashAgent<H> {
    pub fn new(config: AgentConfig, host: H) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(config.http_timeout())?;
        Self::with_transport(config, host, Arc::new(transport))
    }

    pub fn with_transport(
        config: AgentConfig,
        host: H,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        let endpoint = parse_endpoint(&config.endpoint)?;
        Ok(Self {
            endpoint,
            detector: CrashDetector::new(config.damage_threshold, config.cooldown_secs()),
            builder: ReportBuilder::new(config.host_version.clone(), config.damage_threshold),
            queue: DeliveryQueue::new(transport, &config),
            config,
            host,
            listener: None,
            last_snapshot: None,
            clock: 0.0,
            crashes_detected: 0,
            terminated: false,
        })
    }

    /// Registers a listener for the terminal outcome of every report enqueued
    /// after this call.
    pub fn set_delivery_listener(
        &mut self,
        listener: impl Fn(&DeliveryOutcome) + Send + Sync + 'static,
    ) {
        self.listener = Some(Arc::new(listener));
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Seconds of simulation time seen so far.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn detector_state(&self) -> DetectorState {
        self.detector.state()
    }

    pub fn crashes_detected(&self) -> u64 {
        self.crashes_detected
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn pending_deliveries(&self) -> usize {
        self.queue.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn on_tick(&mut self, dt: f64) -> TickReport {
        if dt.is_finite() && dt > 0.0 {
            self.clock += dt;
        }
        let now = self.clock;
        let mut tick = TickReport {
            now,
            decision: CrashDecision::None,
            report_id: None,
            anomalies: 0,
            drain: DrainReport::default(),
        };

        if !self.terminated
            && let Some(sample) = self.sample()
        {
            tick.anomalies = sample.anomalies;
            tick.decision = self.detector.evaluate(&sample.parts, now);
            if let CrashDecision::Crashed {
                delta,
                baseline_mean,
                current_mean,
            } = tick.decision
            {
                let snapshot = self.report_snapshot();
                self.crashes_detected += 1;
                let report = self.builder.build(
                    ReportEventType::CrashDetected,
                    snapshot,
                    &sample.parts,
                    baseline_mean,
                    current_mean,
                    Utc::now(),
                );
                log::info!(
                    "crash detected for {} at t={now:.3}: delta {delta:.3}, mean damage {current_mean:.3}, {} damaged parts ({} broken, worst {}), zones: {}",
                    report.vehicle().identity.id,
                    report.damaged_parts_count(),
                    report.broken_parts().count(),
                    DamageSeverity::classify(sample.parts.max_damage()).as_str(),
                    describe_zones(&sample.parts)
                );
                tick.report_id = Some(self.enqueue(report, now));
            }
        }

        tick.drain = self.queue.drain_due(now);
        if !tick.drain.is_idle() {
            log::debug!("delivery pass at t={now:.3}: {:?}", tick.drain);
        }
        tick
    }

    pub fn on_reset(&mut self) {
        self.detector.reset();
        self.terminated = false;
        log::debug!("vehicle reset at t={:.3}; detector back to idle", self.clock);
    }

    /// Flushes a `vehicle_destroyed` report. Later ticks only drain the queue
    /// until the next reset.
    pub fn on_terminal(&mut self) -> Option<Uuid> {
        if self.terminated {
            return None;
        }
        self.terminated = true;
        let now = self.clock;
        let parts = match self.sample() {
            Some(sample) => sample.parts,
            None => match self.detector.baseline() {
                Some(baseline) => {
                    log::warn!(
                        "terminal sample unavailable; using parts observed at t={:.3}",
                        baseline.observed_at
                    );
                    baseline.parts.clone()
                }
                None => PartDamageMap::new(),
            },
        };
        let snapshot = self.report_snapshot();
        let report = self.builder.build_terminal(snapshot, &parts, Utc::now());
        log::info!(
            "vehicle {} destroyed at t={now:.3}; flushing {} damaged parts ({} broken)",
            report.vehicle().identity.id,
            report.damaged_parts_count(),
            parts.broken_count()
        );
        let report_id = self.enqueue(report, now);
        self.queue.drain_due(now);
        Some(report_id)
    }

    fn enqueue(&mut self, report: CrashReport, now: f64) -> Uuid {
        let destination = self.endpoint.clone();
        match &self.listener {
            Some(listener) => {
                let listener = Arc::clone(listener);
                let callback: DeliveryCallback =
                    Box::new(move |outcome: &DeliveryOutcome| listener(outcome));
                self.queue
                    .enqueue_with_callback(report, destination, now, callback)
            }
            None => self.queue.enqueue(report, destination, now),
        }
    }

    fn sample(&self) -> Option<DamageSample> {
        let host = &self.host;
        contain("damage source", || sample_damage(host))
    }

    /// A report is built even when the vehicle source panics: the last
    /// captured snapshot stands in, or an empty one before any capture.
    fn report_snapshot(&mut self) -> VehicleSnapshot {
        let host = &self.host;
        let captured = contain("kinematics source", || {
            VehicleSnapshot::capture(host.identity(), host.kinematics())
        });
        match captured {
            Some(snapshot) => {
                self.last_snapshot = Some(snapshot.clone());
                snapshot
            }
            None => {
                log::warn!("reporting with last known vehicle state");
                self.last_snapshot.clone().unwrap_or_else(|| {
                    VehicleSnapshot::capture(VehicleIdentity::default(), Kinematics::default())
                })
            }
        }
    }
}

impl<H: DamageSource + KinematicsSource> Drop for CrashAgent<H> {
    fn drop(&mut self) {
        let pending = self.queue.len();
        if pending > 0 {
            log::warn!("shutting down with {pending} crash reports still queued; they are lost");
        }
    }
}

fn describe_zones(parts: &PartDamageMap) -> String {
    let zones = parts.impact_zones();
    if zones.is_empty() {
        return "none".to_string();
    }
    zones
        .iter()
        .map(|(zone, ratio)| format!("{} {ratio:.2}", zone.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn contain<T>(label: &str, f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("{label} panicked");
            None
        }
    }
}

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use crash_agent_core::host::KinematicsSource;
use crash_agent_core::models::{DeliveryOutcome, QueueStats, ReportEventType, VehicleSnapshot};
use crash_agent_core::report::ReportBuilder;
use crash_agent_core::sampler::sample_damage;
use crash_agent_core::wire::report_to_value;
use crash_agent_core::{AgentConfig, CrashAgent, DispatchMode};
use serde::Serialize;
use serde_json::Value;

use super::scenario::{RecordingTransport, Scenario, ScenarioHost};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReplayOptions {
    pub dry_run: bool,
    pub settle_ticks: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReplaySummary {
    pub endpoint: String,
    pub dry_run: bool,
    pub ticks: usize,
    pub settle_ticks: u32,
    pub clock: f64,
    pub crashes_detected: u64,
    pub reports_enqueued: usize,
    pub resets: usize,
    pub anomalies: usize,
    pub stats: QueueStats,
    pub pending: usize,
    pub lost_reports: usize,
    pub total_attempts: u32,
    pub outcomes: Vec<DeliveryOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payloads: Option<Vec<Value>>,
}

/// Runs every scenario tick through a fresh agent, then keeps ticking for at
/// most `settle_ticks` while deliveries are outstanding.
pub(crate) fn replay(
    scenario: &Scenario,
    mut config: AgentConfig,
    options: ReplayOptions,
) -> Result<ReplaySummary> {
    let host = ScenarioHost::new(scenario);
    let recorder = options.dry_run.then(RecordingTransport::shared);
    let mut agent = match &recorder {
        Some(recorder) => {
            config.dispatch = DispatchMode::Inline;
            CrashAgent::with_transport(config, host, recorder.clone())
        }
        None => CrashAgent::new(config, host),
    }
    .context("failed to start crash agent")?;

    let outcomes = Arc::new(Mutex::new(Vec::<DeliveryOutcome>::new()));
    let sink = Arc::clone(&outcomes);
    agent.set_delivery_listener(move |outcome| {
        if let Ok(mut outcomes) = sink.lock() {
            outcomes.push(outcome.clone());
        }
    });

    let default_dt = agent.config().tick_interval_secs();
    let pause = Duration::from_millis(agent.config().tick_interval_ms);
    let background = agent.config().dispatch == DispatchMode::Background;

    let mut reports_enqueued = 0;
    let mut resets = 0;
    let mut anomalies = 0;
    for tick in &scenario.ticks {
        if tick.reset {
            agent.on_reset();
            resets += 1;
        }
        agent.host_mut().apply(tick);
        let report = agent.on_tick(tick.dt.unwrap_or(default_dt));
        anomalies += report.anomalies;
        if report.report_id.is_some() {
            reports_enqueued += 1;
        }
        if tick.destroyed && agent.on_terminal().is_some() {
            reports_enqueued += 1;
        }
    }

    let mut settle_ticks = 0;
    while agent.pending_deliveries() > 0 && settle_ticks < options.settle_ticks {
        if background {
            thread::sleep(pause);
        }
        agent.on_tick(default_dt);
        settle_ticks += 1;
    }
    if agent.pending_deliveries() > 0 {
        log::warn!(
            "{} reports still pending after {settle_ticks} settle ticks",
            agent.pending_deliveries()
        );
    }

    let outcomes = outcomes
        .lock()
        .map(|outcomes| outcomes.clone())
        .unwrap_or_default();
    Ok(ReplaySummary {
        endpoint: agent.config().endpoint.clone(),
        dry_run: options.dry_run,
        ticks: scenario.ticks.len(),
        settle_ticks,
        clock: agent.clock(),
        crashes_detected: agent.crashes_detected(),
        reports_enqueued,
        resets,
        anomalies,
        stats: agent.stats(),
        pending: agent.pending_deliveries(),
        lost_reports: outcomes.iter().filter(|outcome| !outcome.is_delivered()).count(),
        total_attempts: outcomes.iter().map(DeliveryOutcome::attempts).sum(),
        outcomes,
        payloads: recorder.map(|recorder| recorder.payloads()),
    })
}

/// Wire payload for a report raised at `tick`, measured against the state one
/// tick earlier. A `destroyed` tick yields the terminal report. A `reset`
/// tick has no earlier state to compare with, so its delta is zero.
pub(crate) fn preview_report(
    scenario: &Scenario,
    config: &AgentConfig,
    tick: Option<usize>,
    at: DateTime<Utc>,
) -> Result<Value> {
    let Some(last) = scenario.ticks.len().checked_sub(1) else {
        bail!("scenario has no ticks");
    };
    let index = tick.unwrap_or(last);
    let Some(target) = scenario.ticks.get(index) else {
        bail!(
            "tick {index} is out of range; scenario has {} ticks",
            scenario.ticks.len()
        );
    };

    let mut host = ScenarioHost::new(scenario);
    for earlier in &scenario.ticks[..index] {
        host.apply(earlier);
    }
    let baseline_mean =
        (index > 0 && !target.reset).then(|| sample_damage(&host).parts.mean_damage());
    host.apply(target);
    let parts = sample_damage(&host).parts;
    let current_mean = parts.mean_damage();

    let snapshot = VehicleSnapshot::capture(host.identity(), host.kinematics());
    let builder = ReportBuilder::new(config.host_version.clone(), config.damage_threshold);
    let report = if target.destroyed {
        builder.build_terminal(snapshot, &parts, at)
    } else {
        builder.build(
            ReportEventType::CrashDetected,
            snapshot,
            &parts,
            baseline_mean.unwrap_or(current_mean),
            current_mean,
            at,
        )
    };
    report_to_value(&report).context("failed to encode preview payload")
}

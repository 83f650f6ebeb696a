//! Bounded outbound queue for crash reports.
//!
//! The queue is driven by the host tick: `drain_due` is called once per tick,
//! dispatches sends whose retry time has come, and polls sends issued on
//! earlier ticks. Nothing here waits on the network.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use reqwest::Url;
use uuid::Uuid;

use crate::config::{AgentConfig, DispatchMode};
use crate::models::{CrashReport, DeliveryOutcome, DrainReport, QueueStats};
use crate::transport::{DeliveryRequest, Transport, TransportError};

mod dispatch;
mod policy;


use dispatch::{PendingSend, SendPoll};
use policy::RetryPolicy;

pub type DeliveryCallback = Box<dyn FnOnce(&DeliveryOutcome) + Send>;

struct DeliveryTask {
    report_id: Uuid,
    report: Arc<CrashReport>,
    destination: Url,
    attempts: u32,
    earliest_retry: f64,
    in_flight: Option<PendingSend>,
    last_error: Option<TransportError>,
    on_terminal: Option<DeliveryCallback>,
}

impl DeliveryTask {
    fn request(&self) -> DeliveryRequest {
        DeliveryRequest {
            report_id: self.report_id,
            report: Arc::clone(&self.report),
            destination: self.destination.clone(),
        }
    }
}

pub struct DeliveryQueue {
    transport: Arc<dyn Transport>,
    dispatch: DispatchMode,
    policy: RetryPolicy,
    max_pending: usize,
    max_in_flight: usize,
    tasks: VecDeque<DeliveryTask>,
    stats: QueueStats,
}

impl std::fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryQueue")
            .field("dispatch", &self.dispatch)
            .field("policy", &self.policy)
            .field("max_pending", &self.max_pending)
            .field("max_in_flight", &self.max_in_flight)
            .field("pending", &self.tasks.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl DeliveryQueue {
    pub fn new(transport: Arc<dyn Transport>, config: &AgentConfig) -> Self {
        Self {
            transport,
            dispatch: config.dispatch,
            policy: RetryPolicy::new(config.max_attempts, config.retry_delay_secs()),
            max_pending: config.max_pending.max(1),
            max_in_flight: config.max_in_flight.max(1),
            tasks: VecDeque::new(),
            stats: QueueStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.in_flight.is_some())
            .count()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.tasks.len(),
            ..self.stats
        }
    }

    pub fn enqueue(&mut self, report: CrashReport, destination: Url, now: f64) -> Uuid {
        self.push(report, destination, now, None)
    }

    pub fn enqueue_with_callback(
        &mut self,
        report: CrashReport,
        destination: Url,
        now: f64,
        on_terminal: DeliveryCallback,
    ) -> Uuid {
        self.push(report, destination, now, Some(on_terminal))
    }

    fn push(
        &mut self,
        report: CrashReport,
        destination: Url,
        now: f64,
        on_terminal: Option<DeliveryCallback>,
    ) -> Uuid {
        if self.tasks.len() >= self.max_pending {
            self.evict_oldest_idle();
        }
        let report_id = Uuid::new_v4();
        self.tasks.push_back(DeliveryTask {
            report_id,
            report: Arc::new(report),
            destination,
            attempts: 0,
            earliest_retry: now,
            in_flight: None,
            last_error: None,
            on_terminal,
        });
        self.stats.enqueued += 1;
        report_id
    }

    /// Prefers a task already waiting on a retry; a report that was never
    /// attempted is only evicted when no retried task is idle.
    fn evict_oldest_idle(&mut self) {
        let idle = |task: &DeliveryTask| task.in_flight.is_none();
        let Some(index) = self
            .tasks
            .iter()
            .position(|task| idle(task) && task.attempts > 0)
            .or_else(|| self.tasks.iter().position(idle))
        else {
            log::debug!(
                "delivery queue over capacity ({} pending) with every task in flight",
                self.tasks.len()
            );
            return;
        };
        if let Some(task) = self.tasks.remove(index) {
            self.stats.evicted += 1;
            log::warn!(
                "evicting crash report {} after {} attempts: queue full ({} pending)",
                task.report_id,
                task.attempts,
                self.max_pending
            );
            let outcome = DeliveryOutcome::Evicted {
                report_id: task.report_id,
                attempts: task.attempts,
            };
            finish(task.on_terminal, &outcome);
        }
    }

    /// One pass over the queue: polls in-flight sends, dispatches due tasks,
    /// and leaves the rest untouched.
    pub fn drain_due(&mut self, now: f64) -> DrainReport {
        let mut report = DrainReport::default();
        let mut in_flight = self.in_flight();
        let mut retained = VecDeque::with_capacity(self.tasks.len());

        while let Some(mut task) = self.tasks.pop_front() {
            if task.in_flight.is_none() {
                if task.earliest_retry > now || in_flight >= self.max_in_flight {
                    report.waiting += 1;
                    retained.push_back(task);
                    continue;
                }
                task.attempts = task.attempts.saturating_add(1);
                task.in_flight = Some(PendingSend::start(
                    &self.transport,
                    task.request(),
                    self.dispatch,
                ));
                in_flight += 1;
                report.dispatched += 1;
                self.stats.dispatched += 1;
            }

            let poll = match task.in_flight.as_mut() {
                Some(pending) => pending.poll(),
                None => SendPoll::Waiting,
            };
            match poll {
                SendPoll::Waiting => {
                    report.in_flight += 1;
                    retained.push_back(task);
                }
                SendPoll::Ready(Ok(ack)) => {
                    in_flight = in_flight.saturating_sub(1);
                    report.delivered += 1;
                    self.stats.delivered += 1;
                    log::info!(
                        "delivered crash report {} to {} (status {}, attempt {})",
                        task.report_id,
                        task.destination,
                        ack.status,
                        task.attempts
                    );
                    let outcome = DeliveryOutcome::Delivered {
                        report_id: task.report_id,
                        attempts: task.attempts,
                        status: ack.status,
                    };
                    finish(task.on_terminal.take(), &outcome);
                }
                SendPoll::Ready(Err(err)) => {
                    in_flight = in_flight.saturating_sub(1);
                    task.in_flight = None;
                    if self.policy.should_retry(task.attempts) {
                        task.earliest_retry = self.policy.next_attempt_at(now);
                        log::debug!(
                            "crash report {} attempt {}/{} failed ({}); retry at t={:.3}",
                            task.report_id,
                            task.attempts,
                            self.policy.max_attempts(),
                            err,
                            task.earliest_retry
                        );
                        task.last_error = Some(err);
                        report.requeued += 1;
                        self.stats.requeued += 1;
                        retained.push_back(task);
                    } else {
                        report.exhausted += 1;
                        self.stats.exhausted += 1;
                        log::warn!(
                            "dropping crash report {} after {} attempts: {}",
                            task.report_id,
                            task.attempts,
                            err
                        );
                        let outcome = DeliveryOutcome::Exhausted {
                            report_id: task.report_id,
                            attempts: task.attempts,
                            last_error: err,
                        };
                        finish(task.on_terminal.take(), &outcome);
                    }
                }
            }
        }

        self.tasks = retained;
        report
    }

    /// Last recorded failure for a task still in the queue.
    pub fn last_error(&self, report_id: Uuid) -> Option<&TransportError> {
        self.tasks
            .iter()
            .find(|task| task.report_id == report_id)
            .and_then(|task| task.last_error.as_ref())
    }
}

fn finish(callback: Option<DeliveryCallback>, outcome: &DeliveryOutcome) {
    let Some(callback) = callback else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| callback(outcome))).is_err() {
        log::warn!(
            "terminal callback panicked for crash report {}",
            outcome.report_id()
        );
    }
}

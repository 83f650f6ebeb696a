use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transport::TransportError;

/// Cumulative delivery counters for one queue lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dispatched: u64,
    pub delivered: u64,
    pub requeued: u64,
    pub exhausted: u64,
    pub evicted: u64,
    pub pending: usize,
}

/// What one `drain_due` pass did.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub dispatched: usize,
    pub delivered: usize,
    pub requeued: usize,
    pub exhausted: usize,
    pub in_flight: usize,
    pub waiting: usize,
}

impl DrainReport {
    pub fn is_idle(&self) -> bool {
        self.dispatched == 0
            && self.delivered == 0
            && self.requeued == 0
            && self.exhausted == 0
            && self.in_flight == 0
    }
}

/// Terminal result of one delivery task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered {
        report_id: Uuid,
        attempts: u32,
        status: u16,
    },
    Exhausted {
        report_id: Uuid,
        attempts: u32,
        #[serde(serialize_with = "serialize_transport_error")]
        last_error: TransportError,
    },
    Evicted {
        report_id: Uuid,
        attempts: u32,
    },
}

impl DeliveryOutcome {
    pub fn report_id(&self) -> Uuid {
        match self {
            Self::Delivered { report_id, .. }
            | Self::Exhausted { report_id, .. }
            | Self::Evicted { report_id, .. } => *report_id,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Evicted { attempts, .. } => *attempts,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

fn serialize_transport_error<S>(
    err: &TransportError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format!("{}: {err}", err.code()))
}

use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use serde::{Deserialize, Serialize};

use crate::error::{DeliveryError, HookError, HookResult};
use crate::notification::NotificationId;
use crate::webhook::WebhookId;

/// What happened to one delivery attempt.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered { status: u16 },
    /// A transient failure; another attempt follows after `next_delay_ms`.
    Retrying { error: String, next_delay_ms: u64 },
    /// Terminal: permanent failure or exhausted retries.
    Failed { error: String, permanent: bool },
    /// Dropped by shutdown before completing.
    Abandoned,
}

impl DeliveryOutcome {
    pub(crate) fn failed(err: &DeliveryError) -> Self {
        Self::Failed {
            error: err.to_string(),
            permanent: !err.is_retryable(),
        }
    }

    /// True for outcomes after which the job is gone.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Retrying { .. })
    }
}

/// One entry on the delivery observability channel.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub webhook_id: WebhookId,
    pub notification_id: NotificationId,
    pub trigger_id: String,
    /// 1-based attempt number; 0 for jobs that never reached an attempt.
    pub attempt: u32,
    pub outcome: DeliveryOutcome,
    pub timestamp: DateTime<Utc>,
}

/// Subscriber handle for delivery reports.
///
/// Reports are published with a non-blocking send; when the buffer is full
/// they are dropped and counted by the dispatcher. Clones share one queue,
/// so each report is received by exactly one clone.
#[derive(Debug, Clone)]
pub struct DeliveryReports {
    rx: Receiver<DeliveryReport>,
}

impl DeliveryReports {
    pub(crate) fn new(rx: Receiver<DeliveryReport>) -> Self {
        Self { rx }
    }

    /// Receive the next report (blocking).
    pub fn recv(&self) -> HookResult<DeliveryReport> {
        self.rx.recv().map_err(|_| HookError::Closed)
    }

    /// Receive the next report with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> HookResult<DeliveryReport> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => HookError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => HookError::Closed,
        })
    }

    /// Non-blocking receive; `None` when nothing is buffered.
    #[must_use]
    pub fn try_recv(&self) -> Option<DeliveryReport> {
        match self.rx.try_recv() {
            Ok(report) => Some(report),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Drain everything currently buffered.
    #[must_use]
    pub fn drain(&self) -> Vec<DeliveryReport> {
        self.rx.try_iter().collect()
    }
}

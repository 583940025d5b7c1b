//! Notification dispatcher and per-webhook lanes.
//!
//! `dispatch` resolves applicable webhooks on the caller's task and appends
//! one job per match to that webhook's lane without blocking. A lane is a
//! FIFO drained by a single runner task, so deliveries to one webhook keep
//! emission order. Runners for different webhooks are independent; at most
//! `workers` delivery attempts are in flight at once, and a runner waiting
//! out a backoff holds no slot.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{DeliveryError, HookError, HookResult, ValidationError};
use crate::notification::Notification;
use crate::registry::WebhookRegistry;
use crate::webhook::{Webhook, WebhookId};

use super::reports::{DeliveryOutcome, DeliveryReport, DeliveryReports};
use super::retry::RetryPolicy;
use super::sender::{HttpWebhookSender, SenderConfig, WebhookSender};

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Max delivery attempts in flight across all webhooks.
    pub workers: usize,
    /// Max queued jobs per webhook before `dispatch` starts rejecting.
    pub lane_capacity: usize,
    /// Delivery report buffer; overflow is dropped and counted.
    pub report_capacity: usize,
    /// Default grace period used by `shutdown_default`.
    pub shutdown_grace_ms: u64,
    pub retry: RetryPolicy,
    pub sender: SenderConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            lane_capacity: 1024,
            report_capacity: 1024,
            shutdown_grace_ms: 5_000,
            retry: RetryPolicy::default(),
            sender: SenderConfig::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "workers must be at least 1".to_string(),
            });
        }
        if self.lane_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "lane_capacity must be at least 1".to_string(),
            });
        }
        if self.report_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "report_capacity must be at least 1".to_string(),
            });
        }
        self.retry.validate()?;
        self.sender.validate()
    }
}

/// Result of one `dispatch` call.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    /// Webhooks that matched and had readable credentials.
    pub matched: usize,
    pub enqueued: usize,
    /// Matches dropped because their webhook's lane was full.
    pub rejected: usize,
}

/// One unit of delivery work: a webhook snapshot and the shared notification.
#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub webhook: Webhook,
    pub notification: Arc<Notification>,
}

/// Snapshot of dispatcher counters.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub failed: u64,
    pub rejected: u64,
    pub abandoned: u64,
    pub dropped_reports: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    abandoned: AtomicU64,
    dropped_reports: AtomicU64,
}

/// Pending jobs per webhook. A webhook has an entry exactly while its runner
/// is alive.
#[derive(Debug, Default)]
struct LaneState {
    closed: bool,
    lanes: HashMap<WebhookId, VecDeque<DeliveryJob>>,
}

enum Enqueue {
    Queued { spawn_runner: bool },
    Full(DeliveryJob),
    Closed,
}

/// State shared between the dispatcher handle and its runners.
struct Shared {
    sender: Arc<dyn WebhookSender>,
    retry: RetryPolicy,
    lane_capacity: usize,
    slots: Semaphore,
    state: Mutex<LaneState>,
    reports_tx: Sender<DeliveryReport>,
    counters: Counters,
    cancel: CancellationToken,
}

impl Shared {
    fn lock_state(&self) -> HookResult<std::sync::MutexGuard<'_, LaneState>> {
        self.state
            .lock()
            .map_err(|_| HookError::internal("poisoned lock: dispatcher.lanes"))
    }

    fn enqueue(&self, job: DeliveryJob) -> HookResult<Enqueue> {
        let mut state = self.lock_state()?;
        if state.closed {
            return Ok(Enqueue::Closed);
        }
        match state.lanes.get_mut(&job.webhook.id) {
            Some(lane) if lane.len() >= self.lane_capacity => Ok(Enqueue::Full(job)),
            Some(lane) => {
                lane.push_back(job);
                Ok(Enqueue::Queued { spawn_runner: false })
            }
            None => {
                let id = job.webhook.id;
                state.lanes.insert(id, VecDeque::from([job]));
                Ok(Enqueue::Queued { spawn_runner: true })
            }
        }
    }

    /// Next job for `id`, or `None` after retiring the lane.
    fn next_job(&self, id: WebhookId) -> Option<DeliveryJob> {
        // A poisoned lock means a runner panicked mid-update; retire quietly.
        let mut state = self.state.lock().ok()?;
        let job = state.lanes.get_mut(&id).and_then(VecDeque::pop_front);
        if job.is_none() {
            state.lanes.remove(&id);
        }
        job
    }

    fn report(&self, job: &DeliveryJob, attempt: u32, outcome: DeliveryOutcome) {
        let report = DeliveryReport {
            webhook_id: job.webhook.id,
            notification_id: job.notification.id(),
            trigger_id: job.notification.trigger_id().to_string(),
            attempt,
            outcome,
            timestamp: Utc::now(),
        };
        // Never block a runner on a slow report consumer.
        match self.reports_tx.try_send(report) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.counters.dropped_reports.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn abandon(&self, job: &DeliveryJob, attempt: u32) {
        self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            target: "kyrohook::delivery",
            webhook_id = %job.webhook.id,
            notification_id = %job.notification.id(),
            trigger_id = job.notification.trigger_id(),
            attempt,
            "Delivery abandoned by shutdown"
        );
        self.report(job, attempt, DeliveryOutcome::Abandoned);
    }
}

/// Asynchronous fan-out of notifications to subscribed webhooks.
///
/// Delivery failures never reach the producer; they surface through
/// `reports()`, `stats()` and `tracing` events under `kyrohook::delivery`.
pub struct NotificationDispatcher {
    config: DispatcherConfig,
    registry: Arc<WebhookRegistry>,
    shared: Arc<Shared>,
    runtime: Handle,
    runners: TaskTracker,
    reports_rx: Receiver<DeliveryReport>,
}

impl NotificationDispatcher {
    /// Build a dispatcher that delivers over HTTP.
    ///
    /// # Errors
    /// - `HookError::Validation` for an invalid config.
    /// - `HookError::Internal` when called outside a tokio runtime.
    pub fn new(config: DispatcherConfig, registry: Arc<WebhookRegistry>) -> HookResult<Self> {
        config.validate()?;
        let sender = HttpWebhookSender::new(config.sender.clone())?;
        Self::with_sender(config, registry, Arc::new(sender))
    }

    /// Build a dispatcher around a custom sender.
    pub fn with_sender(
        config: DispatcherConfig,
        registry: Arc<WebhookRegistry>,
        sender: Arc<dyn WebhookSender>,
    ) -> HookResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| HookError::internal(format!("dispatcher requires a tokio runtime: {e}")))?;

        let (reports_tx, reports_rx) = bounded::<DeliveryReport>(config.report_capacity);
        let shared = Arc::new(Shared {
            sender,
            retry: config.retry.clone(),
            lane_capacity: config.lane_capacity,
            slots: Semaphore::new(config.workers),
            state: Mutex::new(LaneState::default()),
            reports_tx,
            counters: Counters::default(),
            cancel: CancellationToken::new(),
        });

        tracing::debug!(
            target: "kyrohook::dispatch",
            workers = config.workers,
            lane_capacity = config.lane_capacity,
            "Notification dispatcher started"
        );

        Ok(Self {
            config,
            registry,
            shared,
            runtime,
            runners: TaskTracker::new(),
            reports_rx,
        })
    }

    /// Resolve applicable webhooks and enqueue one delivery job per match.
    ///
    /// Returns once every job is enqueued (or rejected); delivery happens on
    /// the lane runners.
    ///
    /// # Errors
    /// - `HookError::Closed` after `shutdown`.
    /// - `HookError::Validation` / `HookError::Storage` from the registry
    ///   lookup. Nothing is enqueued in that case.
    pub async fn dispatch(&self, notification: Notification) -> HookResult<DispatchSummary> {
        if self.is_closed()? {
            return Err(HookError::Closed);
        }

        let webhooks = self.registry.get_applicable_webhooks(&notification).await?;
        let notification = Arc::new(notification);
        let mut summary = DispatchSummary {
            matched: webhooks.len(),
            ..DispatchSummary::default()
        };

        for webhook in webhooks {
            let id = webhook.id;
            let job = DeliveryJob {
                webhook,
                notification: Arc::clone(&notification),
            };
            match self.shared.enqueue(job)? {
                Enqueue::Queued { spawn_runner } => {
                    summary.enqueued += 1;
                    self.shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                    if spawn_runner {
                        self.runners
                            .spawn_on(run_lane(id, Arc::clone(&self.shared)), &self.runtime);
                    }
                }
                Enqueue::Full(job) => {
                    summary.rejected += 1;
                    self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        target: "kyrohook::dispatch",
                        webhook_id = %job.webhook.id,
                        notification_id = %job.notification.id(),
                        trigger_id = job.notification.trigger_id(),
                        lane_capacity = self.config.lane_capacity,
                        "Webhook lane full; job rejected"
                    );
                    self.shared.report(
                        &job,
                        0,
                        DeliveryOutcome::failed(&DeliveryError::transient("webhook lane is full", None)),
                    );
                }
                Enqueue::Closed => return Err(HookError::Closed),
            }
        }

        tracing::debug!(
            target: "kyrohook::dispatch",
            notification_id = %notification.id(),
            trigger_id = notification.trigger_id(),
            matched = summary.matched,
            enqueued = summary.enqueued,
            rejected = summary.rejected,
            "Notification dispatched"
        );

        Ok(summary)
    }

    /// Subscribe to delivery reports.
    #[must_use]
    pub fn reports(&self) -> DeliveryReports {
        DeliveryReports::new(self.reports_rx.clone())
    }

    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        let c = &self.shared.counters;
        DispatchStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            abandoned: c.abandoned.load(Ordering::Relaxed),
            dropped_reports: c.dropped_reports.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn dropped_reports(&self) -> u64 {
        self.shared.counters.dropped_reports.load(Ordering::Relaxed)
    }

    #[must_use]
    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Webhooks with queued or in-flight deliveries.
    pub fn active_lanes(&self) -> HookResult<usize> {
        Ok(self.shared.lock_state()?.lanes.len())
    }

    /// True once `shutdown` has started.
    pub fn is_closed(&self) -> HookResult<bool> {
        Ok(self.shared.lock_state()?.closed)
    }

    /// Stop accepting jobs and drain the lanes.
    ///
    /// Queued and in-flight jobs get up to `grace` to finish. After that,
    /// pending requests and backoff waits are cancelled and the remaining
    /// jobs are reported as `Abandoned`. All runners are joined before this
    /// returns. Calling it again is a no-op.
    pub async fn shutdown(&self, grace: Duration) -> HookResult<()> {
        self.shared.lock_state()?.closed = true;
        self.runners.close();

        if tokio::time::timeout(grace, self.runners.wait()).await.is_err() {
            tracing::warn!(
                target: "kyrohook::dispatch",
                grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                pending_lanes = self.runners.len(),
                "Shutdown grace elapsed; cancelling in-flight deliveries"
            );
            self.shared.cancel.cancel();
            self.runners.wait().await;
        }

        tracing::debug!(target: "kyrohook::dispatch", stats = ?self.stats(), "Notification dispatcher stopped");
        Ok(())
    }

    /// `shutdown` with the configured `shutdown_grace_ms`.
    pub async fn shutdown_default(&self) -> HookResult<()> {
        self.shutdown(Duration::from_millis(self.config.shutdown_grace_ms))
            .await
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        // Runners are detached; cancelling makes them exit promptly.
        self.shared.cancel.cancel();
    }
}

/// Drain one webhook's lane in FIFO order until it is empty.
async fn run_lane(id: WebhookId, shared: Arc<Shared>) {
    while let Some(job) = shared.next_job(id) {
        if shared.cancel.is_cancelled() {
            shared.abandon(&job, 0);
            continue;
        }
        deliver(&shared, &job).await;
    }
    tracing::trace!(target: "kyrohook::delivery", webhook_id = %id, "Lane drained");
}

async fn deliver(shared: &Shared, job: &DeliveryJob) {
    let mut attempt: u32 = 1;
    loop {
        let slot = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => None,
            slot = shared.slots.acquire() => slot.ok(),
        };
        let Some(slot) = slot else {
            shared.abandon(job, attempt - 1);
            return;
        };

        let result = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => Err(DeliveryError::Aborted),
            result = shared.sender.send(&job.webhook, &job.notification, attempt) => result.map(|r| r.status),
        };
        drop(slot);

        match result {
            Ok(status) => {
                shared.counters.delivered.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    target: "kyrohook::delivery",
                    webhook_id = %job.webhook.id,
                    notification_id = %job.notification.id(),
                    trigger_id = job.notification.trigger_id(),
                    attempt,
                    status,
                    "Webhook delivered"
                );
                shared.report(job, attempt, DeliveryOutcome::Delivered { status });
                return;
            }
            Err(DeliveryError::Aborted) => {
                shared.abandon(job, attempt);
                return;
            }
            Err(err) if err.is_retryable() && shared.retry.should_retry(attempt) => {
                let delay = shared.retry.backoff(attempt);
                let next_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(
                    target: "kyrohook::delivery",
                    webhook_id = %job.webhook.id,
                    notification_id = %job.notification.id(),
                    trigger_id = job.notification.trigger_id(),
                    attempt,
                    next_delay_ms,
                    error = %err,
                    "Webhook delivery failed; retrying"
                );
                shared.report(
                    job,
                    attempt,
                    DeliveryOutcome::Retrying {
                        error: err.to_string(),
                        next_delay_ms,
                    },
                );

                tokio::select! {
                    biased;
                    () = shared.cancel.cancelled() => {
                        shared.abandon(job, attempt);
                        return;
                    }
                    () = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(err) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    target: "kyrohook::delivery",
                    webhook_id = %job.webhook.id,
                    notification_id = %job.notification.id(),
                    trigger_id = job.notification.trigger_id(),
                    attempt,
                    permanent = !err.is_retryable(),
                    error = %err,
                    "Webhook delivery failed"
                );
                shared.report(job, attempt, DeliveryOutcome::failed(&err));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::dispatch::sender::DeliveryReceipt;
    use crate::protect::AesGcmProtector;
    use crate::storage::InMemoryWebhookStore;

    struct AlwaysOk;

    #[async_trait]
    impl WebhookSender for AlwaysOk {
        async fn send(
            &self,
            _webhook: &Webhook,
            _notification: &Notification,
            _attempt: u32,
        ) -> Result<DeliveryReceipt, DeliveryError> {
            Ok(DeliveryReceipt { status: 200 })
        }
    }

    /// Never completes; only cancellation gets a job out.
    struct Hanging;

    #[async_trait]
    impl WebhookSender for Hanging {
        async fn send(
            &self,
            _webhook: &Webhook,
            _notification: &Notification,
            _attempt: u32,
        ) -> Result<DeliveryReceipt, DeliveryError> {
            std::future::pending().await
        }
    }

    fn registry_with(hooks: usize) -> Arc<WebhookRegistry> {
        let protector = Arc::new(AesGcmProtector::new([3u8; 32]));
        let store = Arc::new(InMemoryWebhookStore::new());
        for _ in 0..hooks {
            store
                .insert(Webhook::protected("s", "https://example.com/h", Vec::new(), protector.as_ref()).unwrap())
                .unwrap();
        }
        Arc::new(WebhookRegistry::new(store, protector))
    }

    #[test]
    fn config_validation() {
        assert!(DispatcherConfig::default().validate().is_ok());
        for bad in [
            DispatcherConfig { workers: 0, ..DispatcherConfig::default() },
            DispatcherConfig { lane_capacity: 0, ..DispatcherConfig::default() },
            DispatcherConfig { report_capacity: 0, ..DispatcherConfig::default() },
            DispatcherConfig {
                retry: RetryPolicy { max_attempts: 0, ..RetryPolicy::default() },
                ..DispatcherConfig::default()
            },
        ] {
            assert!(bad.validate().is_err());
        }
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: DispatcherConfig = serde_json::from_str(r#"{"workers": 2, "retry": {"max_attempts": 3}}"#).unwrap();
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.initial_backoff_ms, 500);
        assert_eq!(cfg.lane_capacity, 1024);
    }

    #[test]
    fn construction_outside_runtime_fails() {
        let err = NotificationDispatcher::with_sender(
            DispatcherConfig::default(),
            registry_with(0),
            Arc::new(AlwaysOk),
        )
        .unwrap_err();
        assert!(err.is_internal());
    }

    #[tokio::test]
    async fn dispatch_delivers_every_match() {
        let dispatcher =
            NotificationDispatcher::with_sender(DispatcherConfig::default(), registry_with(3), Arc::new(AlwaysOk))
                .unwrap();
        let summary = dispatcher.dispatch(Notification::new("t")).await.unwrap();
        assert_eq!(summary, DispatchSummary { matched: 3, enqueued: 3, rejected: 0 });

        dispatcher.shutdown(Duration::from_secs(5)).await.unwrap();
        let stats = dispatcher.stats();
        assert_eq!(stats.enqueued, 3);
        assert_eq!(stats.delivered, 3);
        assert_eq!(dispatcher.active_lanes().unwrap(), 0);

        let reports = dispatcher.reports().drain();
        assert_eq!(reports.len(), 3);
        assert!(reports
            .iter()
            .all(|r| r.outcome == DeliveryOutcome::Delivered { status: 200 } && r.attempt == 1));
    }

    #[tokio::test]
    async fn dispatch_after_shutdown_is_closed() {
        let dispatcher =
            NotificationDispatcher::with_sender(DispatcherConfig::default(), registry_with(1), Arc::new(AlwaysOk))
                .unwrap();
        dispatcher.shutdown(Duration::from_millis(100)).await.unwrap();
        assert!(dispatcher.is_closed().unwrap());
        assert!(matches!(
            dispatcher.dispatch(Notification::new("t")).await,
            Err(HookError::Closed)
        ));
        // Idempotent.
        dispatcher.shutdown(Duration::from_millis(100)).await.unwrap();
    }

    #[tokio::test]
    async fn full_lane_rejects_without_blocking() {
        let config = DispatcherConfig {
            lane_capacity: 1,
            ..DispatcherConfig::default()
        };
        let dispatcher = NotificationDispatcher::with_sender(config, registry_with(1), Arc::new(Hanging)).unwrap();

        let mut enqueued = 0;
        let mut rejected = 0;
        for _ in 0..4 {
            let summary = dispatcher.dispatch(Notification::new("t")).await.unwrap();
            assert_eq!(summary.matched, 1);
            enqueued += summary.enqueued;
            rejected += summary.rejected;
        }
        // The runner may already hold one job, leaving room for one more.
        assert!((1..=2).contains(&enqueued));
        assert_eq!(enqueued + rejected, 4);
        assert_eq!(dispatcher.stats().rejected, rejected as u64);

        dispatcher.shutdown(Duration::from_millis(20)).await.unwrap();
    }

    #[tokio::test]
    async fn lanes_are_per_webhook() {
        let config = DispatcherConfig {
            lane_capacity: 1,
            ..DispatcherConfig::default()
        };
        let dispatcher = NotificationDispatcher::with_sender(config, registry_with(6), Arc::new(Hanging)).unwrap();

        let summary = dispatcher.dispatch(Notification::new("t")).await.unwrap();
        assert_eq!(summary, DispatchSummary { matched: 6, enqueued: 6, rejected: 0 });
        assert_eq!(dispatcher.active_lanes().unwrap(), 6);

        dispatcher.shutdown(Duration::from_millis(20)).await.unwrap();
        assert_eq!(dispatcher.active_lanes().unwrap(), 0);
    }

    #[tokio::test]
    async fn shutdown_grace_cancels_hanging_deliveries() {
        let config = DispatcherConfig {
            workers: 1,
            ..DispatcherConfig::default()
        };
        let dispatcher = NotificationDispatcher::with_sender(config, registry_with(3), Arc::new(Hanging)).unwrap();
        let summary = dispatcher.dispatch(Notification::new("t")).await.unwrap();
        assert_eq!(summary.enqueued, 3);
        dispatcher.dispatch(Notification::new("t")).await.unwrap();

        dispatcher.shutdown(Duration::from_millis(50)).await.unwrap();

        let stats = dispatcher.stats();
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.abandoned, 6);
        let reports = dispatcher.reports().drain();
        assert_eq!(reports.len(), 6);
        assert!(reports.iter().all(|r| r.outcome == DeliveryOutcome::Abandoned));
    }

    #[tokio::test]
    async fn invalid_notification_surfaces_from_dispatch() {
        let dispatcher =
            NotificationDispatcher::with_sender(DispatcherConfig::default(), registry_with(1), Arc::new(AlwaysOk))
                .unwrap();
        let err = dispatcher.dispatch(Notification::new("  ")).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(dispatcher.stats().enqueued, 0);
    }
}

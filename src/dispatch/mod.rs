//! Asynchronous notification delivery.
//!
//! The dispatcher fans a notification out to every applicable webhook and
//! queues one job per match on that webhook's lane. Each lane is a FIFO with
//! its own runner, so deliveries to a webhook keep emission order while
//! different webhooks proceed in parallel, bounded by a shared pool of
//! `workers` attempt slots. Failures are classified, retried with backoff
//! when transient, and surfaced through `DeliveryReports` rather than to the
//! producer.

/// Dispatcher handle and lane runners.
pub mod dispatcher;
/// Delivery report stream.
pub mod reports;
/// Backoff policy.
pub mod retry;
/// Outbound HTTP sender.
pub mod sender;

pub use dispatcher::{DeliveryJob, DispatchStats, DispatchSummary, DispatcherConfig, NotificationDispatcher};
pub use reports::{DeliveryOutcome, DeliveryReport, DeliveryReports};
pub use retry::RetryPolicy;
pub use sender::{classify_status, DeliveryReceipt, HttpWebhookSender, SenderConfig, WebhookSender};

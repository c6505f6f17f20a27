//! Outbound customer notifications.
//!
//! Delivery is best effort everywhere in this crate: callers log a failed
//! send and carry on, so a notification is delivered at most once.

use std::future::Future;

use serde_json::Value;
use thiserror::Error;

/// Message templates known to the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    OrderReceived,
    OrderProcessing,
    OrderShipped,
    OrderDelivered,
    OrderCancelled,
    VerificationCode,
    PasswordReset,
}

impl Template {
    /// Template name understood by the delivery service.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::OrderReceived => "order_received",
            Self::OrderProcessing => "order_processing",
            Self::OrderShipped => "order_shipped",
            Self::OrderDelivered => "order_delivered",
            Self::OrderCancelled => "order_cancelled",
            Self::VerificationCode => "verification_code",
            Self::PasswordReset => "password_reset",
        }
    }
}

impl std::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A message to one recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub template: Template,
    /// Email address of the recipient.
    pub to: String,
    /// Template variables.
    pub data: Value,
}

/// Errors a notifier can report.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The delivery service refused or failed the send.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The recipient address was rejected.
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
}

/// Sends customer notifications.
pub trait Notifier: Send + Sync {
    /// Send one notification.
    fn send(&self, notification: Notification) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Notifier that only writes notifications to the log.
///
/// Used where no delivery service is configured, e.g. local development and
/// the admin CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            template = %notification.template,
            to = %notification.to,
            data = %notification.data,
            "Notification (log only)"
        );
        Ok(())
    }
}

/// Send `notification`, logging instead of returning a failure.
///
/// Returns whether the send succeeded.
pub async fn send_best_effort<N: Notifier>(notifier: &N, notification: Notification) -> bool {
    let template = notification.template;
    let to = notification.to.clone();
    match notifier.send(notification).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, template = %template, to = %to, "Notification failed");
            false
        }
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::RecordingNotifier;
    use super::*;

    fn notification() -> Notification {
        Notification {
            template: Template::OrderShipped,
            to: "ada@example.com".to_owned(),
            data: json!({"orderId": "ORD-1"}),
        }
    }

    #[tokio::test]
    async fn test_best_effort_reports_outcome() {
        let ok = RecordingNotifier::default();
        assert!(send_best_effort(&ok, notification()).await);

        let failing = RecordingNotifier::failing();
        assert!(!send_best_effort(&failing, notification()).await);
        assert_eq!(failing.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        assert!(LogNotifier.send(notification()).await.is_ok());
    }

    #[test]
    fn test_template_names() {
        assert_eq!(Template::OrderCancelled.name(), "order_cancelled");
        assert_eq!(Template::VerificationCode.to_string(), "verification_code");
    }
}

//! Outbound order notifications.
//!
//! Notifications are emitted after the triggering mutation has committed and
//! are best-effort: a failed send is logged and counted, never returned to the
//! caller and never undoes the mutation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{OrderId, OrderStatus};
use order_store::Order;
use thiserror::Error;

/// A failed notification send.
#[derive(Debug, Clone, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Sends customer-facing messages about an order.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sent once the order has been created.
    async fn send_order_confirmation(&self, order: &Order) -> Result<(), NotifyError>;

    /// Sent when the order moves to `shipped`.
    async fn send_shipped(&self, order: &Order) -> Result<(), NotifyError>;

    /// Sent for every other status change.
    async fn send_status_changed(
        &self,
        order: &Order,
        previous: OrderStatus,
        new: OrderStatus,
    ) -> Result<(), NotifyError>;
}

/// The kind of message to send for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Confirmation,
    Shipped,
    StatusChanged {
        previous: OrderStatus,
        new: OrderStatus,
    },
}

impl Notification {
    /// Picks the message for a status change: shipping notice or generic update.
    pub fn for_transition(previous: OrderStatus, new: OrderStatus) -> Self {
        if new == OrderStatus::Shipped {
            Notification::Shipped
        } else {
            Notification::StatusChanged { previous, new }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Notification::Confirmation => "confirmation",
            Notification::Shipped => "shipped",
            Notification::StatusChanged { .. } => "status_changed",
        }
    }
}

/// Delivers notifications through a `Notifier`, swallowing failures.
///
/// In background mode each delivery runs on its own task so callers never
/// wait on the notifier; inline mode awaits delivery, which keeps tests
/// deterministic.
#[derive(Clone)]
pub struct Notifications {
    notifier: Arc<dyn Notifier>,
    background: bool,
}

impl Notifications {
    /// Delivers on a spawned task. Requires a Tokio runtime.
    pub fn background(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            background: true,
        }
    }

    /// Delivers before returning.
    pub fn inline(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            background: false,
        }
    }

    /// Emits a notification for an order that has already been persisted.
    pub async fn emit(&self, order: &Order, notification: Notification) {
        if self.background {
            let notifier = Arc::clone(&self.notifier);
            let order = order.clone();
            tokio::spawn(async move {
                deliver(notifier.as_ref(), &order, notification).await;
            });
        } else {
            deliver(self.notifier.as_ref(), order, notification).await;
        }
    }
}

async fn deliver(notifier: &dyn Notifier, order: &Order, notification: Notification) {
    let result = match notification {
        Notification::Confirmation => notifier.send_order_confirmation(order).await,
        Notification::Shipped => notifier.send_shipped(order).await,
        Notification::StatusChanged { previous, new } => {
            notifier.send_status_changed(order, previous, new).await
        }
    };

    if let Err(e) = result {
        metrics::counter!("notifications_failed_total", "kind" => notification.as_str())
            .increment(1);
        tracing::warn!(
            order_id = %order.id,
            order_number = %order.order_number,
            kind = notification.as_str(),
            error = %e,
            "failed to send order notification"
        );
    }
}

/// Notifier that only writes a log line per message.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_order_confirmation(&self, order: &Order) -> Result<(), NotifyError> {
        tracing::info!(
            order_number = %order.order_number,
            to = %order.customer_email,
            total = %order.total_amount,
            "order confirmation"
        );
        Ok(())
    }

    async fn send_shipped(&self, order: &Order) -> Result<(), NotifyError> {
        tracing::info!(
            order_number = %order.order_number,
            to = %order.customer_email,
            "order shipped"
        );
        Ok(())
    }

    async fn send_status_changed(
        &self,
        order: &Order,
        previous: OrderStatus,
        new: OrderStatus,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            order_number = %order.order_number,
            to = %order.customer_email,
            %previous,
            %new,
            "order status changed"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    sent: Vec<(OrderId, Notification)>,
    fail_on_send: bool,
}

/// Notifier that records every message, for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every send (after recording the attempt).
    pub fn set_fail_on_send(&self, fail: bool) {
        self.lock().fail_on_send = fail;
    }

    /// Returns every notification attempted so far.
    pub fn sent(&self) -> Vec<(OrderId, Notification)> {
        self.lock().sent.clone()
    }

    /// Returns the notifications attempted for one order.
    pub fn sent_for(&self, order_id: OrderId) -> Vec<Notification> {
        self.lock()
            .sent
            .iter()
            .filter(|(id, _)| *id == order_id)
            .map(|(_, n)| *n)
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, order: &Order, notification: Notification) -> Result<(), NotifyError> {
        let mut state = self.lock();
        state.sent.push((order.id, notification));
        if state.fail_on_send {
            return Err(NotifyError("mail server unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_order_confirmation(&self, order: &Order) -> Result<(), NotifyError> {
        self.record(order, Notification::Confirmation)
    }

    async fn send_shipped(&self, order: &Order) -> Result<(), NotifyError> {
        self.record(order, Notification::Shipped)
    }

    async fn send_status_changed(
        &self,
        order: &Order,
        previous: OrderStatus,
        new: OrderStatus,
    ) -> Result<(), NotifyError> {
        self.record(order, Notification::StatusChanged { previous, new })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shipped_gets_dedicated_notice() {
        assert_eq!(
            Notification::for_transition(OrderStatus::Paid, OrderStatus::Shipped),
            Notification::Shipped
        );
        assert_eq!(
            Notification::for_transition(OrderStatus::Pending, OrderStatus::Paid),
            Notification::StatusChanged {
                previous: OrderStatus::Pending,
                new: OrderStatus::Paid
            }
        );
    }
}

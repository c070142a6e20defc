// seatlock/src/orders/outbox.rs

//! Post-commit order notifications. The order is already durable when a
//! notification is queued; delivery happens on a background task with bounded,
//! backed-off retries, and a final failure is only logged.

use crate::model::{CategoryId, EventId, Order, OrderId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
  OrderCompleted,
  OrderCancelled,
}

/// The `order-completed` / `order-cancelled` message. `kind` names the topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderNotification {
  pub kind: NotificationKind,
  pub order_id: OrderId,
  pub event_id: EventId,
  pub category_id: CategoryId,
  pub quantity: u32,
  pub user_id: UserId,
}

impl OrderNotification {
  pub fn for_order(kind: NotificationKind, order: &Order) -> Self {
    Self {
      kind,
      order_id: order.id,
      event_id: order.event_id,
      category_id: order.category_id,
      quantity: order.quantity,
      user_id: order.user_id,
    }
  }
}

/// A sink for order notifications (a message bus, a realtime gateway, ...).
#[async_trait]
pub trait OrderNotifier: Send + Sync {
  async fn notify(&self, notification: &OrderNotification) -> anyhow::Result<()>;
}

/// Exponential backoff for notification delivery. `max_attempts` counts the first try.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub initial_delay: Duration,
  pub max_delay: Duration,
  pub multiplier: f64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      initial_delay: Duration::from_millis(100),
      max_delay: Duration::from_secs(5),
      multiplier: 2.0,
    }
  }
}

impl RetryPolicy {
  pub fn builder() -> RetryPolicyBuilder {
    RetryPolicyBuilder {
      policy: RetryPolicy::default(),
    }
  }

  /// Delay before retry number `retry` (0-based): `initial * multiplier^retry`, capped at `max_delay`.
  pub fn delay_for_retry(&self, retry: u32) -> Duration {
    let factor = self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
    let millis = self.initial_delay.as_millis() as f64 * factor;
    if !millis.is_finite() || millis >= self.max_delay.as_millis() as f64 {
      return self.max_delay;
    }
    Duration::from_millis(millis as u64)
  }
}

#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
  policy: RetryPolicy,
}

impl RetryPolicyBuilder {
  pub fn max_attempts(mut self, max_attempts: u32) -> Self {
    self.policy.max_attempts = max_attempts;
    self
  }

  pub fn initial_delay(mut self, delay: Duration) -> Self {
    self.policy.initial_delay = delay;
    self
  }

  pub fn max_delay(mut self, delay: Duration) -> Self {
    self.policy.max_delay = delay;
    self
  }

  pub fn multiplier(mut self, multiplier: f64) -> Self {
    self.policy.multiplier = multiplier;
    self
  }

  pub fn build(self) -> RetryPolicy {
    self.policy
  }
}

/// Queues notifications for background delivery.
#[derive(Clone)]
pub struct Outbox {
  notifier: Arc<dyn OrderNotifier>,
  policy: RetryPolicy,
  tracker: TaskTracker,
}

impl Outbox {
  pub fn new(notifier: Arc<dyn OrderNotifier>, policy: RetryPolicy) -> Self {
    Self {
      notifier,
      policy,
      tracker: TaskTracker::new(),
    }
  }

  /// Hands the notification to a background task and returns immediately.
  pub fn enqueue(&self, notification: OrderNotification) {
    let notifier = self.notifier.clone();
    let policy = self.policy.clone();
    self.tracker.spawn(async move {
      deliver(notifier.as_ref(), &policy, &notification).await;
    });
  }

  /// Waits until every notification queued so far has been delivered or given up on.
  pub async fn flush(&self) {
    self.tracker.close();
    self.tracker.wait().await;
    self.tracker.reopen();
  }

  pub fn pending(&self) -> usize {
    self.tracker.len()
  }
}

/// Returns whether the notification was delivered.
async fn deliver(notifier: &dyn OrderNotifier, policy: &RetryPolicy, notification: &OrderNotification) -> bool {
  let attempts = policy.max_attempts.max(1);
  for attempt in 1..=attempts {
    match notifier.notify(notification).await {
      Ok(()) => {
        if attempt > 1 {
          info!(order_id = notification.order_id, attempt, "Order notification delivered after retry.");
        } else {
          debug!(order_id = notification.order_id, kind = ?notification.kind, "Order notification delivered.");
        }
        return true;
      }
      Err(e) if attempt < attempts => {
        let delay = policy.delay_for_retry(attempt - 1);
        warn!(order_id = notification.order_id, attempt, ?delay, error = %e, "Order notification failed; retrying.");
        tokio::time::sleep(delay).await;
      }
      Err(e) => {
        warn!(
          order_id = notification.order_id,
          kind = ?notification.kind,
          attempts,
          error = %e,
          "Order notification dropped after final attempt."
        );
      }
    }
  }
  false
}

// seatlock/src/model/order.rs

use super::{CategoryId, EventId, OrderId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `pending -> confirmed -> {cancelled, completed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
  Pending,
  Confirmed,
  Cancelled,
  Completed,
}

impl OrderStatus {
  pub fn can_transition_to(self, next: OrderStatus) -> bool {
    matches!(
      (self, next),
      (OrderStatus::Pending, OrderStatus::Confirmed)
        | (OrderStatus::Confirmed, OrderStatus::Cancelled)
        | (OrderStatus::Confirmed, OrderStatus::Completed)
    )
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Confirmed => "confirmed",
      OrderStatus::Cancelled => "cancelled",
      OrderStatus::Completed => "completed",
    };
    f.write_str(s)
  }
}

/// A persisted purchase. Prices and names are snapshots taken when the order was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: OrderId,
  pub user_id: UserId,
  pub event_id: EventId,
  pub category_id: CategoryId,
  pub quantity: u32,
  pub unit_price_cents: u64,
  pub total_price_cents: u64,
  pub status: OrderStatus,
  pub event_name: String,
  pub category_name: String,
  pub notes: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Everything an [`crate::OrderStore`] needs to insert a record; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
  pub user_id: UserId,
  pub event_id: EventId,
  pub category_id: CategoryId,
  pub quantity: u32,
  pub unit_price_cents: u64,
  pub event_name: String,
  pub category_name: String,
  pub notes: Option<String>,
}

impl NewOrder {
  pub fn total_price_cents(&self) -> u64 {
    self.unit_price_cents.saturating_mul(u64::from(self.quantity))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_forward_transitions_are_allowed() {
    use OrderStatus::*;
    assert!(Pending.can_transition_to(Confirmed));
    assert!(Confirmed.can_transition_to(Cancelled));
    assert!(Confirmed.can_transition_to(Completed));
    assert!(!Pending.can_transition_to(Cancelled));
    assert!(!Cancelled.can_transition_to(Confirmed));
    assert!(!Completed.can_transition_to(Cancelled));
    assert!(!Confirmed.can_transition_to(Confirmed));
  }
}

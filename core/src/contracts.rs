// seatlock/src/contracts.rs

//! Message payloads exchanged with transports. Field names are camelCase on the wire.

use crate::error::{SeatlockError, SeatlockResult};
use crate::model::{
  CategoryId, EventId, LockGranted, LockId, Order, OrderId, OrderStatus, SessionId, TicketCategory, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::model::EventSummary;
pub use crate::notifier::AvailabilityUpdate;
pub use crate::orders::outbox::{NotificationKind, OrderNotification};

/// `reserve-tickets`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveTickets {
  pub event_id: EventId,
  pub category_id: CategoryId,
  pub quantity: u32,
}

/// `release-tickets`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseTickets {
  pub category_id: CategoryId,
  pub quantity: u32,
}

/// One entry of the `get-ticket-categories` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketCategoryView {
  pub id: CategoryId,
  pub category_name: String,
  /// Minor currency units.
  #[serde(rename = "price")]
  pub price_cents: u64,
  pub total_seats: u32,
  pub reserved_seats: u32,
  pub available_seats: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl From<&TicketCategory> for TicketCategoryView {
  fn from(c: &TicketCategory) -> Self {
    Self {
      id: c.id,
      category_name: c.category_name.clone(),
      price_cents: c.price_cents,
      total_seats: c.total_seats,
      reserved_seats: c.reserved_seats,
      available_seats: c.available_seats(),
      description: c.description.clone(),
    }
  }
}

/// `lock-tickets`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockTickets {
  pub event_id: EventId,
  pub category_id: CategoryId,
  pub quantity: u32,
  pub user_id: UserId,
  pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockTicketsResponse {
  pub success: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub lock_id: Option<LockId>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub expires_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  /// After a grant: seats left once this lock is counted. After a capacity refusal: seats left.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub available_tickets: Option<u32>,
}

impl From<SeatlockResult<LockGranted>> for LockTicketsResponse {
  fn from(result: SeatlockResult<LockGranted>) -> Self {
    match result {
      Ok(granted) => Self {
        success: true,
        lock_id: Some(granted.lock_id),
        expires_at: Some(granted.expires_at),
        message: None,
        available_tickets: Some(granted.remaining_after_lock),
      },
      Err(e) => Self {
        success: false,
        lock_id: None,
        expires_at: None,
        message: Some(lock_failure_message(&e)),
        available_tickets: e.remaining(),
      },
    }
  }
}

fn lock_failure_message(err: &SeatlockError) -> String {
  match err {
    SeatlockError::AlreadyLocked { .. } => "You already have tickets locked for this category".to_string(),
    SeatlockError::CategoryNotFound { .. } => "Ticket category not found".to_string(),
    SeatlockError::InsufficientSeats { remaining: 1, .. } => "Only 1 ticket available".to_string(),
    SeatlockError::InsufficientSeats { remaining, .. } => format!("Only {} tickets available", remaining),
    other => other.to_string(),
  }
}

/// `unlock-tickets`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockTickets {
  pub event_id: EventId,
  pub category_id: CategoryId,
  #[serde(default)]
  pub quantity: u32,
  pub user_id: UserId,
  pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockTicketsResponse {
  pub success: bool,
  pub message: String,
}

impl UnlockTicketsResponse {
  pub fn from_outcome(released: bool) -> Self {
    let message = if released {
      "Tickets unlocked successfully"
    } else {
      "No tickets found to unlock"
    };
    Self {
      success: released,
      message: message.to_string(),
    }
  }
}

/// `confirm-lock`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmLock {
  pub lock_id: LockId,
  pub user_id: UserId,
}

/// `create-order`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
  pub user_id: UserId,
  pub event_id: EventId,
  pub category_id: CategoryId,
  pub quantity: u32,
  #[serde(default)]
  pub notes: Option<String>,
  #[serde(default)]
  pub lock_id: Option<LockId>,
}

/// `cancel-order`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrder {
  pub order_id: OrderId,
}

/// The order as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
  pub id: OrderId,
  pub user_id: UserId,
  pub event_id: EventId,
  pub category_id: CategoryId,
  pub quantity: u32,
  #[serde(rename = "unitPrice")]
  pub unit_price_cents: u64,
  #[serde(rename = "totalPrice")]
  pub total_price_cents: u64,
  pub status: OrderStatus,
  pub event_name: String,
  pub category_name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
  fn from(o: Order) -> Self {
    Self {
      id: o.id,
      user_id: o.user_id,
      event_id: o.event_id,
      category_id: o.category_id,
      quantity: o.quantity,
      unit_price_cents: o.unit_price_cents,
      total_price_cents: o.total_price_cents,
      status: o.status,
      event_name: o.event_name,
      category_name: o.category_name,
      notes: o.notes,
      created_at: o.created_at,
      updated_at: o.updated_at,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use uuid::Uuid;

  #[test]
  fn capacity_refusal_reports_remaining_seats() {
    let response = LockTicketsResponse::from(Err(SeatlockError::InsufficientSeats {
      category_id: 3,
      requested: 4,
      remaining: 1,
    }));
    assert!(!response.success);
    assert_eq!(response.message.as_deref(), Some("Only 1 tickets available"));
    assert_eq!(response.available_tickets, Some(1));
  }

  #[test]
  fn duplicate_lock_message_is_stable() {
    let response = LockTicketsResponse::from(Err(SeatlockError::AlreadyLocked {
      event_id: 1,
      category_id: 2,
      lock_id: Uuid::new_v4(),
    }));
    assert_eq!(
      response.message.as_deref(),
      Some("You already have tickets locked for this category")
    );
    assert_eq!(response.available_tickets, None);
  }
}

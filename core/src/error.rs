// seatlock/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

use crate::model::{CategoryId, EventId, LockId, OrderId, OrderStatus};

#[derive(Debug, Error)]
pub enum SeatlockError {
  #[error("Event not found: {event_id}")]
  EventNotFound { event_id: EventId },

  #[error("Ticket category {category_id} not found")]
  CategoryNotFound { category_id: CategoryId },

  #[error("Order not found: {order_id}")]
  OrderNotFound { order_id: OrderId },

  #[error("Ticket lock not found: {lock_id}")]
  LockNotFound { lock_id: LockId },

  /// Capacity exceeded. `remaining` is what the category could still satisfy at the time of the check.
  #[error("Not enough seats in category {category_id}: requested {requested}, only {remaining} left")]
  InsufficientSeats {
    category_id: CategoryId,
    requested: u32,
    remaining: u32,
  },

  #[error("User already holds lock {lock_id} for category {category_id} of event {event_id}")]
  AlreadyLocked {
    event_id: EventId,
    category_id: CategoryId,
    lock_id: LockId,
  },

  #[error("Order {order_id} is {status}; cannot {action}")]
  InvalidState {
    order_id: OrderId,
    status: OrderStatus,
    action: &'static str,
  },

  #[error("Quantity must be at least 1 (got {quantity})")]
  InvalidQuantity { quantity: u32 },

  #[error("Ticket lock {lock_id} rejected: {reason}")]
  LockRejected { lock_id: LockId, reason: String },

  #[error("Seat reservation failed: {reason}")]
  ReservationFailed { reason: String },

  #[error("Upstream '{service}' unavailable. Source: {source}")]
  UpstreamUnavailable {
    service: &'static str,
    #[source]
    source: AnyhowError,
  },

  #[error("Handler missing for non-optional saga step: {step_name}")]
  HandlerMissing { step_name: String },

  #[error("Configuration error: {0}")]
  Config(String),

  #[error("Internal seatlock error: {0}")]
  Internal(String),
}

impl SeatlockError {
  /// Wraps a collaborator failure, naming the collaborator for the logs.
  pub fn upstream(service: &'static str, source: impl Into<AnyhowError>) -> Self {
    SeatlockError::UpstreamUnavailable {
      service,
      source: source.into(),
    }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      SeatlockError::EventNotFound { .. }
        | SeatlockError::CategoryNotFound { .. }
        | SeatlockError::OrderNotFound { .. }
        | SeatlockError::LockNotFound { .. }
    )
  }

  /// Remaining seat count carried by `InsufficientSeats`.
  pub fn remaining(&self) -> Option<u32> {
    match self {
      SeatlockError::InsufficientSeats { remaining, .. } => Some(*remaining),
      _ => None,
    }
  }
}

// Collaborators (catalog, order store, notification sinks) report failures as anyhow errors.
impl From<AnyhowError> for SeatlockError {
  fn from(err: AnyhowError) -> Self {
    match err.downcast::<SeatlockError>() {
      Ok(inner) => inner,
      Err(err) => SeatlockError::UpstreamUnavailable {
        service: "collaborator",
        source: err,
      },
    }
  }
}

pub type SeatlockResult<T, E = SeatlockError> = std::result::Result<T, E>;

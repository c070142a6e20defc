// seatlock/src/model/mod.rs

//! Domain records shared by the ledger, the lock registry and the order saga.

pub mod category;
pub mod lock;
pub mod order;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use category::{EventSummary, NewCategory, TicketCategory};
pub use lock::{LockGranted, LockStatus, TicketLock};
pub use order::{NewOrder, Order, OrderStatus};

pub type EventId = u64;
pub type CategoryId = u64;
pub type UserId = u64;
pub type OrderId = u64;
pub type SessionId = String;
pub type LockId = uuid::Uuid;

/// Identifies a category within its event. Renders as `eventId:categoryId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryKey {
  pub event_id: EventId,
  pub category_id: CategoryId,
}

impl CategoryKey {
  pub fn new(event_id: EventId, category_id: CategoryId) -> Self {
    Self { event_id, category_id }
  }
}

impl fmt::Display for CategoryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.event_id, self.category_id)
  }
}

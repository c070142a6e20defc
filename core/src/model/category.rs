// seatlock/src/model/category.rs

use super::{CategoryId, CategoryKey, EventId};
use serde::{Deserialize, Serialize};

/// A seat tier of an event as the ledger keeps it.
///
/// `total_seats` never changes after creation. `held_seats` mirrors the sum of
/// active soft locks and is only moved by the lock registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketCategory {
  pub id: CategoryId,
  pub event_id: EventId,
  pub category_name: String,
  pub price_cents: u64,
  pub total_seats: u32,
  pub reserved_seats: u32,
  pub held_seats: u32,
  pub description: Option<String>,
  pub is_active: bool,
}

impl TicketCategory {
  pub fn key(&self) -> CategoryKey {
    CategoryKey::new(self.event_id, self.id)
  }

  /// `total - reserved`. Soft locks are not subtracted here.
  pub fn available_seats(&self) -> u32 {
    self.total_seats.saturating_sub(self.reserved_seats)
  }

  /// Seats nobody has reserved or is holding.
  pub fn unclaimed_seats(&self) -> u32 {
    self.total_seats.saturating_sub(self.reserved_seats).saturating_sub(self.held_seats)
  }
}

/// Input for [`crate::SeatLedger::create_category`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
  pub event_id: EventId,
  pub category_name: String,
  pub price_cents: u64,
  pub total_seats: u32,
  #[serde(default)]
  pub description: Option<String>,
}

/// Read model of an event owned by the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
  pub id: EventId,
  pub event_name: String,
  #[serde(default)]
  pub venue: Option<String>,
  #[serde(default)]
  pub starts_at: Option<chrono::DateTime<chrono::Utc>>,
}

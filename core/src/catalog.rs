// seatlock/src/catalog.rs

//! Read side of event and category data, as the order saga sees it.

use crate::ledger::SeatLedger;
use crate::model::{EventId, EventSummary, TicketCategory};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// The `get-event-by-id` and `get-ticket-categories` collaborators.
#[async_trait]
pub trait EventCatalog: Send + Sync {
  async fn event_by_id(&self, event_id: EventId) -> anyhow::Result<Option<EventSummary>>;

  /// Active categories of the event.
  async fn ticket_categories(&self, event_id: EventId) -> anyhow::Result<Vec<TicketCategory>>;
}

/// Events kept in memory; categories come straight from the ledger.
pub struct InMemoryCatalog {
  events: RwLock<HashMap<EventId, EventSummary>>,
  ledger: Arc<SeatLedger>,
}

impl InMemoryCatalog {
  pub fn new(ledger: Arc<SeatLedger>) -> Self {
    Self {
      events: RwLock::new(HashMap::new()),
      ledger,
    }
  }

  pub fn add_event(&self, event: EventSummary) {
    self.events.write().insert(event.id, event);
  }

  pub fn remove_event(&self, event_id: EventId) -> Option<EventSummary> {
    self.events.write().remove(&event_id)
  }

  pub fn event(&self, event_id: EventId) -> Option<EventSummary> {
    self.events.read().get(&event_id).cloned()
  }
}

#[async_trait]
impl EventCatalog for InMemoryCatalog {
  async fn event_by_id(&self, event_id: EventId) -> anyhow::Result<Option<EventSummary>> {
    Ok(self.event(event_id))
  }

  async fn ticket_categories(&self, event_id: EventId) -> anyhow::Result<Vec<TicketCategory>> {
    Ok(self.ledger.categories_for_event(event_id))
  }
}

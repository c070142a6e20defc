// seatlock/src/ledger.rs

//! The authoritative seat counts per ticket category.
//!
//! Every category lives behind its own `parking_lot::Mutex`, so a check and the
//! mutation it guards always happen in one critical section, and two categories
//! never contend with each other. The outer map lock is only held long enough to
//! clone the category's `Arc`.

use crate::error::{SeatlockError, SeatlockResult};
use crate::model::{CategoryId, EventId, NewCategory, TicketCategory};
use crate::notifier::AvailabilitySignal;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{event, instrument, Level};

type CategoryCell = Arc<Mutex<TicketCategory>>;

pub struct SeatLedger {
  categories: RwLock<HashMap<CategoryId, CategoryCell>>,
  next_id: AtomicU64,
  signal: Option<AvailabilitySignal>,
}

impl SeatLedger {
  pub fn new() -> Self {
    Self {
      categories: RwLock::new(HashMap::new()),
      next_id: AtomicU64::new(1),
      signal: None,
    }
  }

  /// A ledger that reports every reserve/release on the given change feed.
  pub fn with_signal(signal: AvailabilitySignal) -> Self {
    Self {
      signal: Some(signal),
      ..Self::new()
    }
  }

  pub fn create_category(&self, new: NewCategory) -> TicketCategory {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let category = TicketCategory {
      id,
      event_id: new.event_id,
      category_name: new.category_name,
      price_cents: new.price_cents,
      total_seats: new.total_seats,
      reserved_seats: 0,
      held_seats: 0,
      description: new.description,
      is_active: true,
    };
    event!(Level::DEBUG, category_id = id, event_id = category.event_id, total_seats = category.total_seats, "Category created.");
    self.categories.write().insert(id, Arc::new(Mutex::new(category.clone())));
    category
  }

  /// Soft delete: the category stops accepting reservations and holds. Releases still apply.
  pub fn deactivate(&self, category_id: CategoryId) -> SeatlockResult<()> {
    let cell = self.cell(category_id)?;
    cell.lock().is_active = false;
    event!(Level::INFO, category_id, "Category deactivated.");
    Ok(())
  }

  pub fn category(&self, category_id: CategoryId) -> Option<TicketCategory> {
    let cell = self.categories.read().get(&category_id).cloned()?;
    let snapshot = cell.lock().clone();
    Some(snapshot)
  }

  /// Active categories of an event, ordered by id.
  pub fn categories_for_event(&self, event_id: EventId) -> Vec<TicketCategory> {
    let cells: Vec<CategoryCell> = self.categories.read().values().cloned().collect();
    let mut found: Vec<TicketCategory> = cells
      .iter()
      .map(|cell| cell.lock().clone())
      .filter(|c| c.event_id == event_id && c.is_active)
      .collect();
    found.sort_by_key(|c| c.id);
    found
  }

  /// `total - reserved` for the category.
  pub fn available_seats(&self, category_id: CategoryId) -> SeatlockResult<u32> {
    let cell = self.cell(category_id)?;
    let seats = cell.lock().available_seats();
    Ok(seats)
  }

  /// Seats a buyer could still purchase, counting `own_hold` (the buyer's own soft lock) as theirs.
  pub fn purchasable(&self, category_id: CategoryId, own_hold: u32) -> SeatlockResult<u32> {
    let cell = self.cell(category_id)?;
    let guard = cell.lock();
    let own = own_hold.min(guard.held_seats);
    Ok(guard.unclaimed_seats().saturating_add(own).min(guard.available_seats()))
  }

  /// Atomically checks that `quantity` seats are neither reserved nor held and reserves them.
  ///
  /// Returns the number of seats still unclaimed afterwards.
  #[instrument(name = "SeatLedger::reserve", level = "debug", skip(self), err(Display))]
  pub fn reserve(&self, category_id: CategoryId, quantity: u32) -> SeatlockResult<u32> {
    ensure_quantity(quantity)?;
    let cell = self.cell(category_id)?;
    let (event_id, remaining) = {
      let mut guard = cell.lock();
      if !guard.is_active {
        return Err(SeatlockError::CategoryNotFound { category_id });
      }
      let unclaimed = guard.unclaimed_seats();
      if unclaimed < quantity {
        return Err(SeatlockError::InsufficientSeats {
          category_id,
          requested: quantity,
          remaining: unclaimed,
        });
      }
      guard.reserved_seats += quantity;
      (guard.event_id, guard.unclaimed_seats())
    };
    event!(Level::DEBUG, remaining, "Seats reserved.");
    self.emit(event_id, category_id);
    Ok(remaining)
  }

  /// `reserve` for the `reserve-tickets` contract: the category must belong to `event_id`.
  pub fn reserve_for_event(&self, event_id: EventId, category_id: CategoryId, quantity: u32) -> SeatlockResult<u32> {
    let owner = self.cell(category_id)?.lock().event_id;
    if owner != event_id {
      return Err(SeatlockError::CategoryNotFound { category_id });
    }
    self.reserve(category_id, quantity)
  }

  /// Returns reserved seats to the pool, clamping at zero. Returns the quantity actually released.
  #[instrument(name = "SeatLedger::release", level = "debug", skip(self), err(Display))]
  pub fn release(&self, category_id: CategoryId, quantity: u32) -> SeatlockResult<u32> {
    let cell = self.cell(category_id)?;
    let (event_id, released, reserved_before) = {
      let mut guard = cell.lock();
      let before = guard.reserved_seats;
      guard.reserved_seats = before.saturating_sub(quantity);
      (guard.event_id, before - guard.reserved_seats, before)
    };
    if released < quantity {
      event!(
        Level::WARN,
        category_id,
        requested = quantity,
        reserved_before,
        "Release exceeded reserved seats; clamped at zero."
      );
    }
    self.emit(event_id, category_id);
    Ok(released)
  }

  // --- Hold bookkeeping, driven by the lock registry ---

  /// Places a soft hold if `quantity` seats are unclaimed. Returns unclaimed seats afterwards.
  pub(crate) fn hold(&self, event_id: EventId, category_id: CategoryId, quantity: u32) -> SeatlockResult<u32> {
    ensure_quantity(quantity)?;
    let cell = self.cell(category_id)?;
    let mut guard = cell.lock();
    if !guard.is_active || guard.event_id != event_id {
      return Err(SeatlockError::CategoryNotFound { category_id });
    }
    let unclaimed = guard.unclaimed_seats();
    if unclaimed < quantity {
      return Err(SeatlockError::InsufficientSeats {
        category_id,
        requested: quantity,
        remaining: unclaimed,
      });
    }
    guard.held_seats += quantity;
    Ok(guard.unclaimed_seats())
  }

  pub(crate) fn unhold(&self, category_id: CategoryId, quantity: u32) {
    match self.cell(category_id) {
      Ok(cell) => {
        let mut guard = cell.lock();
        if guard.held_seats < quantity {
          event!(Level::WARN, category_id, held = guard.held_seats, quantity, "Hold release exceeded held seats; clamped at zero.");
        }
        guard.held_seats = guard.held_seats.saturating_sub(quantity);
      }
      Err(e) => event!(Level::WARN, category_id, error = %e, "Hold release for unknown category ignored."),
    }
  }

  /// Moves `quantity` held seats into reserved in one step, so the seats are never double-counted
  /// nor momentarily free.
  pub(crate) fn convert_hold(&self, category_id: CategoryId, quantity: u32) -> SeatlockResult<()> {
    let cell = self.cell(category_id)?;
    let event_id = {
      let mut guard = cell.lock();
      if guard.held_seats < quantity {
        return Err(SeatlockError::ReservationFailed {
          reason: format!(
            "category {} holds {} seats, cannot convert {}",
            category_id, guard.held_seats, quantity
          ),
        });
      }
      guard.held_seats -= quantity;
      guard.reserved_seats += quantity;
      guard.event_id
    };
    event!(Level::DEBUG, category_id, quantity, "Held seats converted into a reservation.");
    self.emit(event_id, category_id);
    Ok(())
  }

  fn cell(&self, category_id: CategoryId) -> SeatlockResult<CategoryCell> {
    self
      .categories
      .read()
      .get(&category_id)
      .cloned()
      .ok_or(SeatlockError::CategoryNotFound { category_id })
  }

  fn emit(&self, event_id: EventId, category_id: CategoryId) {
    if let Some(signal) = &self.signal {
      signal.emit(crate::model::CategoryKey::new(event_id, category_id));
    }
  }
}

impl Default for SeatLedger {
  fn default() -> Self {
    Self::new()
  }
}

fn ensure_quantity(quantity: u32) -> SeatlockResult<()> {
  if quantity == 0 {
    return Err(SeatlockError::InvalidQuantity { quantity });
  }
  Ok(())
}

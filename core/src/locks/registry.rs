// seatlock/src/locks/registry.rs

use super::book::{LockBook, LockStats};
use crate::clock::Clock;
use crate::error::{SeatlockError, SeatlockResult};
use crate::ledger::SeatLedger;
use crate::model::{CategoryId, CategoryKey, EventId, LockGranted, LockId, LockStatus, SessionId, TicketLock, UserId};
use crate::notifier::AvailabilitySignal;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Short-lived soft locks on seats, one per user per category.
///
/// Held quantities are mirrored into the ledger's `held` counter, so a plain
/// reservation can never take seats another buyer has locked. All
/// check-then-mutate sequences for a category run under that category's gate;
/// the gate is never held across an `.await`.
pub struct LockRegistry {
  ledger: Arc<SeatLedger>,
  clock: Arc<dyn Clock>,
  ttl: chrono::Duration,
  purge_grace: chrono::Duration,
  book: Mutex<LockBook>,
  gates: Mutex<HashMap<CategoryKey, Arc<Mutex<()>>>>,
  signal: Option<AvailabilitySignal>,
}

impl LockRegistry {
  pub fn new(
    ledger: Arc<SeatLedger>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    purge_grace: chrono::Duration,
  ) -> Self {
    Self {
      ledger,
      clock,
      ttl,
      purge_grace,
      book: Mutex::new(LockBook::default()),
      gates: Mutex::new(HashMap::new()),
      signal: None,
    }
  }

  /// Reports every grant, release, expiry and confirmation on the change feed.
  pub fn with_signal(mut self, signal: AvailabilitySignal) -> Self {
    self.signal = Some(signal);
    self
  }

  pub fn ledger(&self) -> &Arc<SeatLedger> {
    &self.ledger
  }

  /// Grants a soft lock if the category still has `quantity` seats that are neither reserved nor locked.
  #[instrument(name = "LockRegistry::lock", skip(self, session_id), fields(session_id = tracing::field::Empty), err(Display))]
  pub fn lock(
    &self,
    user_id: UserId,
    session_id: impl Into<SessionId>,
    event_id: EventId,
    category_id: CategoryId,
    quantity: u32,
  ) -> SeatlockResult<LockGranted> {
    let session_id = session_id.into();
    tracing::Span::current().record("session_id", session_id.as_str());
    if quantity == 0 {
      return Err(SeatlockError::InvalidQuantity { quantity });
    }
    let key = CategoryKey::new(event_id, category_id);

    let granted = {
      let gate = self.gate(key)?;
      let _serial = gate.lock();
      let now = self.clock.now();
      self.expire_overdue_in(key, now);
      let expires_at = now
        .checked_add_signed(self.ttl)
        .ok_or_else(|| SeatlockError::Internal(format!("lock ttl {} overflows the expiry time", self.ttl)))?;

      if let Some(existing) = self.book.lock().active_for_user_in(user_id, key) {
        return Err(SeatlockError::AlreadyLocked {
          event_id,
          category_id,
          lock_id: existing.lock_id,
        });
      }

      // Ledger first: from here the seats are claimed, the book entry only records whose they are.
      let remaining = self.ledger.hold(event_id, category_id, quantity)?;
      let lock = TicketLock {
        lock_id: Uuid::new_v4(),
        event_id,
        category_id,
        quantity,
        user_id,
        session_id,
        created_at: now,
        expires_at,
        status: LockStatus::Active,
        closed_at: None,
      };
      let granted = LockGranted {
        lock_id: lock.lock_id,
        expires_at: lock.expires_at,
        remaining_after_lock: remaining,
      };
      self.book.lock().insert(lock);
      granted
    };

    info!(lock_id = %granted.lock_id, remaining = granted.remaining_after_lock, "Seats locked.");
    self.emit(key);
    Ok(granted)
  }

  /// Releases the user's active lock for the category. Returns false when there was none.
  pub fn unlock(&self, user_id: UserId, session_id: &str, event_id: EventId, category_id: CategoryId) -> bool {
    let key = CategoryKey::new(event_id, category_id);
    let released = {
      let Ok(gate) = self.gate(key) else {
        return false;
      };
      let _serial = gate.lock();
      let lock_id = self.book.lock().active_for_user_in(user_id, key).map(|l| l.lock_id);
      lock_id.and_then(|id| self.close_and_unhold(&id, LockStatus::Released))
    };
    match released {
      Some(lock) => {
        debug!(%lock.lock_id, user_id, session_id, "Lock released by user.");
        self.emit(key);
        true
      }
      None => false,
    }
  }

  /// Marks an active lock confirmed and stops counting it toward held seats.
  /// Does not reserve ledger seats; purchases use [`LockRegistry::redeem`].
  pub fn confirm(&self, lock_id: LockId) -> bool {
    self.close_by_id(lock_id, LockStatus::Confirmed)
  }

  /// `active -> released`. A second call, or a call on any terminal lock, returns false.
  pub fn release_lock(&self, lock_id: LockId) -> bool {
    self.close_by_id(lock_id, LockStatus::Released)
  }

  /// Releases every active lock the user holds, optionally only those of one session.
  #[instrument(name = "LockRegistry::release_all_for_user", skip(self))]
  pub fn release_all_for_user(&self, user_id: UserId, session_id: Option<&str>) -> usize {
    let candidates: Vec<LockId> = self
      .book
      .lock()
      .active_for_user(user_id)
      .into_iter()
      .filter(|lock| session_id.map_or(true, |s| lock.session_id == s))
      .map(|lock| lock.lock_id)
      .collect();

    let released = candidates.into_iter().filter(|id| self.release_lock(*id)).count();
    if released > 0 {
      info!(released, "Released user locks.");
    }
    released
  }

  /// Expires every active lock whose expiry has passed. Returns how many were expired.
  pub fn sweep_expired(&self) -> usize {
    let now = self.clock.now();
    let overdue = self.book.lock().overdue(now);
    let mut expired = 0;
    for key in overdue.into_keys() {
      let Ok(gate) = self.gate(key) else {
        continue;
      };
      let _serial = gate.lock();
      expired += self.expire_overdue_in(key, now);
    }
    if expired > 0 {
      info!(expired, "Expired soft locks swept.");
    }
    expired
  }

  /// Turns the lock's hold into a ledger reservation and marks the lock confirmed, atomically
  /// with respect to every other operation on the category.
  #[instrument(name = "LockRegistry::redeem", skip(self), err(Display))]
  pub fn redeem(&self, lock_id: LockId, user_id: UserId, quantity: u32) -> SeatlockResult<TicketLock> {
    let key = self
      .book
      .lock()
      .get(&lock_id)
      .map(TicketLock::key)
      .ok_or(SeatlockError::LockNotFound { lock_id })?;

    let redeemed = {
      let gate = self.gate(key)?;
      let _serial = gate.lock();
      let now = self.clock.now();
      let lock = self
        .book
        .lock()
        .get(&lock_id)
        .cloned()
        .ok_or(SeatlockError::LockNotFound { lock_id })?;

      if lock.status != LockStatus::Active {
        return Err(rejected(lock_id, format!("lock is {}", lock.status)));
      }
      if lock.is_overdue(now) {
        self.expire_overdue_in(key, now);
        return Err(rejected(lock_id, "lock expired".to_string()));
      }
      if lock.user_id != user_id {
        return Err(rejected(lock_id, "lock is owned by another user".to_string()));
      }
      if lock.quantity != quantity {
        return Err(rejected(
          lock_id,
          format!("lock covers {} seats, order asks for {}", lock.quantity, quantity),
        ));
      }

      let closed = self
        .book
        .lock()
        .close(&lock_id, LockStatus::Confirmed, now)
        .ok_or(SeatlockError::LockNotFound { lock_id })?;
      if let Err(e) = self.ledger.convert_hold(closed.category_id, closed.quantity) {
        error!(target: "seatlock::integrity", %lock_id, error = %e, "Confirmed lock had no matching hold in the ledger.");
        return Err(e);
      }
      closed
    };

    info!(%lock_id, "Lock redeemed into a reservation.");
    self.emit(key);
    Ok(redeemed)
  }

  /// Plain reservation without a lock. Overdue locks of the category are expired first, so seats
  /// that availability snapshots already report as free can be bought before the next sweep.
  #[instrument(name = "LockRegistry::reserve", level = "debug", skip(self), err(Display))]
  pub fn reserve(&self, event_id: EventId, category_id: CategoryId, quantity: u32) -> SeatlockResult<u32> {
    let key = CategoryKey::new(event_id, category_id);
    let gate = self.gate(key)?;
    let _serial = gate.lock();
    self.expire_overdue_in(key, self.clock.now());
    self.ledger.reserve_for_event(event_id, category_id, quantity)
  }

  /// [`SeatLedger::purchasable`] after expiring the category's overdue locks.
  pub fn purchasable(&self, event_id: EventId, category_id: CategoryId, own_hold: u32) -> SeatlockResult<u32> {
    let key = CategoryKey::new(event_id, category_id);
    let gate = self.gate(key)?;
    let _serial = gate.lock();
    self.expire_overdue_in(key, self.clock.now());
    self.ledger.purchasable(category_id, own_hold)
  }

  pub fn inspect(&self, lock_id: LockId) -> Option<TicketLock> {
    self.book.lock().get(&lock_id).cloned()
  }

  /// The user's active locks, oldest first.
  pub fn user_locks(&self, user_id: UserId) -> Vec<TicketLock> {
    self.book.lock().active_for_user(user_id)
  }

  /// Seats held by active, unexpired locks in the category.
  pub fn locked_quantity(&self, event_id: EventId, category_id: CategoryId) -> u32 {
    let now = self.clock.now();
    self.book.lock().locked_quantity(CategoryKey::new(event_id, category_id), now)
  }

  /// Ledger availability minus what is currently locked.
  pub fn available_with_locks(&self, event_id: EventId, category_id: CategoryId) -> SeatlockResult<u32> {
    let available = self.ledger.available_seats(category_id)?;
    Ok(available.saturating_sub(self.locked_quantity(event_id, category_id)))
  }

  pub fn stats(&self) -> LockStats {
    self.book.lock().stats()
  }

  /// Drops closed locks whose grace period has passed.
  pub fn purge_closed(&self) -> usize {
    let Some(cutoff) = self.clock.now().checked_sub_signed(self.purge_grace) else {
      return 0;
    };
    let purged = self.book.lock().purge(cutoff);
    if purged > 0 {
      debug!(purged, "Closed locks purged.");
    }
    purged
  }

  pub(crate) fn purge_grace(&self) -> chrono::Duration {
    self.purge_grace
  }

  // --- internals ---

  /// Only keys naming a category of that event get a gate.
  fn gate(&self, key: CategoryKey) -> SeatlockResult<Arc<Mutex<()>>> {
    if let Some(gate) = self.gates.lock().get(&key) {
      return Ok(gate.clone());
    }
    match self.ledger.category(key.category_id) {
      Some(category) if category.event_id == key.event_id => Ok(self.gates.lock().entry(key).or_default().clone()),
      _ => Err(SeatlockError::CategoryNotFound {
        category_id: key.category_id,
      }),
    }
  }

  fn close_by_id(&self, lock_id: LockId, status: LockStatus) -> bool {
    let Some(key) = self.book.lock().get(&lock_id).map(TicketLock::key) else {
      return false;
    };
    let closed = {
      let Ok(gate) = self.gate(key) else {
        return false;
      };
      let _serial = gate.lock();
      self.close_and_unhold(&lock_id, status)
    };
    match closed {
      Some(_) => {
        debug!(%lock_id, %status, "Lock closed.");
        self.emit(key);
        true
      }
      None => false,
    }
  }

  /// Caller holds the category gate. The book entry goes first so the ledger's
  /// `held` never drops below what the book still counts.
  fn close_and_unhold(&self, lock_id: &LockId, status: LockStatus) -> Option<TicketLock> {
    let now = self.clock.now();
    let closed = self.book.lock().close(lock_id, status, now)?;
    self.ledger.unhold(closed.category_id, closed.quantity);
    Some(closed)
  }

  /// Caller holds the category gate.
  fn expire_overdue_in(&self, key: CategoryKey, now: DateTime<Utc>) -> usize {
    let overdue = self.book.lock().overdue_in(key, now);
    let mut expired = 0;
    for lock_id in overdue {
      if let Some(lock) = self.close_and_unhold(&lock_id, LockStatus::Expired) {
        debug!(%lock.lock_id, user_id = lock.user_id, "Lock expired.");
        expired += 1;
      }
    }
    if expired > 0 {
      self.emit(key);
    }
    expired
  }

  fn emit(&self, key: CategoryKey) {
    if let Some(signal) = &self.signal {
      signal.emit(key);
    }
  }
}

fn rejected(lock_id: LockId, reason: String) -> SeatlockError {
  warn!(%lock_id, %reason, "Lock rejected.");
  SeatlockError::LockRejected { lock_id, reason }
}

// seatlock/src/locks/book.rs

//! The lock records and their two lookup indices, kept as one value so every
//! mutation commits all three views together.
//!
//! Invariant: the user and category indices contain exactly the `Active` locks.
//! Terminal locks stay in `locks` only until they are purged.

use crate::model::{CategoryKey, LockId, LockStatus, TicketLock, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub(crate) struct LockBook {
  locks: HashMap<LockId, TicketLock>,
  by_user: HashMap<UserId, HashSet<LockId>>,
  by_category: HashMap<CategoryKey, HashSet<LockId>>,
}

/// Counts reported by [`crate::LockRegistry::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStats {
  pub total_locks: usize,
  pub active_locks: usize,
  pub users_with_locks: usize,
  pub categories_with_locks: usize,
  pub expired: usize,
  pub released: usize,
  pub confirmed: usize,
}

impl LockBook {
  pub(crate) fn insert(&mut self, lock: TicketLock) {
    debug_assert_eq!(lock.status, LockStatus::Active);
    let id = lock.lock_id;
    self.by_user.entry(lock.user_id).or_default().insert(id);
    self.by_category.entry(lock.key()).or_default().insert(id);
    self.locks.insert(id, lock);
  }

  pub(crate) fn get(&self, lock_id: &LockId) -> Option<&TicketLock> {
    self.locks.get(lock_id)
  }

  pub(crate) fn active_for_user_in(&self, user_id: UserId, key: CategoryKey) -> Option<&TicketLock> {
    self
      .by_user
      .get(&user_id)?
      .iter()
      .filter_map(|id| self.locks.get(id))
      .find(|lock| lock.key() == key && lock.status == LockStatus::Active)
  }

  /// Moves an active lock into `status` and drops it from both indices.
  /// Returns the closed record, or `None` when the lock is unknown or already terminal.
  pub(crate) fn close(&mut self, lock_id: &LockId, status: LockStatus, now: DateTime<Utc>) -> Option<TicketLock> {
    debug_assert!(status.is_terminal());
    let lock = self.locks.get_mut(lock_id)?;
    if lock.status != LockStatus::Active {
      return None;
    }
    lock.status = status;
    lock.closed_at = Some(now);
    let closed = lock.clone();

    if let Some(ids) = self.by_user.get_mut(&closed.user_id) {
      ids.remove(lock_id);
      if ids.is_empty() {
        self.by_user.remove(&closed.user_id);
      }
    }
    let key = closed.key();
    if let Some(ids) = self.by_category.get_mut(&key) {
      ids.remove(lock_id);
      if ids.is_empty() {
        self.by_category.remove(&key);
      }
    }
    Some(closed)
  }

  /// Sum of quantities of active locks in the category that have not passed their expiry.
  pub(crate) fn locked_quantity(&self, key: CategoryKey, now: DateTime<Utc>) -> u32 {
    self
      .by_category
      .get(&key)
      .map(|ids| {
        ids
          .iter()
          .filter_map(|id| self.locks.get(id))
          .filter(|lock| lock.is_live(now))
          .map(|lock| lock.quantity)
          .sum()
      })
      .unwrap_or(0)
  }

  pub(crate) fn overdue_in(&self, key: CategoryKey, now: DateTime<Utc>) -> Vec<LockId> {
    self
      .by_category
      .get(&key)
      .map(|ids| {
        ids
          .iter()
          .filter(|id| self.locks.get(id).is_some_and(|lock| lock.is_overdue(now)))
          .copied()
          .collect()
      })
      .unwrap_or_default()
  }

  /// Every overdue active lock, grouped by category.
  pub(crate) fn overdue(&self, now: DateTime<Utc>) -> HashMap<CategoryKey, Vec<LockId>> {
    let mut grouped: HashMap<CategoryKey, Vec<LockId>> = HashMap::new();
    for (key, ids) in &self.by_category {
      for id in ids {
        if self.locks.get(id).is_some_and(|lock| lock.is_overdue(now)) {
          grouped.entry(*key).or_default().push(*id);
        }
      }
    }
    grouped
  }

  pub(crate) fn active_for_user(&self, user_id: UserId) -> Vec<TicketLock> {
    let mut found: Vec<TicketLock> = self
      .by_user
      .get(&user_id)
      .map(|ids| ids.iter().filter_map(|id| self.locks.get(id)).cloned().collect())
      .unwrap_or_default();
    found.sort_by_key(|lock| lock.created_at);
    found
  }

  /// Drops terminal locks closed at or before `cutoff`.
  pub(crate) fn purge(&mut self, cutoff: DateTime<Utc>) -> usize {
    let before = self.locks.len();
    self
      .locks
      .retain(|_, lock| !(lock.status.is_terminal() && lock.closed_at.is_some_and(|at| at <= cutoff)));
    before - self.locks.len()
  }

  pub(crate) fn stats(&self) -> LockStats {
    let mut stats = LockStats {
      total_locks: self.locks.len(),
      users_with_locks: self.by_user.len(),
      categories_with_locks: self.by_category.len(),
      ..LockStats::default()
    };
    for lock in self.locks.values() {
      match lock.status {
        LockStatus::Active => stats.active_locks += 1,
        LockStatus::Expired => stats.expired += 1,
        LockStatus::Released => stats.released += 1,
        LockStatus::Confirmed => stats.confirmed += 1,
      }
    }
    stats
  }
}

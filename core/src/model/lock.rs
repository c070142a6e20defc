// seatlock/src/model/lock.rs

use super::{CategoryId, CategoryKey, EventId, LockId, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a soft lock. Every state except `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStatus {
  Active,
  Expired,
  Released,
  Confirmed,
}

impl LockStatus {
  pub fn is_terminal(self) -> bool {
    !matches!(self, LockStatus::Active)
  }
}

impl fmt::Display for LockStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      LockStatus::Active => "active",
      LockStatus::Expired => "expired",
      LockStatus::Released => "released",
      LockStatus::Confirmed => "confirmed",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketLock {
  pub lock_id: LockId,
  pub event_id: EventId,
  pub category_id: CategoryId,
  pub quantity: u32,
  pub user_id: UserId,
  pub session_id: SessionId,
  pub created_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
  pub status: LockStatus,
  /// When the lock left `Active`; drives the purge grace period.
  #[serde(default)]
  pub closed_at: Option<DateTime<Utc>>,
}

impl TicketLock {
  pub fn key(&self) -> CategoryKey {
    CategoryKey::new(self.event_id, self.category_id)
  }

  pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
    self.expires_at <= now
  }

  /// Active and not yet past its expiry, i.e. still counted against availability.
  pub fn is_live(&self, now: DateTime<Utc>) -> bool {
    self.status == LockStatus::Active && !self.is_overdue(now)
  }
}

/// Successful outcome of [`crate::LockRegistry::lock`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockGranted {
  pub lock_id: LockId,
  pub expires_at: DateTime<Utc>,
  pub remaining_after_lock: u32,
}

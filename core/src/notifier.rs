// seatlock/src/notifier.rs

//! Availability fan-out.
//!
//! The ledger and the lock registry do not know who is watching. They push the
//! key of every category they touch into an [`AvailabilitySignal`]; the
//! notifier drains the matching [`ChangeFeed`] on its own task, recomputes the
//! category's snapshot and broadcasts it to subscribers of the event. Snapshots
//! are therefore eventually consistent with the ledger.

use crate::clock::Clock;
use crate::error::SeatlockResult;
use crate::locks::LockRegistry;
use crate::model::{CategoryId, CategoryKey, EventId};
use crate::orders::outbox::{OrderNotification, OrderNotifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Sending half of the change feed. Cheap to clone; never blocks.
#[derive(Debug, Clone)]
pub struct AvailabilitySignal {
  tx: mpsc::UnboundedSender<CategoryKey>,
}

/// Receiving half of the change feed, consumed by [`AvailabilityNotifier::spawn_feed`].
#[derive(Debug)]
pub struct ChangeFeed {
  rx: mpsc::UnboundedReceiver<CategoryKey>,
}

impl AvailabilitySignal {
  pub fn channel() -> (AvailabilitySignal, ChangeFeed) {
    let (tx, rx) = mpsc::unbounded_channel();
    (AvailabilitySignal { tx }, ChangeFeed { rx })
  }

  pub fn emit(&self, key: CategoryKey) {
    if self.tx.send(key).is_err() {
      trace!(%key, "Change feed closed; availability change not published.");
    }
  }
}

impl ChangeFeed {
  /// Next batch of distinct changed categories, or `None` once every signal is gone.
  pub async fn next_batch(&mut self) -> Option<BTreeSet<CategoryKey>> {
    let first = self.rx.recv().await?;
    let mut batch = BTreeSet::from([first]);
    while let Ok(key) = self.rx.try_recv() {
      batch.insert(key);
    }
    Some(batch)
  }
}

/// The `availability-update` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityUpdate {
  pub event_id: EventId,
  pub category_id: CategoryId,
  /// Ledger availability minus active locks.
  pub available_tickets: u32,
  pub locked_tickets: u32,
  /// `available_tickets + locked_tickets`. Approximate: it ignores reserved seats.
  pub total_tickets: u32,
  pub timestamp: DateTime<Utc>,
}

pub struct AvailabilityNotifier {
  locks: Arc<LockRegistry>,
  clock: Arc<dyn Clock>,
  channels: RwLock<HashMap<EventId, broadcast::Sender<AvailabilityUpdate>>>,
  orders: broadcast::Sender<OrderNotification>,
  capacity: usize,
}

impl AvailabilityNotifier {
  pub fn new(locks: Arc<LockRegistry>, clock: Arc<dyn Clock>, capacity: usize) -> Self {
    let capacity = capacity.max(1);
    let (orders, _) = broadcast::channel(capacity);
    Self {
      locks,
      clock,
      channels: RwLock::new(HashMap::new()),
      orders,
      capacity,
    }
  }

  /// Receives every snapshot published for the event from now on.
  pub fn subscribe(&self, event_id: EventId) -> broadcast::Receiver<AvailabilityUpdate> {
    if let Some(tx) = self.channels.read().get(&event_id) {
      return tx.subscribe();
    }
    self
      .channels
      .write()
      .entry(event_id)
      .or_insert_with(|| broadcast::channel(self.capacity).0)
      .subscribe()
  }

  /// Receives every order-completed / order-cancelled notification.
  pub fn subscribe_orders(&self) -> broadcast::Receiver<OrderNotification> {
    self.orders.subscribe()
  }

  /// Current availability of one category.
  pub fn snapshot(&self, event_id: EventId, category_id: CategoryId) -> SeatlockResult<AvailabilityUpdate> {
    let available = self.locks.ledger().available_seats(category_id)?;
    let locked = self.locks.locked_quantity(event_id, category_id);
    let available_tickets = available.saturating_sub(locked);
    Ok(AvailabilityUpdate {
      event_id,
      category_id,
      available_tickets,
      locked_tickets: locked,
      total_tickets: available_tickets.saturating_add(locked),
      timestamp: self.clock.now(),
    })
  }

  /// Snapshots of every active category of the event, for a subscriber that just joined.
  pub fn event_snapshot(&self, event_id: EventId) -> Vec<AvailabilityUpdate> {
    self
      .locks
      .ledger()
      .categories_for_event(event_id)
      .into_iter()
      .filter_map(|c| self.snapshot(event_id, c.id).ok())
      .collect()
  }

  /// Recomputes the category's snapshot and sends it to the event's subscribers.
  pub fn publish(&self, event_id: EventId, category_id: CategoryId) -> Option<AvailabilityUpdate> {
    let update = match self.snapshot(event_id, category_id) {
      Ok(update) => update,
      Err(e) => {
        debug!(event_id, category_id, error = %e, "No availability to publish.");
        return None;
      }
    };
    let tx = self.channels.read().get(&event_id).cloned();
    if let Some(tx) = tx {
      if tx.receiver_count() == 0 {
        self.prune_if_idle(event_id);
      } else {
        let receivers = tx.send(update.clone()).unwrap_or(0);
        trace!(event_id, category_id, receivers, "Availability published.");
      }
    }
    Some(update)
  }

  /// Drops the event's channel unless a subscriber joined since it was last seen idle.
  fn prune_if_idle(&self, event_id: EventId) {
    let mut channels = self.channels.write();
    if channels.get(&event_id).is_some_and(|tx| tx.receiver_count() == 0) {
      channels.remove(&event_id);
      trace!(event_id, "Idle availability channel dropped.");
    }
  }

  /// Drains the change feed until it closes or `shutdown` is cancelled.
  pub fn spawn_feed(self: &Arc<Self>, mut feed: ChangeFeed, shutdown: CancellationToken) -> JoinHandle<()> {
    let notifier = Arc::clone(self);
    tokio::spawn(async move {
      info!("Availability feed started.");
      loop {
        let batch = tokio::select! {
          _ = shutdown.cancelled() => break,
          batch = feed.next_batch() => batch,
        };
        let Some(batch) = batch else { break };
        for key in batch {
          notifier.publish(key.event_id, key.category_id);
        }
      }
      info!("Availability feed stopped.");
    })
  }
}

#[async_trait]
impl OrderNotifier for AvailabilityNotifier {
  async fn notify(&self, notification: &OrderNotification) -> anyhow::Result<()> {
    self.publish(notification.event_id, notification.category_id);
    // No subscribers is not a delivery failure.
    let _ = self.orders.send(notification.clone());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use crate::ledger::SeatLedger;
  use crate::model::NewCategory;

  fn notifier_with_category() -> (AvailabilityNotifier, CategoryId) {
    let ledger = Arc::new(SeatLedger::new());
    let category = ledger.create_category(NewCategory {
      event_id: 1,
      category_name: "Stalls".into(),
      price_cents: 4_000,
      total_seats: 8,
      description: None,
    });
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
    let locks = Arc::new(LockRegistry::new(
      ledger,
      clock.clone(),
      chrono::Duration::minutes(5),
      chrono::Duration::seconds(30),
    ));
    (AvailabilityNotifier::new(locks, clock, 4), category.id)
  }

  #[test]
  fn subscriber_joining_an_idle_channel_keeps_it() {
    let (notifier, cat) = notifier_with_category();
    drop(notifier.subscribe(1));

    // A subscriber arrives between publish seeing the channel idle and the prune.
    let idle = notifier.channels.read().get(&1).cloned().unwrap();
    assert_eq!(idle.receiver_count(), 0);
    let mut rx = notifier.subscribe(1);
    notifier.prune_if_idle(1);

    assert!(notifier.channels.read().contains_key(&1));
    notifier.publish(1, cat).unwrap();
    assert_eq!(rx.try_recv().unwrap().available_tickets, 8);

    drop(rx);
    notifier.publish(1, cat);
    assert!(!notifier.channels.read().contains_key(&1));
  }

  #[tokio::test]
  async fn batches_collapse_duplicate_keys() {
    let (signal, mut feed) = AvailabilitySignal::channel();
    signal.emit(CategoryKey::new(1, 2));
    signal.emit(CategoryKey::new(1, 2));
    signal.emit(CategoryKey::new(1, 3));
    let batch = feed.next_batch().await.unwrap();
    assert_eq!(batch.len(), 2);

    drop(signal);
    assert!(feed.next_batch().await.is_none());
  }
}

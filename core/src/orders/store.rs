// seatlock/src/orders/store.rs

use crate::clock::Clock;
use crate::error::SeatlockError;
use crate::model::{EventId, NewOrder, Order, OrderId, OrderStatus, UserId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFilter {
  All,
  User(UserId),
  Event(EventId),
}

impl OrderFilter {
  fn matches(&self, order: &Order) -> bool {
    match self {
      OrderFilter::All => true,
      OrderFilter::User(user_id) => order.user_id == *user_id,
      OrderFilter::Event(event_id) => order.event_id == *event_id,
    }
  }
}

/// Durable order records. Implementations report failures as `anyhow` errors;
/// a wrapped [`SeatlockError`] is passed through unchanged by the saga.
#[async_trait]
pub trait OrderStore: Send + Sync {
  /// Persists a `pending` order, assigning its id and timestamps.
  async fn insert(&self, new: NewOrder) -> anyhow::Result<Order>;

  async fn get(&self, order_id: OrderId) -> anyhow::Result<Option<Order>>;

  /// Moves the order to `status`; `notes`, when given, replace the stored notes.
  async fn update_status(&self, order_id: OrderId, status: OrderStatus, notes: Option<String>) -> anyhow::Result<Order>;

  /// Deletes the record. Used only to undo a pending order.
  async fn remove(&self, order_id: OrderId) -> anyhow::Result<bool>;

  /// Matching orders, newest first.
  async fn list(&self, filter: OrderFilter) -> anyhow::Result<Vec<Order>>;
}

pub struct InMemoryOrderStore {
  orders: RwLock<BTreeMap<OrderId, Order>>,
  next_id: AtomicU64,
  clock: Arc<dyn Clock>,
}

impl InMemoryOrderStore {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      orders: RwLock::new(BTreeMap::new()),
      next_id: AtomicU64::new(1),
      clock,
    }
  }

  pub fn len(&self) -> usize {
    self.orders.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.orders.read().is_empty()
  }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
  async fn insert(&self, new: NewOrder) -> anyhow::Result<Order> {
    let now = self.clock.now();
    let order = Order {
      id: self.next_id.fetch_add(1, Ordering::Relaxed),
      user_id: new.user_id,
      event_id: new.event_id,
      category_id: new.category_id,
      quantity: new.quantity,
      unit_price_cents: new.unit_price_cents,
      total_price_cents: new.total_price_cents(),
      status: OrderStatus::Pending,
      event_name: new.event_name,
      category_name: new.category_name,
      notes: new.notes,
      created_at: now,
      updated_at: now,
    };
    self.orders.write().insert(order.id, order.clone());
    Ok(order)
  }

  async fn get(&self, order_id: OrderId) -> anyhow::Result<Option<Order>> {
    Ok(self.orders.read().get(&order_id).cloned())
  }

  async fn update_status(&self, order_id: OrderId, status: OrderStatus, notes: Option<String>) -> anyhow::Result<Order> {
    let mut orders = self.orders.write();
    let order = orders
      .get_mut(&order_id)
      .ok_or(SeatlockError::OrderNotFound { order_id })?;
    if !order.status.can_transition_to(status) {
      return Err(
        SeatlockError::InvalidState {
          order_id,
          status: order.status,
          action: "change status",
        }
        .into(),
      );
    }
    order.status = status;
    if notes.is_some() {
      order.notes = notes;
    }
    order.updated_at = self.clock.now();
    Ok(order.clone())
  }

  async fn remove(&self, order_id: OrderId) -> anyhow::Result<bool> {
    Ok(self.orders.write().remove(&order_id).is_some())
  }

  async fn list(&self, filter: OrderFilter) -> anyhow::Result<Vec<Order>> {
    Ok(
      self
        .orders
        .read()
        .values()
        .rev()
        .filter(|o| filter.matches(o))
        .cloned()
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::SystemClock;

  fn new_order(user_id: UserId) -> NewOrder {
    NewOrder {
      user_id,
      event_id: 10,
      category_id: 20,
      quantity: 2,
      unit_price_cents: 1_250,
      event_name: "Gig".into(),
      category_name: "Balcony".into(),
      notes: None,
    }
  }

  #[tokio::test]
  async fn illegal_transitions_are_refused() {
    let store = InMemoryOrderStore::new(Arc::new(SystemClock));
    let order = store.insert(new_order(1)).await.unwrap();
    assert_eq!(order.total_price_cents, 2_500);

    let err = store.update_status(order.id, OrderStatus::Cancelled, None).await.unwrap_err();
    assert!(matches!(
      SeatlockError::from(err),
      SeatlockError::InvalidState { status: OrderStatus::Pending, .. }
    ));
    store.update_status(order.id, OrderStatus::Confirmed, None).await.unwrap();
  }

  #[tokio::test]
  async fn list_filters_and_orders_newest_first() {
    let store = InMemoryOrderStore::new(Arc::new(SystemClock));
    let a = store.insert(new_order(1)).await.unwrap();
    let b = store.insert(new_order(2)).await.unwrap();
    let c = store.insert(new_order(1)).await.unwrap();

    let mine: Vec<OrderId> = store.list(OrderFilter::User(1)).await.unwrap().iter().map(|o| o.id).collect();
    assert_eq!(mine, vec![c.id, a.id]);
    assert_eq!(store.list(OrderFilter::All).await.unwrap().len(), 3);
    assert!(store.remove(b.id).await.unwrap());
    assert!(!store.remove(b.id).await.unwrap());
  }
}

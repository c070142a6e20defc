// tests/box_office_tests.rs
mod common;

use common::*;
use seatlock::contracts::{
  CancelOrder, ConfirmLock, CreateOrder, LockTickets, ReleaseTickets, ReserveTickets, UnlockTickets,
};
use seatlock::model::OrderStatus;
use seatlock::{
  AvailabilityUpdate, BoxOffice, Clock, InMemoryOrderStore, ManualClock, NotificationKind, SeatlockConfig, SeatlockError,
};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn box_office() -> (BoxOffice, u64) {
  let config = SeatlockConfig {
    sweep_interval: Duration::from_millis(50),
    upstream_timeout: Duration::from_millis(500),
    ..SeatlockConfig::default()
  };
  let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(start_time()));
  let store = Arc::new(InMemoryOrderStore::new(clock.clone()));
  let office = BoxOffice::with_parts(config, clock, store).unwrap();
  office.add_event(summer_gig());
  let c = office.add_category(category(EVENT_ID, "Floor", 6_000, 10));
  (office, c.id)
}

fn lock_request(user_id: u64, session: &str, category_id: u64, quantity: u32) -> LockTickets {
  LockTickets {
    event_id: EVENT_ID,
    category_id,
    quantity,
    user_id,
    session_id: session.into(),
  }
}

async fn next_update(rx: &mut broadcast::Receiver<AvailabilityUpdate>) -> AvailabilityUpdate {
  tokio::time::timeout(Duration::from_secs(2), rx.recv())
    .await
    .expect("no availability update within 2s")
    .expect("availability channel closed")
}

#[tokio::test]
#[serial]
async fn test_join_event_then_receive_lock_updates() {
  setup_tracing();
  let (office, cat) = box_office();
  office.start();

  let (mut rx, initial) = office.join_event(EVENT_ID);
  assert_eq!(initial.len(), 1);
  assert_eq!(initial[0].available_tickets, 10);
  assert_eq!(initial[0].locked_tickets, 0);

  let response = office.lock_tickets(lock_request(1, "tab", cat, 4));
  assert!(response.success);
  assert_eq!(response.available_tickets, Some(6));

  let update = next_update(&mut rx).await;
  assert_eq!(update.category_id, cat);
  assert_eq!(update.available_tickets, 6);
  assert_eq!(update.locked_tickets, 4);
  assert_eq!(update.total_tickets, 10);

  assert_eq!(office.disconnect(1, "tab"), 1);
  let update = next_update(&mut rx).await;
  assert_eq!(update.available_tickets, 10);
  assert_eq!(update.locked_tickets, 0);

  office.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_lock_contract_messages() {
  setup_tracing();
  let (office, cat) = box_office();

  assert!(office.lock_tickets(lock_request(1, "tab", cat, 8)).success);

  let again = office.lock_tickets(lock_request(1, "tab", cat, 1));
  assert!(!again.success);
  assert_eq!(again.message.as_deref(), Some("You already have tickets locked for this category"));

  let too_many = office.lock_tickets(lock_request(2, "tab", cat, 3));
  assert_eq!(too_many.message.as_deref(), Some("Only 2 tickets available"));
  assert_eq!(too_many.available_tickets, Some(2));

  assert!(office.lock_tickets(lock_request(3, "tab", cat, 1)).success);
  let last_one = office.lock_tickets(lock_request(4, "tab", cat, 2));
  assert_eq!(last_one.message.as_deref(), Some("Only 1 ticket available"));
  assert_eq!(last_one.available_tickets, Some(1));

  let missing = office.lock_tickets(lock_request(2, "tab", 999, 1));
  assert_eq!(missing.message.as_deref(), Some("Ticket category not found"));

  let unlock = UnlockTickets {
    event_id: EVENT_ID,
    category_id: cat,
    quantity: 8,
    user_id: 1,
    session_id: "tab".into(),
  };
  let first = office.unlock_tickets(unlock.clone());
  assert!(first.success);
  assert_eq!(first.message, "Tickets unlocked successfully");
  let second = office.unlock_tickets(unlock);
  assert!(!second.success);
  assert_eq!(second.message, "No tickets found to unlock");
}

#[tokio::test]
#[serial]
async fn test_confirm_lock_requires_owner() {
  setup_tracing();
  let (office, cat) = box_office();
  let lock_id = office.lock_tickets(lock_request(1, "tab", cat, 2)).lock_id.unwrap();

  assert!(!office.confirm_lock(ConfirmLock { lock_id, user_id: 2 }));
  assert!(office.confirm_lock(ConfirmLock { lock_id, user_id: 1 }));
  assert!(!office.confirm_lock(ConfirmLock { lock_id, user_id: 1 }));
  assert_eq!(office.lock_stats().confirmed, 1);
}

#[tokio::test]
#[serial]
async fn test_disconnect_releases_only_that_session() {
  setup_tracing();
  let (office, cat) = box_office();
  let other = office.add_category(category(EVENT_ID, "Balcony", 3_000, 5));
  office.lock_tickets(lock_request(1, "phone", cat, 2));
  office.lock_tickets(lock_request(1, "laptop", other.id, 1));

  assert_eq!(office.disconnect(1, "phone"), 1);
  let remaining = office.my_locks(1);
  assert_eq!(remaining.len(), 1);
  assert_eq!(remaining[0].session_id, "laptop");
  assert_eq!(office.disconnect(1, "phone"), 0);
}

#[tokio::test]
#[serial]
async fn test_reserve_and_release_contracts() {
  setup_tracing();
  let (office, cat) = box_office();

  assert!(office.reserve_tickets(ReserveTickets {
    event_id: EVENT_ID,
    category_id: cat,
    quantity: 3,
  }));
  assert!(!office.reserve_tickets(ReserveTickets {
    event_id: EVENT_ID + 1,
    category_id: cat,
    quantity: 1,
  }));
  assert!(!office.reserve_tickets(ReserveTickets {
    event_id: EVENT_ID,
    category_id: cat,
    quantity: 8,
  }));

  let categories = office.ticket_categories(EVENT_ID);
  assert_eq!(categories.len(), 1);
  assert_eq!(categories[0].available_seats, 7);

  assert!(office.release_tickets(ReleaseTickets {
    category_id: cat,
    quantity: 3,
  }));
  assert_eq!(office.ticket_categories(EVENT_ID)[0].available_seats, 10);
  assert!(!office.release_tickets(ReleaseTickets {
    category_id: 999,
    quantity: 1,
  }));
  assert_eq!(office.event_by_id(EVENT_ID).unwrap().event_name, "Summer Gig");
  assert!(office.event_by_id(7).is_none());
}

#[tokio::test]
#[serial]
async fn test_order_lifecycle_broadcasts_notifications() {
  setup_tracing();
  let (office, cat) = box_office();
  office.start();
  let mut orders_rx = office.subscribe_orders();

  let lock_id = office.lock_tickets(lock_request(5, "tab", cat, 2)).lock_id;
  let order = office
    .create_order(CreateOrder {
      user_id: 5,
      event_id: EVENT_ID,
      category_id: cat,
      quantity: 2,
      notes: None,
      lock_id,
    })
    .await
    .unwrap();
  assert_eq!(order.status, OrderStatus::Confirmed);
  assert_eq!(order.total_price_cents, 12_000);

  let completed = tokio::time::timeout(Duration::from_secs(2), orders_rx.recv())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(completed.kind, NotificationKind::OrderCompleted);
  assert_eq!(completed.order_id, order.id);

  let cancelled = office.cancel_order(CancelOrder { order_id: order.id }).await.unwrap();
  assert_eq!(cancelled.status, OrderStatus::Cancelled);
  let notice = tokio::time::timeout(Duration::from_secs(2), orders_rx.recv())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(notice.kind, NotificationKind::OrderCancelled);

  assert_eq!(office.ticket_categories(EVENT_ID)[0].available_seats, 10);
  assert_eq!(office.orders_for_user(5).await.unwrap().len(), 1);

  office.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_start_is_idempotent_and_shutdown_joins() {
  setup_tracing();
  let (office, _cat) = box_office();
  office.start();
  office.start();
  tokio::time::timeout(Duration::from_secs(2), office.shutdown())
    .await
    .expect("shutdown did not finish");
}

#[test]
fn test_oversized_lock_ttl_is_rejected_at_construction() {
  let config = SeatlockConfig {
    lock_ttl: Duration::from_secs(9_000_000_000_000),
    ..SeatlockConfig::default()
  };
  let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(start_time()));
  let store = Arc::new(InMemoryOrderStore::new(clock.clone()));
  assert!(matches!(
    BoxOffice::with_parts(config, clock, store),
    Err(SeatlockError::Config(_))
  ));
}

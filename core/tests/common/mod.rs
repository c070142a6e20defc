// tests/common/mod.rs
#![allow(dead_code)] // Not every test file uses every helper.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use parking_lot::Mutex;
use seatlock::catalog::{EventCatalog, InMemoryCatalog};
use seatlock::model::{EventId, EventSummary, NewCategory, NewOrder, Order, OrderId, OrderStatus, TicketCategory};
use seatlock::orders::store::OrderFilter;
use seatlock::saga::definition::{CompensationHandler, StepHandler};
use seatlock::{
  Clock, InMemoryOrderStore, LockRegistry, ManualClock, OrderNotification, OrderNotifier, OrderStore, Outbox,
  ReservationDeps, ReservationSaga, RetryPolicy, SagaContext, SeatLedger, SeatlockError, StepControl,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::Level;

// --- Saga engine fixtures ---

#[derive(Clone, Debug, Default)]
pub struct TestContext {
  pub steps_executed: Vec<String>,
  pub compensated: Vec<String>,
  pub should_stop_at: Option<String>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("Seatlock error: {0}")]
  Seatlock(String),

  #[error("Test step failed: {0}")]
  Step(String),
}

impl From<SeatlockError> for TestError {
  fn from(e: SeatlockError) -> Self {
    TestError::Seatlock(format!("{:?}", e))
  }
}

pub fn create_recording_handler(step_name: &'static str) -> StepHandler<TestContext, TestError> {
  Box::new(move |ctx: SagaContext<TestContext>| {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.steps_executed.push(step_name.to_string());
      if guard.should_stop_at.as_deref() == Some(step_name) {
        return Ok(StepControl::Stop);
      }
      Ok(StepControl::Continue)
    })
  })
}

pub fn create_failing_handler(step_name: &'static str, message: &'static str) -> StepHandler<TestContext, TestError> {
  Box::new(move |ctx: SagaContext<TestContext>| {
    Box::pin(async move {
      ctx.write().steps_executed.push(step_name.to_string());
      tracing::warn!(target: "test_handlers", step = step_name, "failing with: '{}'", message);
      Err(TestError::Step(message.to_string()))
    })
  })
}

pub fn create_compensation(step_name: &'static str) -> CompensationHandler<TestContext, TestError> {
  Box::new(move |ctx: SagaContext<TestContext>| {
    Box::pin(async move {
      ctx.write().compensated.push(step_name.to_string());
      Ok(())
    })
  })
}

// --- Tracing ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Collaborator doubles ---

/// Records every notification; fails while `failing` is set.
#[derive(Default)]
pub struct RecordingNotifier {
  pub delivered: Mutex<Vec<OrderNotification>>,
  pub attempts: AtomicUsize,
  pub failing: AtomicBool,
}

#[async_trait]
impl OrderNotifier for RecordingNotifier {
  async fn notify(&self, notification: &OrderNotification) -> anyhow::Result<()> {
    self.attempts.fetch_add(1, Ordering::SeqCst);
    if self.failing.load(Ordering::SeqCst) {
      anyhow::bail!("message bus unreachable");
    }
    self.delivered.lock().push(notification.clone());
    Ok(())
  }
}

/// An in-memory store whose writes can be made to fail on demand.
pub struct FaultyStore {
  pub inner: InMemoryOrderStore,
  pub fail_status: Mutex<Option<OrderStatus>>,
  pub fail_remove: AtomicBool,
}

impl FaultyStore {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      inner: InMemoryOrderStore::new(clock),
      fail_status: Mutex::new(None),
      fail_remove: AtomicBool::new(false),
    }
  }

  pub fn fail_when_setting(&self, status: Option<OrderStatus>) {
    *self.fail_status.lock() = status;
  }
}

#[async_trait]
impl OrderStore for FaultyStore {
  async fn insert(&self, new: NewOrder) -> anyhow::Result<Order> {
    self.inner.insert(new).await
  }

  async fn get(&self, order_id: OrderId) -> anyhow::Result<Option<Order>> {
    self.inner.get(order_id).await
  }

  async fn update_status(&self, order_id: OrderId, status: OrderStatus, notes: Option<String>) -> anyhow::Result<Order> {
    let failing = *self.fail_status.lock();
    if failing == Some(status) {
      anyhow::bail!("order database write timed out");
    }
    self.inner.update_status(order_id, status, notes).await
  }

  async fn remove(&self, order_id: OrderId) -> anyhow::Result<bool> {
    if self.fail_remove.load(Ordering::SeqCst) {
      anyhow::bail!("order database unavailable");
    }
    self.inner.remove(order_id).await
  }

  async fn list(&self, filter: OrderFilter) -> anyhow::Result<Vec<Order>> {
    self.inner.list(filter).await
  }
}

/// A catalog that never answers.
pub struct StalledCatalog;

#[async_trait]
impl EventCatalog for StalledCatalog {
  async fn event_by_id(&self, _event_id: EventId) -> anyhow::Result<Option<EventSummary>> {
    std::future::pending().await
  }

  async fn ticket_categories(&self, _event_id: EventId) -> anyhow::Result<Vec<TicketCategory>> {
    std::future::pending().await
  }
}

// --- Venue: a fully wired saga over in-memory collaborators ---

pub const EVENT_ID: EventId = 42;

pub fn start_time() -> chrono::DateTime<Utc> {
  Utc.with_ymd_and_hms(2026, 3, 14, 19, 0, 0).unwrap()
}

pub fn summer_gig() -> EventSummary {
  EventSummary {
    id: EVENT_ID,
    event_name: "Summer Gig".into(),
    venue: Some("Riverside Hall".into()),
    starts_at: Some(start_time()),
  }
}

pub fn category(event_id: EventId, name: &str, price_cents: u64, total_seats: u32) -> NewCategory {
  NewCategory {
    event_id,
    category_name: name.into(),
    price_cents,
    total_seats,
    description: None,
  }
}

pub struct Venue {
  pub clock: Arc<ManualClock>,
  pub ledger: Arc<SeatLedger>,
  pub locks: Arc<LockRegistry>,
  pub catalog: Arc<InMemoryCatalog>,
  pub store: Arc<FaultyStore>,
  pub notifier: Arc<RecordingNotifier>,
  pub saga: ReservationSaga,
  /// The single category of `EVENT_ID`.
  pub category: TicketCategory,
}

impl Venue {
  pub fn new(total_seats: u32) -> Self {
    Self::with_catalog(total_seats, None)
  }

  /// `catalog` replaces the in-memory catalog the saga reads from.
  pub fn with_catalog(total_seats: u32, catalog: Option<Arc<dyn EventCatalog>>) -> Self {
    let clock = Arc::new(ManualClock::new(start_time() - Duration::days(30)));
    let ledger = Arc::new(SeatLedger::new());
    let locks = Arc::new(LockRegistry::new(
      ledger.clone(),
      clock.clone(),
      Duration::minutes(5),
      Duration::seconds(30),
    ));
    let in_memory = Arc::new(InMemoryCatalog::new(ledger.clone()));
    in_memory.add_event(summer_gig());
    let category = ledger.create_category(category(EVENT_ID, "Standing", 4_500, total_seats));

    let store = Arc::new(FaultyStore::new(clock.clone()));
    let notifier = Arc::new(RecordingNotifier::default());
    let retry = RetryPolicy::builder()
      .max_attempts(2)
      .initial_delay(std::time::Duration::from_millis(1))
      .build();
    let saga = ReservationSaga::new(ReservationDeps {
      ledger: ledger.clone(),
      locks: locks.clone(),
      catalog: catalog.unwrap_or_else(|| in_memory.clone() as Arc<dyn EventCatalog>),
      store: store.clone(),
      outbox: Outbox::new(notifier.clone(), retry),
      clock: clock.clone(),
      upstream_timeout: std::time::Duration::from_millis(200),
    });

    Self {
      clock,
      ledger,
      locks,
      catalog: in_memory,
      store,
      notifier,
      saga,
      category,
    }
  }

  pub fn reserved(&self) -> u32 {
    self.ledger.category(self.category.id).map(|c| c.reserved_seats).unwrap_or_default()
  }

  pub fn held(&self) -> u32 {
    self.ledger.category(self.category.id).map(|c| c.held_seats).unwrap_or_default()
  }

  pub fn order_request(&self, user_id: u64, quantity: u32) -> seatlock::contracts::CreateOrder {
    seatlock::contracts::CreateOrder {
      user_id,
      event_id: EVENT_ID,
      category_id: self.category.id,
      quantity,
      notes: None,
      lock_id: None,
    }
  }
}

// seatlock/src/box_office.rs

//! Transport-agnostic entry points for every message contract, and the
//! lifecycle of the background tasks.

use crate::catalog::InMemoryCatalog;
use crate::clock::{Clock, SystemClock};
use crate::config::SeatlockConfig;
use crate::contracts::{
  CancelOrder, ConfirmLock, CreateOrder, LockTickets, LockTicketsResponse, OrderResponse, ReleaseTickets,
  ReserveTickets, TicketCategoryView, UnlockTickets, UnlockTicketsResponse,
};
use crate::error::SeatlockResult;
use crate::ledger::SeatLedger;
use crate::locks::{LockMaintenance, LockRegistry, LockStats};
use crate::model::{EventId, EventSummary, NewCategory, OrderId, TicketCategory, TicketLock, UserId};
use crate::notifier::{AvailabilityNotifier, AvailabilitySignal, AvailabilityUpdate, ChangeFeed};
use crate::orders::outbox::{OrderNotification, OrderNotifier, Outbox};
use crate::orders::reservation::{ReservationDeps, ReservationSaga};
use crate::orders::store::{InMemoryOrderStore, OrderStore};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub struct BoxOffice {
  config: SeatlockConfig,
  ledger: Arc<SeatLedger>,
  locks: Arc<LockRegistry>,
  notifier: Arc<AvailabilityNotifier>,
  catalog: Arc<InMemoryCatalog>,
  orders: ReservationSaga,
  feed: Mutex<Option<ChangeFeed>>,
  shutdown: CancellationToken,
  tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BoxOffice {
  /// System clock and an in-memory order store.
  pub fn new(config: SeatlockConfig) -> SeatlockResult<Self> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(InMemoryOrderStore::new(clock.clone()));
    Self::with_parts(config, clock, store)
  }

  /// Fails with `Config` when the configuration does not validate.
  pub fn with_parts(config: SeatlockConfig, clock: Arc<dyn Clock>, store: Arc<dyn OrderStore>) -> SeatlockResult<Self> {
    config.validate()?;
    let (lock_ttl, purge_grace) = (config.lock_ttl_chrono()?, config.purge_grace_chrono()?);
    let (signal, feed) = AvailabilitySignal::channel();
    let ledger = Arc::new(SeatLedger::with_signal(signal.clone()));
    let locks = Arc::new(
      LockRegistry::new(
        ledger.clone(),
        clock.clone(),
        lock_ttl,
        purge_grace,
      )
      .with_signal(signal),
    );
    let notifier = Arc::new(AvailabilityNotifier::new(
      locks.clone(),
      clock.clone(),
      config.broadcast_capacity,
    ));
    let catalog = Arc::new(InMemoryCatalog::new(ledger.clone()));
    let outbox = Outbox::new(notifier.clone() as Arc<dyn OrderNotifier>, config.notify_retry.clone());
    let orders = ReservationSaga::new(ReservationDeps {
      ledger: ledger.clone(),
      locks: locks.clone(),
      catalog: catalog.clone(),
      store,
      outbox,
      clock,
      upstream_timeout: config.upstream_timeout,
    });

    Ok(Self {
      config,
      ledger,
      locks,
      notifier,
      catalog,
      orders,
      feed: Mutex::new(Some(feed)),
      shutdown: CancellationToken::new(),
      tasks: Mutex::new(Vec::new()),
    })
  }

  /// Spawns the lock maintenance task and the availability feed. Calling it twice is a no-op.
  pub fn start(&self) {
    let Some(feed) = self.feed.lock().take() else {
      warn!("Box office already started.");
      return;
    };
    let maintenance = LockMaintenance::new(self.locks.clone(), self.config.sweep_interval, self.shutdown.child_token());
    let mut tasks = self.tasks.lock();
    tasks.push(maintenance.spawn());
    tasks.push(self.notifier.spawn_feed(feed, self.shutdown.child_token()));
    info!("Box office started.");
  }

  /// Stops the background tasks and waits for queued notifications.
  pub async fn shutdown(&self) {
    self.shutdown.cancel();
    let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
    for task in tasks {
      if let Err(e) = task.await {
        warn!(error = %e, "Background task ended abnormally.");
      }
    }
    self.orders.outbox().flush().await;
    info!("Box office stopped.");
  }

  // --- catalog setup ---

  pub fn add_event(&self, event: EventSummary) {
    self.catalog.add_event(event);
  }

  pub fn add_category(&self, category: NewCategory) -> TicketCategory {
    self.ledger.create_category(category)
  }

  // --- ledger contracts ---

  /// `reserve-tickets`
  pub fn reserve_tickets(&self, request: ReserveTickets) -> bool {
    match self
      .locks
      .reserve(request.event_id, request.category_id, request.quantity)
    {
      Ok(_) => true,
      Err(e) => {
        debug!(error = %e, "reserve-tickets refused.");
        false
      }
    }
  }

  /// `release-tickets`
  pub fn release_tickets(&self, request: ReleaseTickets) -> bool {
    self.ledger.release(request.category_id, request.quantity).is_ok()
  }

  /// `get-ticket-categories`
  pub fn ticket_categories(&self, event_id: EventId) -> Vec<TicketCategoryView> {
    self
      .ledger
      .categories_for_event(event_id)
      .iter()
      .map(TicketCategoryView::from)
      .collect()
  }

  /// `get-event-by-id`
  pub fn event_by_id(&self, event_id: EventId) -> Option<EventSummary> {
    self.catalog.event(event_id)
  }

  // --- lock contracts ---

  /// `lock-tickets`
  pub fn lock_tickets(&self, request: LockTickets) -> LockTicketsResponse {
    self
      .locks
      .lock(
        request.user_id,
        request.session_id,
        request.event_id,
        request.category_id,
        request.quantity,
      )
      .into()
  }

  /// `unlock-tickets`
  pub fn unlock_tickets(&self, request: UnlockTickets) -> UnlockTicketsResponse {
    let released = self.locks.unlock(
      request.user_id,
      &request.session_id,
      request.event_id,
      request.category_id,
    );
    UnlockTicketsResponse::from_outcome(released)
  }

  /// `confirm-lock`. Only the lock's owner may confirm it.
  pub fn confirm_lock(&self, request: ConfirmLock) -> bool {
    match self.locks.inspect(request.lock_id) {
      Some(lock) if lock.user_id == request.user_id => self.locks.confirm(request.lock_id),
      Some(_) => {
        warn!(lock_id = %request.lock_id, user_id = request.user_id, "confirm-lock by a non-owner refused.");
        false
      }
      None => false,
    }
  }

  pub fn my_locks(&self, user_id: UserId) -> Vec<TicketLock> {
    self.locks.user_locks(user_id)
  }

  pub fn lock_stats(&self) -> LockStats {
    self.locks.stats()
  }

  /// A session went away: its locks are released.
  #[instrument(name = "BoxOffice::disconnect", skip(self))]
  pub fn disconnect(&self, user_id: UserId, session_id: &str) -> usize {
    self.locks.release_all_for_user(user_id, Some(session_id))
  }

  // --- order contracts ---

  /// `create-order`
  pub async fn create_order(&self, request: CreateOrder) -> SeatlockResult<OrderResponse> {
    self.orders.create_order(request).await.map(OrderResponse::from)
  }

  /// `cancel-order`
  pub async fn cancel_order(&self, request: CancelOrder) -> SeatlockResult<OrderResponse> {
    self.orders.cancel_order(request.order_id).await.map(OrderResponse::from)
  }

  pub async fn complete_order(&self, order_id: OrderId) -> SeatlockResult<OrderResponse> {
    self.orders.complete_order(order_id).await.map(OrderResponse::from)
  }

  pub async fn orders_for_user(&self, user_id: UserId) -> SeatlockResult<Vec<OrderResponse>> {
    let orders = self.orders.orders_for_user(user_id).await?;
    Ok(orders.into_iter().map(OrderResponse::from).collect())
  }

  // --- observers ---

  /// Subscribes to an event's availability and returns the current snapshot of all its categories.
  pub fn join_event(&self, event_id: EventId) -> (broadcast::Receiver<AvailabilityUpdate>, Vec<AvailabilityUpdate>) {
    let rx = self.notifier.subscribe(event_id);
    (rx, self.notifier.event_snapshot(event_id))
  }

  pub fn subscribe_orders(&self) -> broadcast::Receiver<OrderNotification> {
    self.notifier.subscribe_orders()
  }

  // --- components ---

  pub fn config(&self) -> &SeatlockConfig {
    &self.config
  }

  pub fn ledger(&self) -> &Arc<SeatLedger> {
    &self.ledger
  }

  pub fn locks(&self) -> &Arc<LockRegistry> {
    &self.locks
  }

  pub fn notifier(&self) -> &Arc<AvailabilityNotifier> {
    &self.notifier
  }

  pub fn orders(&self) -> &ReservationSaga {
    &self.orders
  }
}

impl Drop for BoxOffice {
  fn drop(&mut self) {
    self.shutdown.cancel();
  }
}

// seatlock/src/orders/reservation.rs

//! Order creation and cancellation across the seat ledger and the order store.

use super::outbox::{NotificationKind, OrderNotification, Outbox};
use super::store::{OrderFilter, OrderStore};
use crate::catalog::EventCatalog;
use crate::clock::Clock;
use crate::contracts::CreateOrder;
use crate::error::{SeatlockError, SeatlockResult};
use crate::ledger::SeatLedger;
use crate::locks::LockRegistry;
use crate::model::{EventId, EventSummary, LockStatus, NewOrder, Order, OrderId, OrderStatus, TicketCategory, UserId};
use crate::saga::{Saga, SagaContext, SagaOutcome, SkipCondition, StepControl};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

pub const VALIDATE_LOCK: &str = "validate_lock";
pub const LOAD_SNAPSHOT: &str = "load_snapshot";
pub const CHECK_AVAILABILITY: &str = "check_availability";
pub const PERSIST_PENDING_ORDER: &str = "persist_pending_order";
pub const RESERVE_SEATS: &str = "reserve_seats";
pub const CONFIRM_ORDER: &str = "confirm_order";
pub const ANNOUNCE_ORDER: &str = "announce_order";

const CANCELLED_BY_USER: &str = "Order cancelled by user";

/// Working state of one `create_order` run.
#[derive(Debug, Clone)]
pub struct OrderDraft {
  pub request: CreateOrder,
  pub event: Option<EventSummary>,
  pub category: Option<TicketCategory>,
  pub order: Option<Order>,
  /// Set once the ledger holds seats for this order; drives the release compensation.
  pub seats_reserved: bool,
}

impl OrderDraft {
  pub fn new(request: CreateOrder) -> Self {
    Self {
      request,
      event: None,
      category: None,
      order: None,
      seats_reserved: false,
    }
  }
}

/// Collaborators of the saga.
pub struct ReservationDeps {
  pub ledger: Arc<SeatLedger>,
  pub locks: Arc<LockRegistry>,
  pub catalog: Arc<dyn EventCatalog>,
  pub store: Arc<dyn OrderStore>,
  pub outbox: Outbox,
  pub clock: Arc<dyn Clock>,
  pub upstream_timeout: Duration,
}

pub struct ReservationSaga {
  ledger: Arc<SeatLedger>,
  store: Arc<dyn OrderStore>,
  outbox: Outbox,
  upstream_timeout: Duration,
  create: Saga<OrderDraft, SeatlockError>,
  cancelling: Mutex<HashSet<OrderId>>,
}

impl ReservationSaga {
  pub fn new(deps: ReservationDeps) -> Self {
    let create = build_create_saga(&deps);
    Self {
      ledger: deps.ledger,
      store: deps.store,
      outbox: deps.outbox,
      upstream_timeout: deps.upstream_timeout,
      create,
      cancelling: Mutex::new(HashSet::new()),
    }
  }

  pub fn outbox(&self) -> &Outbox {
    &self.outbox
  }

  /// Creates a confirmed order, or leaves no trace: on failure the pending
  /// record is removed and any reserved seats are released.
  #[instrument(
    name = "ReservationSaga::create_order",
    skip_all,
    fields(
      user_id = request.user_id,
      event_id = request.event_id,
      category_id = request.category_id,
      quantity = request.quantity,
      locked = request.lock_id.is_some()
    ),
    err(Display)
  )]
  pub async fn create_order(&self, request: CreateOrder) -> SeatlockResult<Order> {
    if request.quantity == 0 {
      return Err(SeatlockError::InvalidQuantity { quantity: 0 });
    }
    let ctx = SagaContext::new(OrderDraft::new(request));
    match self.create.run(ctx.clone()).await? {
      SagaOutcome::Completed => {}
      SagaOutcome::Stopped => {
        return Err(SeatlockError::Internal(format!(
          "saga '{}' stopped before confirmation",
          self.create.name()
        )));
      }
    }

    let order = ctx
      .read()
      .order
      .clone()
      .ok_or_else(|| SeatlockError::Internal("order saga completed without an order".into()))?;
    let order = match call_upstream("order_store", self.upstream_timeout, self.store.get(order.id)).await {
      Ok(Some(fresh)) => fresh,
      _ => order,
    };
    info!(order_id = order.id, total_price_cents = order.total_price_cents, "Order created.");
    Ok(order)
  }

  /// Cancels a confirmed order and returns its seats to the ledger exactly once.
  #[instrument(name = "ReservationSaga::cancel_order", skip(self), err(Display))]
  pub async fn cancel_order(&self, order_id: OrderId) -> SeatlockResult<Order> {
    let order = self.order(order_id).await?;
    ensure_cancellable(&order)?;

    let Some(_claim) = self.claim_cancellation(order_id) else {
      warn!("Cancellation already in progress.");
      return Err(SeatlockError::InvalidState {
        order_id,
        status: order.status,
        action: "cancel",
      });
    };
    // Another cancellation may have finished between the read and the claim.
    let order = self.order(order_id).await?;
    ensure_cancellable(&order)?;

    self.ledger.release(order.category_id, order.quantity)?;

    let cancelled = match call_upstream(
      "order_store",
      self.upstream_timeout,
      self
        .store
        .update_status(order_id, OrderStatus::Cancelled, Some(CANCELLED_BY_USER.to_string())),
    )
    .await
    {
      Ok(cancelled) => cancelled,
      Err(e) => {
        warn!(error = %e, "Status write failed after release; re-reserving seats.");
        if let Err(undo) = self.ledger.reserve(order.category_id, order.quantity) {
          error!(
            target: "seatlock::integrity",
            order_id,
            category_id = order.category_id,
            quantity = order.quantity,
            error = %undo,
            "Order is still confirmed but its seats were released and could not be re-reserved."
          );
        }
        return Err(e);
      }
    };

    self
      .outbox
      .enqueue(OrderNotification::for_order(NotificationKind::OrderCancelled, &cancelled));
    info!(category_id = cancelled.category_id, quantity = cancelled.quantity, "Order cancelled.");
    Ok(cancelled)
  }

  /// `confirmed -> completed`. Seats stay reserved.
  #[instrument(name = "ReservationSaga::complete_order", skip(self), err(Display))]
  pub async fn complete_order(&self, order_id: OrderId) -> SeatlockResult<Order> {
    let order = self.order(order_id).await?;
    if order.status != OrderStatus::Confirmed {
      return Err(SeatlockError::InvalidState {
        order_id,
        status: order.status,
        action: "complete",
      });
    }
    call_upstream(
      "order_store",
      self.upstream_timeout,
      self.store.update_status(order_id, OrderStatus::Completed, None),
    )
    .await
  }

  pub async fn order(&self, order_id: OrderId) -> SeatlockResult<Order> {
    call_upstream("order_store", self.upstream_timeout, self.store.get(order_id))
      .await?
      .ok_or(SeatlockError::OrderNotFound { order_id })
  }

  pub async fn orders_for_user(&self, user_id: UserId) -> SeatlockResult<Vec<Order>> {
    self.list(OrderFilter::User(user_id)).await
  }

  pub async fn orders_for_event(&self, event_id: EventId) -> SeatlockResult<Vec<Order>> {
    self.list(OrderFilter::Event(event_id)).await
  }

  pub async fn all_orders(&self) -> SeatlockResult<Vec<Order>> {
    self.list(OrderFilter::All).await
  }

  async fn list(&self, filter: OrderFilter) -> SeatlockResult<Vec<Order>> {
    call_upstream("order_store", self.upstream_timeout, self.store.list(filter)).await
  }

  fn claim_cancellation(&self, order_id: OrderId) -> Option<CancelClaim<'_>> {
    if self.cancelling.lock().insert(order_id) {
      Some(CancelClaim {
        cancelling: &self.cancelling,
        order_id,
      })
    } else {
      None
    }
  }
}

/// Marks an order as being cancelled until dropped.
struct CancelClaim<'a> {
  cancelling: &'a Mutex<HashSet<OrderId>>,
  order_id: OrderId,
}

impl Drop for CancelClaim<'_> {
  fn drop(&mut self) {
    self.cancelling.lock().remove(&self.order_id);
  }
}

fn ensure_cancellable(order: &Order) -> SeatlockResult<()> {
  if order.status != OrderStatus::Confirmed {
    return Err(SeatlockError::InvalidState {
      order_id: order.id,
      status: order.status,
      action: "cancel",
    });
  }
  Ok(())
}

/// Bounds a collaborator call by `timeout`. A [`SeatlockError`] inside the
/// collaborator's error is returned as is; anything else is `UpstreamUnavailable`.
async fn call_upstream<T>(
  service: &'static str,
  timeout: Duration,
  call: impl Future<Output = anyhow::Result<T>>,
) -> SeatlockResult<T> {
  match tokio::time::timeout(timeout, call).await {
    Ok(Ok(value)) => Ok(value),
    Ok(Err(e)) => Err(match e.downcast::<SeatlockError>() {
      Ok(inner) => inner,
      Err(e) => SeatlockError::upstream(service, e),
    }),
    Err(_) => Err(SeatlockError::upstream(
      service,
      anyhow::anyhow!("no reply within {} ms", timeout.as_millis()),
    )),
  }
}

fn build_create_saga(deps: &ReservationDeps) -> Saga<OrderDraft, SeatlockError> {
  let without_lock: SkipCondition<OrderDraft> = Arc::new(|ctx| ctx.read().request.lock_id.is_none());
  let mut saga = Saga::new(
    "create_order",
    &[
      (VALIDATE_LOCK, false, Some(without_lock)),
      (LOAD_SNAPSHOT, false, None),
      (CHECK_AVAILABILITY, false, None),
      (PERSIST_PENDING_ORDER, false, None),
      (RESERVE_SEATS, false, None),
      (CONFIRM_ORDER, false, None),
      (ANNOUNCE_ORDER, true, None),
    ],
  );
  let timeout = deps.upstream_timeout;

  let (locks, clock) = (deps.locks.clone(), deps.clock.clone());
  saga.on_step(VALIDATE_LOCK, move |ctx| validate_lock(locks.clone(), clock.clone(), ctx));

  let catalog = deps.catalog.clone();
  saga.on_step(LOAD_SNAPSHOT, move |ctx| load_snapshot(catalog.clone(), timeout, ctx));

  let locks = deps.locks.clone();
  saga.on_step(CHECK_AVAILABILITY, move |ctx| check_availability(locks.clone(), ctx));

  let store = deps.store.clone();
  saga.on_step(PERSIST_PENDING_ORDER, move |ctx| persist_pending_order(store.clone(), timeout, ctx));
  let store = deps.store.clone();
  saga.compensate_step(PERSIST_PENDING_ORDER, move |ctx| remove_pending_order(store.clone(), timeout, ctx));

  let locks = deps.locks.clone();
  saga.on_step(RESERVE_SEATS, move |ctx| reserve_seats(locks.clone(), ctx));
  let ledger = deps.ledger.clone();
  saga.compensate_step(RESERVE_SEATS, move |ctx| release_seats(ledger.clone(), ctx));

  let store = deps.store.clone();
  saga.on_step(CONFIRM_ORDER, move |ctx| confirm_order(store.clone(), timeout, ctx));

  let outbox = deps.outbox.clone();
  saga.on_step(ANNOUNCE_ORDER, move |ctx| announce_order(outbox.clone(), ctx));

  saga
}

// --- create_order steps ---

async fn validate_lock(
  locks: Arc<LockRegistry>,
  clock: Arc<dyn Clock>,
  ctx: SagaContext<OrderDraft>,
) -> SeatlockResult<StepControl> {
  let request = ctx.read().request.clone();
  let Some(lock_id) = request.lock_id else {
    return Ok(StepControl::Continue);
  };
  let reject = |reason: String| SeatlockError::LockRejected { lock_id, reason };

  let lock = locks.inspect(lock_id).ok_or_else(|| reject("lock not found".into()))?;
  if lock.status != LockStatus::Active {
    return Err(reject(format!("lock is {}", lock.status)));
  }
  if lock.is_overdue(clock.now()) {
    return Err(reject("lock expired".into()));
  }
  if lock.user_id != request.user_id {
    return Err(reject("lock is owned by another user".into()));
  }
  if lock.event_id != request.event_id || lock.category_id != request.category_id {
    return Err(reject("lock is for a different category".into()));
  }
  if lock.quantity != request.quantity {
    return Err(reject(format!(
      "lock covers {} seats, order asks for {}",
      lock.quantity, request.quantity
    )));
  }
  Ok(StepControl::Continue)
}

async fn load_snapshot(
  catalog: Arc<dyn EventCatalog>,
  timeout: Duration,
  ctx: SagaContext<OrderDraft>,
) -> SeatlockResult<StepControl> {
  let (event_id, category_id) = {
    let draft = ctx.read();
    (draft.request.event_id, draft.request.category_id)
  };
  let event = call_upstream("catalog", timeout, catalog.event_by_id(event_id))
    .await?
    .ok_or(SeatlockError::EventNotFound { event_id })?;
  let category = call_upstream("catalog", timeout, catalog.ticket_categories(event_id))
    .await?
    .into_iter()
    .find(|c| c.id == category_id)
    .ok_or(SeatlockError::CategoryNotFound { category_id })?;

  let mut draft = ctx.write();
  draft.event = Some(event);
  draft.category = Some(category);
  Ok(StepControl::Continue)
}

/// Checks the live ledger, not the snapshot. A buyer's own lock counts as seats available to them.
async fn check_availability(locks: Arc<LockRegistry>, ctx: SagaContext<OrderDraft>) -> SeatlockResult<StepControl> {
  let (event_id, category_id, quantity, own_hold) = {
    let draft = ctx.read();
    let own_hold = if draft.request.lock_id.is_some() { draft.request.quantity } else { 0 };
    (draft.request.event_id, draft.request.category_id, draft.request.quantity, own_hold)
  };
  let purchasable = locks.purchasable(event_id, category_id, own_hold)?;
  if purchasable < quantity {
    return Err(SeatlockError::InsufficientSeats {
      category_id,
      requested: quantity,
      remaining: purchasable,
    });
  }
  Ok(StepControl::Continue)
}

async fn persist_pending_order(
  store: Arc<dyn OrderStore>,
  timeout: Duration,
  ctx: SagaContext<OrderDraft>,
) -> SeatlockResult<StepControl> {
  let new_order = {
    let draft = ctx.read();
    let (Some(event), Some(category)) = (&draft.event, &draft.category) else {
      return Err(SeatlockError::Internal("snapshot missing before persisting the order".into()));
    };
    NewOrder {
      user_id: draft.request.user_id,
      event_id: draft.request.event_id,
      category_id: draft.request.category_id,
      quantity: draft.request.quantity,
      unit_price_cents: category.price_cents,
      event_name: event.event_name.clone(),
      category_name: category.category_name.clone(),
      notes: draft.request.notes.clone(),
    }
  };
  let order = call_upstream("order_store", timeout, store.insert(new_order)).await?;
  info!(order_id = order.id, "Pending order persisted.");
  ctx.write().order = Some(order);
  Ok(StepControl::Continue)
}

async fn remove_pending_order(
  store: Arc<dyn OrderStore>,
  timeout: Duration,
  ctx: SagaContext<OrderDraft>,
) -> SeatlockResult<()> {
  let order_id = ctx.read().order.as_ref().map(|o| o.id);
  let Some(order_id) = order_id else {
    return Ok(());
  };
  call_upstream("order_store", timeout, store.remove(order_id)).await?;
  ctx.write().order = None;
  info!(order_id, "Pending order removed.");
  Ok(())
}

async fn reserve_seats(locks: Arc<LockRegistry>, ctx: SagaContext<OrderDraft>) -> SeatlockResult<StepControl> {
  let request = ctx.read().request.clone();
  match request.lock_id {
    Some(lock_id) => {
      locks.redeem(lock_id, request.user_id, request.quantity)?;
    }
    None => {
      locks.reserve(request.event_id, request.category_id, request.quantity)?;
    }
  }
  ctx.write().seats_reserved = true;
  Ok(StepControl::Continue)
}

async fn release_seats(ledger: Arc<SeatLedger>, ctx: SagaContext<OrderDraft>) -> SeatlockResult<()> {
  let (reserved, category_id, quantity) = {
    let draft = ctx.read();
    (draft.seats_reserved, draft.request.category_id, draft.request.quantity)
  };
  if !reserved {
    return Ok(());
  }
  ledger.release(category_id, quantity)?;
  ctx.write().seats_reserved = false;
  Ok(())
}

async fn confirm_order(
  store: Arc<dyn OrderStore>,
  timeout: Duration,
  ctx: SagaContext<OrderDraft>,
) -> SeatlockResult<StepControl> {
  let order_id = ctx
    .read()
    .order
    .as_ref()
    .map(|o| o.id)
    .ok_or_else(|| SeatlockError::Internal("no pending order to confirm".into()))?;
  let order = call_upstream(
    "order_store",
    timeout,
    store.update_status(order_id, OrderStatus::Confirmed, None),
  )
  .await?;
  ctx.write().order = Some(order);
  Ok(StepControl::Continue)
}

async fn announce_order(outbox: Outbox, ctx: SagaContext<OrderDraft>) -> SeatlockResult<StepControl> {
  let order = ctx
    .read()
    .order
    .clone()
    .ok_or_else(|| SeatlockError::Internal("no order to announce".into()))?;
  outbox.enqueue(OrderNotification::for_order(NotificationKind::OrderCompleted, &order));
  Ok(StepControl::Continue)
}

// demos/box_office/src/rush.rs

//! A ticket rush: many buyers lock seats at once, some walk away, the rest
//! check out, and a few cancel afterwards.

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use seatlock::contracts::{CancelOrder, CreateOrder, LockTickets};
use seatlock::model::{CategoryId, EventId, OrderId};
use seatlock::BoxOffice;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RushReport {
  pub buyers: usize,
  pub locks_refused: usize,
  pub abandoned: usize,
  pub orders: usize,
  pub failed_checkouts: usize,
  pub cancelled: usize,
  pub seats_sold: u32,
  pub seats_returned: u32,
  pub availability_updates: usize,
  pub reserved_at_end: u32,
  pub total_seats: u32,
}

enum BuyerOutcome {
  Refused,
  Abandoned,
  Bought { order_id: OrderId, quantity: u32 },
  Failed,
}

pub async fn run(office: Arc<BoxOffice>, config: &AppConfig, event_id: EventId, category_id: CategoryId) -> Result<RushReport> {
  let mut report = RushReport {
    buyers: config.buyers,
    total_seats: config.seats,
    ..RushReport::default()
  };

  let updates = Arc::new(AtomicUsize::new(0));
  let watcher = spawn_watcher(&office, event_id, updates.clone());

  let mut buyers = JoinSet::new();
  for index in 0..config.buyers {
    let office = office.clone();
    let quantity = (index as u32 % config.max_per_buyer) + 1;
    let abandons = config.abandon_every > 0 && index % config.abandon_every == config.abandon_every - 1;
    buyers.spawn(buyer(office, index, event_id, category_id, quantity, abandons));
  }

  let mut bought = Vec::new();
  while let Some(outcome) = buyers.join_next().await {
    match outcome? {
      BuyerOutcome::Refused => report.locks_refused += 1,
      BuyerOutcome::Abandoned => report.abandoned += 1,
      BuyerOutcome::Failed => report.failed_checkouts += 1,
      BuyerOutcome::Bought { order_id, quantity } => {
        report.orders += 1;
        report.seats_sold += quantity;
        bought.push((order_id, quantity));
      }
    }
  }
  info!(orders = report.orders, seats_sold = report.seats_sold, "Rush finished; processing cancellations.");

  bought.sort_unstable();
  if config.cancel_every > 0 {
    for (n, (order_id, quantity)) in bought.iter().enumerate() {
      if n % config.cancel_every != config.cancel_every - 1 {
        continue;
      }
      match office.cancel_order(CancelOrder { order_id: *order_id }).await {
        Ok(_) => {
          report.cancelled += 1;
          report.seats_returned += quantity;
        }
        Err(e) => warn!(order_id, error = %e, "Cancellation failed."),
      }
    }
  }

  // Let the feed catch up before counting broadcasts.
  tokio::time::sleep(std::time::Duration::from_millis(50)).await;
  watcher.abort();
  report.availability_updates = updates.load(Ordering::Relaxed);

  report.reserved_at_end = office
    .ledger()
    .category(category_id)
    .map(|c| c.reserved_seats)
    .ok_or_else(|| AppError::Internal(format!("category {} vanished", category_id)))?;

  let expected = report.seats_sold - report.seats_returned;
  if report.reserved_at_end != expected || report.reserved_at_end > report.total_seats {
    error!(
      reserved = report.reserved_at_end,
      expected,
      total = report.total_seats,
      "Ledger does not match the orders placed."
    );
    return Err(AppError::Internal("ledger and orders disagree".into()));
  }
  Ok(report)
}

async fn buyer(
  office: Arc<BoxOffice>,
  index: usize,
  event_id: EventId,
  category_id: CategoryId,
  quantity: u32,
  abandons: bool,
) -> BuyerOutcome {
  let user_id = index as u64 + 1;
  let session_id = format!("session-{}", index);

  let lock = office.lock_tickets(LockTickets {
    event_id,
    category_id,
    quantity,
    user_id,
    session_id: session_id.clone(),
  });
  if !lock.success {
    debug!(user_id, message = lock.message.as_deref().unwrap_or_default(), "Lock refused.");
    return BuyerOutcome::Refused;
  }

  // Browsing time; lets other buyers interleave.
  tokio::task::yield_now().await;

  if abandons {
    office.disconnect(user_id, &session_id);
    return BuyerOutcome::Abandoned;
  }

  match office
    .create_order(CreateOrder {
      user_id,
      event_id,
      category_id,
      quantity,
      notes: None,
      lock_id: lock.lock_id,
    })
    .await
  {
    Ok(order) => BuyerOutcome::Bought {
      order_id: order.id,
      quantity: order.quantity,
    },
    Err(e) => {
      warn!(user_id, error = %e, "Checkout failed.");
      BuyerOutcome::Failed
    }
  }
}

fn spawn_watcher(office: &BoxOffice, event_id: EventId, seen: Arc<AtomicUsize>) -> tokio::task::JoinHandle<()> {
  let (mut rx, initial) = office.join_event(event_id);
  for snapshot in &initial {
    info!(
      category_id = snapshot.category_id,
      available = snapshot.available_tickets,
      "Seat map opened."
    );
  }
  tokio::spawn(async move {
    loop {
      match rx.recv().await {
        Ok(update) => {
          seen.fetch_add(1, Ordering::Relaxed);
          debug!(
            available = update.available_tickets,
            locked = update.locked_tickets,
            "Seat map update."
          );
        }
        Err(RecvError::Lagged(skipped)) => {
          seen.fetch_add(skipped as usize, Ordering::Relaxed);
        }
        Err(RecvError::Closed) => break,
      }
    }
  })
}

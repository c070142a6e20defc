// seatlock/examples/lock_and_buy.rs

use seatlock::contracts::{CreateOrder, LockTickets};
use seatlock::model::{EventSummary, NewCategory};
use seatlock::{BoxOffice, SeatlockConfig, SeatlockError};
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), SeatlockError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Lock and Buy Example ---");

  // 1. Wire the box office with default tunables and start its background tasks.
  let office = BoxOffice::new(SeatlockConfig::default())?;
  office.start();

  // 2. Stock a tiny event.
  office.add_event(EventSummary {
    id: 1,
    event_name: "Quartet at Dusk".into(),
    venue: Some("Small Hall".into()),
    starts_at: None,
  });
  let front = office.add_category(NewCategory {
    event_id: 1,
    category_name: "Front Row".into(),
    price_cents: 7_500,
    total_seats: 4,
    description: None,
  });

  // 3. Watch availability like a seat-map client would.
  let (mut updates, initial) = office.join_event(1);
  info!("Initial availability: {:?}", initial);

  // 4. Alice locks three seats; Bob is told only one is left.
  let alice = office.lock_tickets(LockTickets {
    event_id: 1,
    category_id: front.id,
    quantity: 3,
    user_id: 100,
    session_id: "alice-phone".into(),
  });
  info!("Alice's lock: {:?}", alice);
  let bob = office.lock_tickets(LockTickets {
    event_id: 1,
    category_id: front.id,
    quantity: 2,
    user_id: 200,
    session_id: "bob-laptop".into(),
  });
  info!("Bob's lock: {:?}", bob);

  if let Ok(Ok(update)) = tokio::time::timeout(Duration::from_secs(1), updates.recv()).await {
    info!(
      "Seat map now shows {} free, {} locked",
      update.available_tickets, update.locked_tickets
    );
  }

  // 5. Alice checks out with her lock.
  let order = office
    .create_order(CreateOrder {
      user_id: 100,
      event_id: 1,
      category_id: front.id,
      quantity: 3,
      notes: None,
      lock_id: alice.lock_id,
    })
    .await?;
  info!(
    "Order {} is {}: {} x {} cents = {} cents",
    order.id, order.status, order.quantity, order.unit_price_cents, order.total_price_cents
  );

  // 6. Stop background tasks and drain notifications.
  office.shutdown().await;
  info!("Remaining categories: {:?}", office.ticket_categories(1));
  Ok(())
}

// seatlock/examples/saga_compensation.rs

use seatlock::{Saga, SagaContext, SagaOutcome, SeatlockError, StepControl};
use tracing::{info, warn};

// 1. Define a custom application error type
#[derive(Debug, thiserror::Error)]
enum TripError {
  #[error("Booking refused: {0}")]
  Refused(String),

  #[error("Saga engine error: {0}")]
  Engine(#[from] SeatlockError),
}

// 2. Define the saga's working data
#[derive(Clone, Debug, Default)]
struct Trip {
  booked: Vec<&'static str>,
  cancelled: Vec<&'static str>,
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Saga Compensation Example ---");

  // 3. Define the steps; "send_postcard" is optional, so its failure is tolerated.
  let mut saga = Saga::<Trip, TripError>::new(
    "book_trip",
    &[
      ("book_flight", false, None),
      ("book_hotel", false, None),
      ("send_postcard", true, None),
      ("book_concert", false, None),
    ],
  );

  // 4. Register forward handlers
  saga.on_step("book_flight", |ctx: SagaContext<Trip>| async move {
    ctx.write().booked.push("flight");
    Ok::<_, TripError>(StepControl::Continue)
  });
  saga.on_step("book_hotel", |ctx: SagaContext<Trip>| async move {
    ctx.write().booked.push("hotel");
    Ok::<_, TripError>(StepControl::Continue)
  });
  saga.on_step("send_postcard", |_ctx: SagaContext<Trip>| async move {
    Err::<StepControl, _>(TripError::Refused("post office closed".into()))
  });
  saga.on_step("book_concert", |_ctx: SagaContext<Trip>| async move {
    Err::<StepControl, _>(TripError::Refused("concert sold out".into()))
  });

  // 5. Register compensations; they run in reverse for every completed step.
  saga.compensate_step("book_flight", |ctx: SagaContext<Trip>| async move {
    ctx.write().cancelled.push("flight");
    Ok::<_, TripError>(())
  });
  saga.compensate_step("book_hotel", |ctx: SagaContext<Trip>| async move {
    ctx.write().cancelled.push("hotel");
    Ok::<_, TripError>(())
  });

  // 6. Run and inspect
  let ctx = SagaContext::new(Trip::default());
  match saga.run(ctx.clone()).await {
    Ok(SagaOutcome::Completed) => info!("Trip booked."),
    Ok(SagaOutcome::Stopped) => info!("Trip booking stopped early."),
    Err(e) => warn!("Trip booking failed: {}", e),
  }

  let trip = ctx.read();
  info!("Booked: {:?}", trip.booked);
  info!("Cancelled (reverse order): {:?}", trip.cancelled);
  assert_eq!(trip.cancelled, vec!["hotel", "flight"]);
}

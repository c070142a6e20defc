// demos/box_office/src/main.rs

mod config;
mod errors;
mod rush;

use crate::config::AppConfig;
use crate::errors::{AppError, Result as AppResult};
use seatlock::model::{EventSummary, NewCategory};
use seatlock::BoxOffice;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const EVENT_ID: u64 = 1;

#[tokio::main]
async fn main() -> AppResult<()> {
  let app_config = AppConfig::from_env()?;

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  if app_config.log_json {
    tracing_subscriber::fmt().json().with_env_filter(filter).init();
  } else {
    tracing_subscriber::fmt().with_env_filter(filter).init();
  }
  tracing::info!(config = ?app_config, "Application configuration loaded successfully.");

  let office = Arc::new(BoxOffice::new(app_config.seatlock.clone())?);
  office.start();

  office.add_event(EventSummary {
    id: EVENT_ID,
    event_name: "Opening Night".into(),
    venue: Some("Main Stage".into()),
    starts_at: None,
  });
  let category = office.add_category(NewCategory {
    event_id: EVENT_ID,
    category_name: "General Admission".into(),
    price_cents: 5_500,
    total_seats: app_config.seats,
    description: Some("Standing room".into()),
  });

  let outcome = rush::run(office.clone(), &app_config, EVENT_ID, category.id).await;
  office.shutdown().await;
  let report = outcome?;

  tracing::info!(stats = ?office.lock_stats(), "Lock registry after the rush.");
  let rendered = serde_json::to_string_pretty(&report).map_err(|e| AppError::Internal(e.to_string()))?;
  println!("{}", rendered);
  Ok(())
}

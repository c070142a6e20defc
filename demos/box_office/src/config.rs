// demos/box_office/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use seatlock::SeatlockConfig;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub seatlock: SeatlockConfig,

  /// Concurrent buyers in the rush.
  pub buyers: usize,
  pub seats: u32,
  pub max_per_buyer: u32,
  /// Every n-th buyer walks away from their lock instead of checking out. 0 disables.
  pub abandon_every: usize,
  /// Every n-th successful buyer cancels afterwards. 0 disables.
  pub cancel_every: usize,

  pub log_json: bool,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let seatlock = SeatlockConfig::from_env()?;

    let get_env = |var_name: &str, default: &str| env::var(var_name).unwrap_or_else(|_| default.to_string());
    let parse_usize = |var_name: &str, default: &str| {
      get_env(var_name, default)
        .trim()
        .parse::<usize>()
        .map_err(|e| AppError::Config(format!("Invalid {}: {}", var_name, e)))
    };

    let buyers = parse_usize("DEMO_BUYERS", "200")?;
    let seats = get_env("DEMO_SEATS", "120")
      .trim()
      .parse::<u32>()
      .map_err(|e| AppError::Config(format!("Invalid DEMO_SEATS: {}", e)))?;
    let max_per_buyer = get_env("DEMO_MAX_PER_BUYER", "4")
      .trim()
      .parse::<u32>()
      .map_err(|e| AppError::Config(format!("Invalid DEMO_MAX_PER_BUYER: {}", e)))?;
    if max_per_buyer == 0 {
      return Err(AppError::Config("DEMO_MAX_PER_BUYER must be at least 1".into()));
    }
    let abandon_every = parse_usize("DEMO_ABANDON_EVERY", "5")?;
    let cancel_every = parse_usize("DEMO_CANCEL_EVERY", "9")?;

    let log_json = get_env("LOG_FORMAT", "pretty").eq_ignore_ascii_case("json");

    Ok(Self {
      seatlock,
      buyers,
      seats,
      max_per_buyer,
      abandon_every,
      cancel_every,
      log_json,
    })
  }
}

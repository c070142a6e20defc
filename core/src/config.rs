// seatlock/src/config.rs

use crate::error::{SeatlockError, SeatlockResult};
use crate::orders::outbox::RetryPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for `lock_ttl` and `purge_grace`. Keeps every deadline computed from them representable.
pub const MAX_LOCK_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Tunables for the lock registry, the saga and the notifier.
#[derive(Debug, Clone)]
pub struct SeatlockConfig {
  /// How long a soft lock stays active after it is granted.
  pub lock_ttl: Duration,
  /// Period of the expiry sweep.
  pub sweep_interval: Duration,
  /// How long closed locks stay in the primary map so late duplicate releases stay harmless.
  pub purge_grace: Duration,
  /// Budget for a single catalog or order-store call made by the saga.
  pub upstream_timeout: Duration,
  /// Per-event buffer of availability snapshots a slow subscriber may lag behind.
  pub broadcast_capacity: usize,
  pub notify_retry: RetryPolicy,
}

impl Default for SeatlockConfig {
  fn default() -> Self {
    Self {
      lock_ttl: Duration::from_secs(5 * 60),
      sweep_interval: Duration::from_secs(60),
      purge_grace: Duration::from_secs(30),
      upstream_timeout: Duration::from_millis(5_000),
      broadcast_capacity: 64,
      notify_retry: RetryPolicy::default(),
    }
  }
}

impl SeatlockConfig {
  /// Reads `SEATLOCK_*` variables from the process environment, falling back to defaults.
  pub fn from_env() -> SeatlockResult<Self> {
    Self::from_lookup(|key| env::var(key).ok())
  }

  /// Same as [`SeatlockConfig::from_env`] but with an explicit variable source.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SeatlockResult<Self> {
    let defaults = Self::default();

    let get_parsed = |var_name: &str| -> SeatlockResult<Option<u64>> { parse_var::<u64>(&lookup, var_name) };

    let lock_ttl = get_parsed("SEATLOCK_LOCK_TTL_SECS")?
      .map(Duration::from_secs)
      .unwrap_or(defaults.lock_ttl);
    let sweep_interval = get_parsed("SEATLOCK_SWEEP_INTERVAL_SECS")?
      .map(Duration::from_secs)
      .unwrap_or(defaults.sweep_interval);
    let purge_grace = get_parsed("SEATLOCK_PURGE_GRACE_SECS")?
      .map(Duration::from_secs)
      .unwrap_or(defaults.purge_grace);
    let upstream_timeout = get_parsed("SEATLOCK_UPSTREAM_TIMEOUT_MS")?
      .map(Duration::from_millis)
      .unwrap_or(defaults.upstream_timeout);
    let broadcast_capacity = parse_var::<usize>(&lookup, "SEATLOCK_BROADCAST_CAPACITY")?
      .unwrap_or(defaults.broadcast_capacity);

    let mut notify_retry = defaults.notify_retry;
    if let Some(attempts) = parse_var::<u32>(&lookup, "SEATLOCK_NOTIFY_MAX_ATTEMPTS")? {
      notify_retry.max_attempts = attempts;
    }
    if let Some(ms) = get_parsed("SEATLOCK_NOTIFY_INITIAL_DELAY_MS")? {
      notify_retry.initial_delay = Duration::from_millis(ms);
    }

    let config = Self {
      lock_ttl,
      sweep_interval,
      purge_grace,
      upstream_timeout,
      broadcast_capacity,
      notify_retry,
    };
    config.validate()?;
    tracing::debug!(?config, "Seatlock configuration loaded.");
    Ok(config)
  }

  pub fn validate(&self) -> SeatlockResult<()> {
    if self.lock_ttl.is_zero() {
      return Err(SeatlockError::Config("lock_ttl must be greater than zero".into()));
    }
    if self.lock_ttl > MAX_LOCK_WINDOW {
      return Err(SeatlockError::Config(format!(
        "lock_ttl must not exceed {}s",
        MAX_LOCK_WINDOW.as_secs()
      )));
    }
    if self.purge_grace > MAX_LOCK_WINDOW {
      return Err(SeatlockError::Config(format!(
        "purge_grace must not exceed {}s",
        MAX_LOCK_WINDOW.as_secs()
      )));
    }
    if self.sweep_interval.is_zero() {
      return Err(SeatlockError::Config("sweep_interval must be greater than zero".into()));
    }
    if self.broadcast_capacity == 0 {
      return Err(SeatlockError::Config("broadcast_capacity must be greater than zero".into()));
    }
    if self.notify_retry.max_attempts == 0 {
      return Err(SeatlockError::Config("notify_retry.max_attempts must be at least 1".into()));
    }
    Ok(())
  }

  pub fn lock_ttl_chrono(&self) -> SeatlockResult<chrono::Duration> {
    to_chrono("lock_ttl", self.lock_ttl)
  }

  pub fn purge_grace_chrono(&self) -> SeatlockResult<chrono::Duration> {
    to_chrono("purge_grace", self.purge_grace)
  }
}

fn to_chrono(name: &str, value: Duration) -> SeatlockResult<chrono::Duration> {
  chrono::Duration::from_std(value).map_err(|e| SeatlockError::Config(format!("{} is out of range: {}", name, e)))
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, var_name: &str) -> SeatlockResult<Option<T>>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match lookup(var_name) {
    None => Ok(None),
    Some(raw) => raw
      .trim()
      .parse::<T>()
      .map(Some)
      .map_err(|e| SeatlockError::Config(format!("Invalid {}='{}': {}", var_name, raw, e))),
  }
}

// seatlock/src/locks/maintenance.rs

//! Background upkeep of the lock registry: the expiry sweep and the purge of closed locks.

use super::registry::LockRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct LockMaintenance {
  registry: Arc<LockRegistry>,
  sweep_interval: Duration,
  purge_interval: Duration,
  shutdown: CancellationToken,
}

impl LockMaintenance {
  /// The purge runs as often as the grace period, with the sweep interval as a floor.
  pub fn new(registry: Arc<LockRegistry>, sweep_interval: Duration, shutdown: CancellationToken) -> Self {
    let grace = registry.purge_grace().to_std().unwrap_or(sweep_interval);
    let purge_interval = grace.max(Duration::from_secs(1)).min(sweep_interval.max(Duration::from_secs(1)));
    Self {
      registry,
      sweep_interval,
      purge_interval,
      shutdown,
    }
  }

  pub fn spawn(self) -> JoinHandle<()> {
    tokio::spawn(self.run())
  }

  /// Ticks until the shutdown token is cancelled. The first tick of each timer
  /// waits a full period.
  pub async fn run(self) {
    info!(
      sweep_secs = self.sweep_interval.as_secs_f64(),
      purge_secs = self.purge_interval.as_secs_f64(),
      "Lock maintenance started."
    );
    let mut sweep = interval_at(Instant::now() + self.sweep_interval, self.sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut purge = interval_at(Instant::now() + self.purge_interval, self.purge_interval);
    purge.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = self.shutdown.cancelled() => break,
        _ = sweep.tick() => {
          let expired = self.registry.sweep_expired();
          debug!(expired, "Sweep tick.");
        }
        _ = purge.tick() => {
          self.registry.purge_closed();
        }
      }
    }
    info!("Lock maintenance stopped.");
  }
}

// src/lib.rs

//! Seatlock: oversell-proof seat reservation for event ticketing.
//!
//! The crate is built from four collaborating pieces:
//!  - [`SeatLedger`]: authoritative reserved/held counts per ticket category,
//!    each category behind its own critical section.
//!  - [`LockRegistry`]: short-lived soft locks that give a buyer a checkout
//!    window. Locked seats are mirrored into the ledger so plain purchases
//!    cannot take them.
//!  - [`ReservationSaga`]: order creation as a sequence of compensable steps
//!    on top of the generic [`Saga`] engine, plus cancellation.
//!  - [`AvailabilityNotifier`]: per-event broadcast of availability snapshots
//!    after every ledger or lock change.
//!
//! [`BoxOffice`] wires them together behind the message contracts in
//! [`contracts`] and owns the background tasks.

pub mod box_office;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod contracts;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod model;
pub mod notifier;
pub mod orders;
pub mod saga;

// --- Re-exports for the Public API ---

pub use crate::box_office::BoxOffice;
pub use crate::catalog::{EventCatalog, InMemoryCatalog};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::SeatlockConfig;
pub use crate::error::{SeatlockError, SeatlockResult};
pub use crate::ledger::SeatLedger;
pub use crate::locks::{LockMaintenance, LockRegistry, LockStats};
pub use crate::notifier::{AvailabilityNotifier, AvailabilitySignal, AvailabilityUpdate, ChangeFeed};
pub use crate::orders::{
  InMemoryOrderStore, NotificationKind, OrderNotification, OrderNotifier, OrderStore, Outbox, ReservationDeps,
  ReservationSaga, RetryPolicy,
};
pub use crate::saga::{Saga, SagaContext, SagaOutcome, SkipCondition, StepControl, StepDef};

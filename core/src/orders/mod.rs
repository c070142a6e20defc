// seatlock/src/orders/mod.rs

pub mod outbox;
pub mod reservation;
pub mod store;

pub use outbox::{NotificationKind, OrderNotification, OrderNotifier, Outbox, RetryPolicy};
pub use reservation::{OrderDraft, ReservationDeps, ReservationSaga};
pub use store::{InMemoryOrderStore, OrderFilter, OrderStore};

// seatlock/src/locks/mod.rs

mod book;
pub mod maintenance;
pub mod registry;

pub use book::LockStats;
pub use maintenance::LockMaintenance;
pub use registry::LockRegistry;

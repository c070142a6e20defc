// seatlock/src/saga/mod.rs

//! A small async step engine with compensation.
//!
//! A [`Saga`] is an ordered list of named steps. Each step has forward
//! handlers and at most one compensation. When a non-optional step fails,
//! the compensations of the steps that already completed run in reverse order
//! and the step's error is returned.

pub mod context;
pub mod control;
pub mod definition;
mod execution;
pub mod step;

pub use context::SagaContext;
pub use control::{SagaOutcome, StepControl};
pub use definition::Saga;
pub use step::{SkipCondition, StepDef};

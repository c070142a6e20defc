// seatlock/src/saga/control.rs

/// Returned by a step handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
  Continue,
  /// Halt the saga without error. Steps that already ran are kept; nothing is compensated.
  Stop,
}

/// Outcome of a saga run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaOutcome {
  /// Every non-skipped step ran.
  Completed,
  /// A handler returned [`StepControl::Stop`].
  Stopped,
}

// seatlock/src/saga/execution.rs

//! `Saga::run()`: forward execution and reverse-order compensation.

use super::context::SagaContext;
use super::control::{SagaOutcome, StepControl};
use super::definition::Saga;
use crate::error::SeatlockError;
use tracing::{event, info_span, instrument, Instrument, Level};

impl<TData, Err> Saga<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<SeatlockError> + Send + Sync + 'static,
{
  /// Runs every step in order against `ctx`.
  ///
  /// A failing non-optional step triggers the compensations of the steps
  /// completed before it, newest first, and its error is returned. A failing
  /// compensation is logged under `seatlock::integrity` and the remaining
  /// compensations still run.
  #[instrument(
    name = "Saga::run",
    skip_all,
    fields(saga = %self.name, num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx: SagaContext<TData>) -> Result<SagaOutcome, Err> {
    event!(Level::DEBUG, "Saga execution starting.");
    let mut completed: Vec<&str> = Vec::with_capacity(self.steps.len());

    'steps: for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();

      if let Some(skip_cond_fn) = &step_def.skip_if {
        if skip_cond_fn(ctx.clone()) {
          event!(Level::DEBUG, step_name, "Step skipped due to 'skip_if' condition.");
          continue;
        }
      }

      let handlers = match self.on.get(step_name) {
        Some(handlers) if !handlers.is_empty() => handlers,
        _ if step_def.optional => {
          event!(Level::DEBUG, step_name, "Optional step has no handlers, skipping.");
          continue;
        }
        _ => {
          event!(Level::ERROR, step_name, "Non-optional step has no handlers.");
          self.compensate(&completed, &ctx).await;
          return Err(Err::from(SeatlockError::HandlerMissing {
            step_name: step_def.name.clone(),
          }));
        }
      };

      for (handler_idx, handler_fn) in handlers.iter().enumerate() {
        let span = info_span!(
          "saga_step",
          step_name,
          step_index = step_idx,
          handler_index = handler_idx,
          optional = step_def.optional
        );
        match handler_fn(ctx.clone()).instrument(span).await {
          Ok(StepControl::Continue) => {}
          Ok(StepControl::Stop) => {
            event!(Level::INFO, step_name, "Saga stopped by a handler.");
            return Ok(SagaOutcome::Stopped);
          }
          Err(e) if step_def.optional => {
            event!(Level::WARN, step_name, error = %e, "Optional step failed; continuing.");
            continue 'steps;
          }
          Err(e) => {
            event!(Level::WARN, step_name, error = %e, "Step failed; compensating.");
            self.compensate(&completed, &ctx).await;
            return Err(e);
          }
        }
      }
      completed.push(step_name);
    }

    event!(Level::DEBUG, "Saga execution completed.");
    Ok(SagaOutcome::Completed)
  }

  async fn compensate(&self, completed: &[&str], ctx: &SagaContext<TData>) {
    for step_name in completed.iter().rev() {
      let Some(compensation) = self.compensations.get(*step_name) else {
        continue;
      };
      let span = info_span!("saga_compensation", step_name = *step_name);
      match compensation(ctx.clone()).instrument(span).await {
        Ok(()) => event!(Level::INFO, step_name = *step_name, "Step compensated."),
        Err(e) => event!(
          target: "seatlock::integrity",
          Level::ERROR,
          saga = %self.name,
          step_name = *step_name,
          error = %e,
          "Compensation failed; state needs manual repair."
        ),
      }
    }
  }
}

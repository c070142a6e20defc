// seatlock/src/saga/definition.rs

//! `Saga<TData, Err>` construction and handler registration.

use super::context::SagaContext;
use super::control::StepControl;
use super::step::{SkipCondition, StepDef};
use crate::error::SeatlockError;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tracing::{event, Level};

pub type StepHandler<TData, Err> =
  Box<dyn Fn(SagaContext<TData>) -> Pin<Box<dyn Future<Output = Result<StepControl, Err>> + Send>> + Send + Sync>;

pub type CompensationHandler<TData, Err> =
  Box<dyn Fn(SagaContext<TData>) -> Pin<Box<dyn Future<Output = Result<(), Err>> + Send>> + Send + Sync>;

/// `Err` must absorb [`SeatlockError`] so engine errors such as `HandlerMissing` can be returned.
pub struct Saga<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<SeatlockError> + Send + Sync + 'static,
{
  pub(crate) name: String,
  pub(crate) steps: Vec<StepDef<TData>>,
  pub(crate) on: HashMap<String, Vec<StepHandler<TData, Err>>>,
  pub(crate) compensations: HashMap<String, CompensationHandler<TData, Err>>,
}

impl<TData, Err> Saga<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<SeatlockError> + Send + Sync + 'static,
{
  pub fn new(name: impl Into<String>, step_defs: &[(&str, bool, Option<SkipCondition<TData>>)]) -> Self {
    let steps = step_defs
      .iter()
      .map(|(name, optional, skip_cond_opt)| StepDef {
        name: (*name).to_string(),
        optional: *optional,
        skip_if: skip_cond_opt.clone(),
      })
      .collect();

    Self {
      name: name.into(),
      steps,
      on: HashMap::new(),
      compensations: HashMap::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  /// Panics on an unknown step name: that is a wiring bug, not a runtime condition.
  pub(crate) fn ensure_step_exists(&self, step_name: &str) {
    if !self.steps.iter().any(|s| s.name == step_name) {
      panic!(
        "Saga setup error: step '{}' not found in saga '{}'.",
        step_name, self.name
      );
    }
  }

  pub fn set_optional(&mut self, step_name: &str, optional: bool) {
    self.ensure_step_exists(step_name);
    if let Some(step) = self.steps.iter_mut().find(|s| s.name == step_name) {
      step.optional = optional;
    }
  }

  /// Registers a forward handler. Several handlers on one step run in registration order.
  pub fn on_step<F, UserProvidedErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(SagaContext<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<StepControl, UserProvidedErr>> + Send + 'static,
    UserProvidedErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    let final_handler: StepHandler<TData, Err> = Box::new(move |ctx| {
      let user_fut = handler_fn(ctx);
      Box::pin(async move { user_fut.await.map_err(Into::into) })
    });
    self.on.entry(step_name.to_string()).or_default().push(final_handler);
  }

  /// Registers the undo action for a step. Runs only if the step completed and a later
  /// non-optional step failed. Replaces any previous compensation of the step.
  pub fn compensate_step<F, UserProvidedErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(SagaContext<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<(), UserProvidedErr>> + Send + 'static,
    UserProvidedErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    let final_handler: CompensationHandler<TData, Err> = Box::new(move |ctx| {
      let user_fut = handler_fn(ctx);
      Box::pin(async move { user_fut.await.map_err(Into::into) })
    });
    if self.compensations.insert(step_name.to_string(), final_handler).is_some() {
      event!(Level::WARN, saga = %self.name, step_name, "Compensation replaced.");
    }
  }
}

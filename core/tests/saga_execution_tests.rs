// tests/saga_execution_tests.rs
mod common;

use common::*;
use seatlock::{Saga, SagaContext, SagaOutcome, SeatlockError, SkipCondition, StepControl};
use serial_test::serial;
use std::sync::Arc;

fn three_steps() -> Saga<TestContext, TestError> {
  Saga::new(
    "test",
    &[("step1", false, None), ("step2", false, None), ("step3", false, None)],
  )
}

#[tokio::test]
#[serial]
async fn test_saga_runs_steps_in_order() {
  setup_tracing();
  let mut saga = three_steps();
  saga.on_step("step1", create_recording_handler("step1"));
  saga.on_step("step2", create_recording_handler("step2"));
  saga.on_step("step3", create_recording_handler("step3"));

  let ctx = SagaContext::new(TestContext::default());
  let result = saga.run(ctx.clone()).await;

  assert_eq!(result, Ok(SagaOutcome::Completed));
  let guard = ctx.read();
  assert_eq!(guard.steps_executed, vec!["step1", "step2", "step3"]);
  assert!(guard.compensated.is_empty());
}

#[tokio::test]
#[serial]
async fn test_failure_compensates_completed_steps_in_reverse() {
  setup_tracing();
  let mut saga = three_steps();
  saga.on_step("step1", create_recording_handler("step1"));
  saga.on_step("step2", create_recording_handler("step2"));
  saga.on_step("step3", create_failing_handler("step3", "boom"));
  saga.compensate_step("step1", create_compensation("step1"));
  saga.compensate_step("step2", create_compensation("step2"));
  saga.compensate_step("step3", create_compensation("step3"));

  let ctx = SagaContext::new(TestContext::default());
  let result = saga.run(ctx.clone()).await;

  assert_eq!(result, Err(TestError::Step("boom".into())));
  let guard = ctx.read();
  assert_eq!(guard.steps_executed, vec!["step1", "step2", "step3"]);
  // The failing step itself is not compensated.
  assert_eq!(guard.compensated, vec!["step2", "step1"]);
}

#[tokio::test]
#[serial]
async fn test_failing_compensation_does_not_stop_the_others() {
  setup_tracing();
  let mut saga = three_steps();
  saga.on_step("step1", create_recording_handler("step1"));
  saga.on_step("step2", create_recording_handler("step2"));
  saga.on_step("step3", create_failing_handler("step3", "late failure"));
  saga.compensate_step("step1", create_compensation("step1"));
  saga.compensate_step("step2", |_ctx: SagaContext<TestContext>| async move {
    Err::<(), TestError>(TestError::Step("undo failed".into()))
  });

  let ctx = SagaContext::new(TestContext::default());
  let result = saga.run(ctx.clone()).await;

  assert_eq!(result, Err(TestError::Step("late failure".into())));
  assert_eq!(ctx.read().compensated, vec!["step1"]);
}

#[tokio::test]
#[serial]
async fn test_saga_stops_without_compensating() {
  setup_tracing();
  let mut saga = three_steps();
  saga.on_step("step1", create_recording_handler("step1"));
  saga.on_step("step2", create_recording_handler("step2"));
  saga.on_step("step3", create_recording_handler("step3"));
  saga.compensate_step("step1", create_compensation("step1"));

  let ctx = SagaContext::new(TestContext {
    should_stop_at: Some("step2".into()),
    ..TestContext::default()
  });
  let result = saga.run(ctx.clone()).await;

  assert_eq!(result, Ok(SagaOutcome::Stopped));
  let guard = ctx.read();
  assert_eq!(guard.steps_executed, vec!["step1", "step2"]);
  assert!(guard.compensated.is_empty());
}

#[tokio::test]
#[serial]
async fn test_optional_step_failure_is_best_effort() {
  setup_tracing();
  let mut saga = Saga::<TestContext, TestError>::new(
    "test",
    &[("work", false, None), ("announce", true, None), ("finish", false, None)],
  );
  saga.on_step("work", create_recording_handler("work"));
  saga.on_step("announce", create_failing_handler("announce", "bus down"));
  saga.on_step("finish", create_recording_handler("finish"));
  saga.compensate_step("work", create_compensation("work"));

  let ctx = SagaContext::new(TestContext::default());
  let result = saga.run(ctx.clone()).await;

  assert_eq!(result, Ok(SagaOutcome::Completed));
  let guard = ctx.read();
  assert_eq!(guard.steps_executed, vec!["work", "announce", "finish"]);
  assert!(guard.compensated.is_empty());
}

#[tokio::test]
#[serial]
async fn test_skip_condition_bypasses_step() {
  setup_tracing();
  let skip_always: SkipCondition<TestContext> = Arc::new(|_ctx| true);
  let mut saga = Saga::<TestContext, TestError>::new(
    "test",
    &[("first", false, None), ("skipped", false, Some(skip_always))],
  );
  saga.on_step("first", create_recording_handler("first"));
  // No handler for "skipped": a skipped step is never checked for handlers.

  let ctx = SagaContext::new(TestContext::default());
  assert_eq!(saga.run(ctx.clone()).await, Ok(SagaOutcome::Completed));
  assert_eq!(ctx.read().steps_executed, vec!["first"]);
}

#[tokio::test]
#[serial]
async fn test_missing_handler_compensates_and_reports() {
  setup_tracing();
  let mut saga = Saga::<TestContext, TestError>::new("test", &[("done", false, None), ("missing", false, None)]);
  saga.on_step("done", create_recording_handler("done"));
  saga.compensate_step("done", create_compensation("done"));

  let ctx = SagaContext::new(TestContext::default());
  match saga.run(ctx.clone()).await {
    Err(TestError::Seatlock(s)) => {
      assert!(s.contains("HandlerMissing"));
      assert!(s.contains("missing"));
    }
    other => panic!("Expected HandlerMissing, got {:?}", other),
  }
  assert_eq!(ctx.read().compensated, vec!["done"]);
}

#[tokio::test]
#[serial]
async fn test_saga_with_seatlock_error_type() {
  setup_tracing();
  let mut saga = Saga::<TestContext, SeatlockError>::new("native", &[("task", false, None)]);
  saga.on_step("task", |_ctx: SagaContext<TestContext>| async move {
    Err::<StepControl, SeatlockError>(SeatlockError::Internal("intentional".into()))
  });

  let result = saga.run(SagaContext::new(TestContext::default())).await;
  match result {
    Err(SeatlockError::Internal(s)) => assert_eq!(s, "intentional"),
    other => panic!("Expected SeatlockError::Internal, got {:?}", other),
  }
}

#[test]
#[should_panic(expected = "step 'nope' not found")]
fn test_registering_unknown_step_panics() {
  let mut saga = three_steps();
  saga.on_step("nope", create_recording_handler("nope"));
}

#[test]
fn test_step_names_follow_definition_order() {
  let mut saga = three_steps();
  saga.set_optional("step2", true);
  assert_eq!(saga.step_names(), vec!["step1", "step2", "step3"]);
  assert_eq!(saga.name(), "test");
}

//! Durable saga orchestrator.
//!
//! A saga instance persists its progress as events on its own stream, so a
//! crashed run can be resumed: rehydration folds the stream back into the
//! instance state and forward execution continues after the last completed
//! step. Saga ids are deterministic (UUIDv5 of saga type + business key);
//! starting the same saga twice attaches to the existing instance instead of
//! provisioning twice.
//!
//! Failure handling: transient activity errors are retried per the step's
//! policy; a fatal error (or retry exhaustion) flips the saga into
//! compensation, which undoes completed steps in reverse order, best-effort.
//! Non-fatal sub-failures inside a fanned-out step are collected as warnings
//! and never trigger compensation.

pub mod provisioning;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};

use orgflow_core::{ExpectedVersion, SagaId};
use orgflow_events::{
    ActivityError, DomainEvent, EventMetadata, NewEvent, RetryPolicy, SagaStatus, SagaStatusView,
    SagaWarning, SpanStatus, TraceContext,
};

use crate::event_store::{EventStore, EventStoreError};

pub const SAGA_INITIATED: &str = "saga.initiated";
pub const SAGA_STEP_COMPLETED: &str = "saga.step_completed";
pub const SAGA_WARNING_RECORDED: &str = "saga.warning_recorded";
pub const SAGA_STEP_FAILED: &str = "saga.step_failed";
pub const SAGA_COMPENSATION_STARTED: &str = "saga.compensation_started";
pub const SAGA_STEP_COMPENSATED: &str = "saga.step_compensated";
pub const SAGA_COMPLETED: &str = "saga.completed";
pub const SAGA_FAILED: &str = "saga.failed";
pub const SAGA_CANCEL_REQUESTED: &str = "saga.cancel_requested";
pub const SAGA_CANCELLED: &str = "saga.cancelled";

#[derive(Debug, Error)]
pub enum SagaError {
    #[error("saga {0} not found")]
    NotFound(SagaId),

    #[error("saga stream corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

/// Payload of `saga.initiated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaInitiated {
    pub saga_id: SagaId,
    pub saga_type: String,
    pub business_key: String,
    pub input: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCompleted {
    pub step: String,
    pub output: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningRecorded {
    pub warning: SagaWarning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFailed {
    pub step: String,
    pub error: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCompensated {
    pub step: String,
    /// `None` when compensation succeeded; the error text otherwise
    /// (compensation is best-effort and never blocks the remaining stack).
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaFailed {
    pub step: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequested {
    pub reason: String,
}

/// What a step produced: a JSON output (available to later steps and to
/// compensation) and any non-fatal warnings collected along the way.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub output: JsonValue,
    pub warnings: Vec<SagaWarning>,
}

impl StepOutcome {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_output(output: JsonValue) -> Self {
        Self {
            output,
            warnings: Vec::new(),
        }
    }
}

/// Read-only view a step activity gets of its saga instance.
pub struct StepContext<'a> {
    pub saga_id: SagaId,
    pub input: &'a JsonValue,
    pub trace: &'a TraceContext,
    /// Outputs of previously completed steps, by step name.
    pub outputs: &'a HashMap<String, JsonValue>,
}

impl StepContext<'_> {
    pub fn output_of(&self, step: &str) -> Option<&JsonValue> {
        self.outputs.get(step)
    }
}

type StepFn = Box<dyn Fn(&StepContext) -> Result<StepOutcome, ActivityError> + Send + Sync>;
type CompensateFn = Box<dyn Fn(&StepContext) -> Result<(), ActivityError> + Send + Sync>;

/// One forward step plus its optional compensation.
pub struct SagaStep {
    name: &'static str,
    retry: RetryPolicy,
    timeout: Option<Duration>,
    run: StepFn,
    compensate: Option<CompensateFn>,
}

impl SagaStep {
    pub fn new(
        name: &'static str,
        run: impl Fn(&StepContext) -> Result<StepOutcome, ActivityError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            retry: RetryPolicy::no_retry(),
            timeout: None,
            run: Box::new(run),
            compensate: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Cooperative per-step timeout: checked after each attempt, since
    /// activities are synchronous and cannot be interrupted mid-call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Compensations must tolerate "nothing to undo": they can run after a
    /// partially applied forward step.
    pub fn with_compensation(
        mut self,
        compensate: impl Fn(&StepContext) -> Result<(), ActivityError> + Send + Sync + 'static,
    ) -> Self {
        self.compensate = Some(Box::new(compensate));
        self
    }
}

/// Ordered steps of one saga type.
pub struct SagaDefinition {
    saga_type: &'static str,
    stream_type: &'static str,
    steps: Vec<SagaStep>,
}

impl SagaDefinition {
    pub fn new(saga_type: &'static str, stream_type: &'static str) -> Self {
        Self {
            saga_type,
            stream_type,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: SagaStep) -> Self {
        self.steps.push(step);
        self
    }
}

/// Sleeps between retry attempts. Tests swap in a recorder that returns
/// immediately, keeping the retry schedule observable without real waits.
pub trait BackoffTimer: Send + Sync {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl BackoffTimer for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Orchestrator limits beyond per-step retry policies.
#[derive(Clone)]
pub struct SagaConfig {
    /// Budget for one `run` call, counting backoff waits (virtual when the
    /// timer is a no-op) plus attempt wall time. Exceeding it is fatal.
    pub deadline: Option<Duration>,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            deadline: Some(Duration::from_secs(30 * 60)),
        }
    }
}

/// Instance state rehydrated from the saga's stream.
struct SagaInstance {
    saga_id: SagaId,
    status: SagaStatus,
    input: JsonValue,
    trace: TraceContext,
    completed: Vec<String>,
    outputs: HashMap<String, JsonValue>,
    warnings: Vec<SagaWarning>,
    fatal_error: Option<String>,
    failed_step: Option<String>,
    cancel_requested: Option<String>,
    current_step: Option<String>,
}

impl SagaInstance {
    fn view(&self) -> SagaStatusView {
        SagaStatusView {
            saga_id: self.saga_id,
            status: self.status,
            current_step: self.current_step.clone(),
            completed_steps: self.completed.clone(),
            warnings: self.warnings.clone(),
            fatal_error: self.fatal_error.clone(),
            failed_step: self.failed_step.clone(),
        }
    }
}

pub struct SagaOrchestrator<S> {
    store: S,
    definition: SagaDefinition,
    timer: Box<dyn BackoffTimer>,
    config: SagaConfig,
}

impl<S: EventStore> SagaOrchestrator<S> {
    pub fn new(store: S, definition: SagaDefinition) -> Self {
        Self {
            store,
            definition,
            timer: Box::new(ThreadSleeper),
            config: SagaConfig::default(),
        }
    }

    pub fn with_timer(mut self, timer: impl BackoffTimer + 'static) -> Self {
        self.timer = Box::new(timer);
        self
    }

    pub fn with_config(mut self, config: SagaConfig) -> Self {
        self.config = config;
        self
    }

    /// Deterministic id for the given business key.
    pub fn saga_id_for(&self, business_key: &str) -> SagaId {
        SagaId::for_business_key(self.definition.saga_type, business_key)
    }

    /// Start (or attach to) the saga for `business_key`.
    ///
    /// The initiation event is appended with `NoStream` expectation; a
    /// concurrency conflict means another caller already initiated the same
    /// instance, which is success, not failure.
    pub fn start(
        &self,
        business_key: &str,
        input: JsonValue,
        trace: &TraceContext,
    ) -> Result<SagaId, SagaError> {
        let saga_id = self.saga_id_for(business_key);
        let payload = SagaInitiated {
            saga_id,
            saga_type: self.definition.saga_type.to_string(),
            business_key: business_key.to_string(),
            input,
        };
        let event = NewEvent::new(
            saga_id.stream_id(),
            self.definition.stream_type,
            SAGA_INITIATED,
            serde_json::to_value(&payload).map_err(|e| SagaError::Corrupt(e.to_string()))?,
            EventMetadata::from_trace(trace),
        );
        match self.store.append(event, ExpectedVersion::NoStream) {
            Ok(_) => {
                info!(saga_id = %saga_id, saga_type = self.definition.saga_type, "saga initiated");
                Ok(saga_id)
            }
            Err(err) if err.is_retryable() => {
                // Concurrency conflict: the instance already exists.
                info!(saga_id = %saga_id, "saga already initiated; attaching");
                Ok(saga_id)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Drive the saga to a terminal state, resuming from persisted progress.
    pub fn run(&self, saga_id: SagaId) -> Result<SagaStatusView, SagaError> {
        let mut instance = self.rehydrate(saga_id)?;
        if instance.status.is_terminal() {
            return Ok(instance.view());
        }

        let started = Instant::now();
        let mut spent = Duration::ZERO;
        let first = instance.completed.len();

        for index in first..self.definition.steps.len() {
            // Cooperative cancellation: observed between steps, never
            // mid-activity.
            instance = self.rehydrate(saga_id)?;
            if let Some(reason) = instance.cancel_requested.clone() {
                info!(saga_id = %saga_id, reason, "cancellation observed; compensating");
                self.compensate(&mut instance)?;
                self.append_saga_event(&instance, SAGA_CANCELLED, serde_json::json!({}))?;
                instance.status = SagaStatus::Cancelled;
                return Ok(instance.view());
            }

            let step = &self.definition.steps[index];
            instance.current_step = Some(step.name.to_string());

            match self.run_step(&instance, step, started, &mut spent) {
                Ok(outcome) => {
                    for warning in &outcome.warnings {
                        self.append_saga_event(
                            &instance,
                            SAGA_WARNING_RECORDED,
                            serde_json::to_value(WarningRecorded {
                                warning: warning.clone(),
                            })
                            .map_err(|e| SagaError::Corrupt(e.to_string()))?,
                        )?;
                    }
                    self.append_saga_event(
                        &instance,
                        SAGA_STEP_COMPLETED,
                        serde_json::to_value(StepCompleted {
                            step: step.name.to_string(),
                            output: outcome.output.clone(),
                        })
                        .map_err(|e| SagaError::Corrupt(e.to_string()))?,
                    )?;
                    instance.completed.push(step.name.to_string());
                    instance.outputs.insert(step.name.to_string(), outcome.output);
                    instance.warnings.extend(outcome.warnings);
                }
                Err((error, attempts)) => {
                    warn!(
                        saga_id = %saga_id,
                        step = step.name,
                        attempts,
                        error = %error,
                        "step failed; compensating"
                    );
                    self.append_saga_event(
                        &instance,
                        SAGA_STEP_FAILED,
                        serde_json::to_value(StepFailed {
                            step: step.name.to_string(),
                            error: error.message().to_string(),
                            attempts,
                        })
                        .map_err(|e| SagaError::Corrupt(e.to_string()))?,
                    )?;
                    instance.failed_step = Some(step.name.to_string());
                    instance.fatal_error = Some(error.message().to_string());

                    self.compensate(&mut instance)?;
                    self.append_saga_event(
                        &instance,
                        SAGA_FAILED,
                        serde_json::to_value(SagaFailed {
                            step: step.name.to_string(),
                            error: error.message().to_string(),
                        })
                        .map_err(|e| SagaError::Corrupt(e.to_string()))?,
                    )?;
                    instance.status = SagaStatus::Failed;
                    return Ok(instance.view());
                }
            }
        }

        self.append_saga_event(&instance, SAGA_COMPLETED, serde_json::json!({}))?;
        instance.status = SagaStatus::Completed;
        instance.current_step = None;
        info!(saga_id = %saga_id, "saga completed");
        Ok(instance.view())
    }

    /// Request cancellation. The running saga observes it at the next step
    /// boundary; a saga already terminal ignores the request.
    pub fn cancel(&self, saga_id: SagaId, reason: &str) -> Result<(), SagaError> {
        let instance = self.rehydrate(saga_id)?;
        if instance.status.is_terminal() {
            info!(saga_id = %saga_id, "cancel ignored: saga already terminal");
            return Ok(());
        }
        self.append_saga_event(
            &instance,
            SAGA_CANCEL_REQUESTED,
            serde_json::to_value(CancelRequested {
                reason: reason.to_string(),
            })
            .map_err(|e| SagaError::Corrupt(e.to_string()))?,
        )?;
        Ok(())
    }

    pub fn status(&self, saga_id: SagaId) -> Result<SagaStatusView, SagaError> {
        Ok(self.rehydrate(saga_id)?.view())
    }

    /// One step with retries. Returns the outcome or the terminal error plus
    /// the number of attempts made.
    fn run_step(
        &self,
        instance: &SagaInstance,
        step: &SagaStep,
        started: Instant,
        spent: &mut Duration,
    ) -> Result<StepOutcome, (ActivityError, u32)> {
        let ctx = StepContext {
            saga_id: instance.saga_id,
            input: &instance.input,
            trace: &instance.trace,
            outputs: &instance.outputs,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let delay = step.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                *spent += delay;
                self.timer.sleep(delay);
            }

            if let Some(deadline) = self.config.deadline {
                let elapsed = *spent + started.elapsed();
                if elapsed > deadline {
                    return Err((
                        ActivityError::fatal(format!(
                            "saga deadline exceeded before step '{}' attempt {attempt}",
                            step.name
                        )),
                        attempt - 1,
                    ));
                }
            }

            let span = instance.trace.start_span(step.name);
            let result = (step.run)(&ctx);
            let attempt_elapsed = span.elapsed();

            // Synchronous activities cannot be interrupted; an attempt that
            // overran its timeout is discarded even if it returned Ok.
            let result = match step.timeout {
                Some(timeout) if attempt_elapsed > timeout => Err(ActivityError::transient(
                    format!("step '{}' exceeded its {timeout:?} timeout", step.name),
                )),
                _ => result,
            };

            match result {
                Ok(outcome) => {
                    span.finish(SpanStatus::Ok);
                    return Ok(outcome);
                }
                Err(error) => {
                    span.finish(SpanStatus::Error);
                    if error.is_fatal() || !step.retry.should_retry(attempt) {
                        return Err((error, attempt));
                    }
                    info!(
                        saga_id = %instance.saga_id,
                        step = step.name,
                        attempt,
                        error = %error,
                        "transient step failure; will retry"
                    );
                }
            }
        }
    }

    /// Undo completed steps in reverse order, best-effort: a failing
    /// compensation is recorded and the stack keeps unwinding.
    fn compensate(&self, instance: &mut SagaInstance) -> Result<(), SagaError> {
        if instance.completed.is_empty() {
            return Ok(());
        }
        self.append_saga_event(instance, SAGA_COMPENSATION_STARTED, serde_json::json!({}))?;
        instance.status = SagaStatus::Compensating;

        let ctx = StepContext {
            saga_id: instance.saga_id,
            input: &instance.input,
            trace: &instance.trace,
            outputs: &instance.outputs,
        };

        for name in instance.completed.iter().rev() {
            let Some(step) = self.definition.steps.iter().find(|s| s.name == *name) else {
                warn!(saga_id = %instance.saga_id, step = %name, "unknown completed step; skipping");
                continue;
            };
            let Some(compensate) = &step.compensate else {
                continue;
            };

            let error = match compensate(&ctx) {
                Ok(()) => None,
                Err(err) => {
                    warn!(
                        saga_id = %instance.saga_id,
                        step = step.name,
                        error = %err,
                        "compensation failed; continuing with remaining stack"
                    );
                    Some(err.message().to_string())
                }
            };
            self.append_saga_event(
                instance,
                SAGA_STEP_COMPENSATED,
                serde_json::to_value(StepCompensated {
                    step: step.name.to_string(),
                    error,
                })
                .map_err(|e| SagaError::Corrupt(e.to_string()))?,
            )?;
        }
        Ok(())
    }

    fn append_saga_event(
        &self,
        instance: &SagaInstance,
        event_type: &str,
        data: JsonValue,
    ) -> Result<DomainEvent, SagaError> {
        let data = match data {
            JsonValue::Object(_) => data,
            other => {
                // The store only accepts object payloads.
                serde_json::json!({ "value": other })
            }
        };
        let event = NewEvent::new(
            instance.saga_id.stream_id(),
            self.definition.stream_type,
            event_type,
            data,
            EventMetadata::from_trace(&instance.trace.child()),
        );
        Ok(self.store.append(event, ExpectedVersion::Any)?)
    }

    /// Fold the saga stream back into instance state.
    fn rehydrate(&self, saga_id: SagaId) -> Result<SagaInstance, SagaError> {
        let events = self
            .store
            .load_stream(saga_id.stream_id(), self.definition.stream_type)?;
        let Some(first) = events.first() else {
            return Err(SagaError::NotFound(saga_id));
        };
        if first.event_type != SAGA_INITIATED {
            return Err(SagaError::Corrupt(format!(
                "stream starts with {} instead of {SAGA_INITIATED}",
                first.event_type
            )));
        }
        let initiated: SagaInitiated = serde_json::from_value(first.data.clone())
            .map_err(|e| SagaError::Corrupt(e.to_string()))?;

        let mut instance = SagaInstance {
            saga_id,
            status: SagaStatus::Initiated,
            input: initiated.input,
            trace: TraceContext::from_parts(
                first.metadata.correlation_id,
                first.metadata.trace_id.clone(),
                first.metadata.span_id.clone(),
            ),
            completed: Vec::new(),
            outputs: HashMap::new(),
            warnings: Vec::new(),
            fatal_error: None,
            failed_step: None,
            cancel_requested: None,
            current_step: None,
        };

        for event in events.iter().skip(1) {
            let decode = |e: serde_json::Error| SagaError::Corrupt(e.to_string());
            match event.event_type.as_str() {
                SAGA_STEP_COMPLETED => {
                    let p: StepCompleted =
                        serde_json::from_value(event.data.clone()).map_err(decode)?;
                    instance.completed.push(p.step.clone());
                    instance.outputs.insert(p.step, p.output);
                    instance.status = SagaStatus::Running;
                }
                SAGA_WARNING_RECORDED => {
                    let p: WarningRecorded =
                        serde_json::from_value(event.data.clone()).map_err(decode)?;
                    instance.warnings.push(p.warning);
                }
                SAGA_STEP_FAILED => {
                    let p: StepFailed =
                        serde_json::from_value(event.data.clone()).map_err(decode)?;
                    instance.failed_step = Some(p.step);
                    instance.fatal_error = Some(p.error);
                }
                SAGA_COMPENSATION_STARTED => instance.status = SagaStatus::Compensating,
                SAGA_STEP_COMPENSATED => {}
                SAGA_COMPLETED => instance.status = SagaStatus::Completed,
                SAGA_FAILED => instance.status = SagaStatus::Failed,
                SAGA_CANCEL_REQUESTED => {
                    let p: CancelRequested =
                        serde_json::from_value(event.data.clone()).map_err(decode)?;
                    instance.cancel_requested = Some(p.reason);
                }
                SAGA_CANCELLED => instance.status = SagaStatus::Cancelled,
                other => {
                    return Err(SagaError::Corrupt(format!(
                        "unknown saga event type: {other}"
                    )));
                }
            }
        }
        Ok(instance)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

//! Saga status model (mechanics only, no business rules).
//!
//! A saga is a long-running multi-step transaction with compensation on
//! failure. The orchestrator lives in infra; this module defines the shared
//! vocabulary: lifecycle states, warning records and the activity error
//! classification the orchestrator uses to decide retry vs. compensate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use orgflow_core::SagaId;

/// Lifecycle of a saga instance.
///
/// Transitions are monotonic: forward progress runs `Initiated → Running →
/// Completed`; any fatal step failure moves through `Compensating` to
/// `Failed`; a cancellation observed between steps moves through
/// `Compensating` to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    Initiated,
    Running,
    Compensating,
    Completed,
    Failed,
    Cancelled,
}

impl SagaStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SagaStatus::Completed | SagaStatus::Failed | SagaStatus::Cancelled
        )
    }
}

/// A non-fatal failure collected during a fanned-out step.
///
/// Warnings never trigger compensation; they surface in the status view so a
/// caller can act on partial degradation (e.g. one of three notification
/// sends failing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaWarning {
    /// Step that produced the warning.
    pub step: String,
    /// What the failed sub-operation was aimed at (e.g. a recipient).
    pub subject: String,
    pub error: String,
}

/// Classified activity failure.
///
/// The orchestrator retries `Transient` failures per the step's policy and
/// starts compensation on `Fatal` ones (or once retries are exhausted).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ActivityError {
    #[error("transient activity failure: {0}")]
    Transient(String),

    #[error("fatal activity failure: {0}")]
    Fatal(String),
}

impl ActivityError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Fatal(m) => m,
        }
    }
}

/// Snapshot of a saga instance as reported to callers.
///
/// Always complete enough for actionable feedback: terminal status, the step
/// that failed (if any), the first fatal error and all accumulated warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaStatusView {
    pub saga_id: SagaId,
    pub status: SagaStatus,
    pub current_step: Option<String>,
    /// Steps that completed forward execution, in order. Doubles as the
    /// compensation stack (compensated in reverse).
    pub completed_steps: Vec<String>,
    pub warnings: Vec<SagaWarning>,
    pub fatal_error: Option<String>,
    pub failed_step: Option<String>,
}

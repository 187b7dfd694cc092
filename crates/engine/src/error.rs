//! Engine-level error types.

use thiserror::Error;

use crate::activity::{ActivityId, WorkItemId};
use crate::instance::ProcessStatus;

/// Errors raised while building a process definition.
///
/// These never happen at run time: a definition that built successfully only
/// references activities, applications and participants that exist.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// Two parameters of one signature share a name.
    #[error("duplicate parameter '{name}' in {owner}")]
    DuplicateParameter { owner: String, name: String },

    /// Two activities share an ID.
    #[error("duplicate activity ID: '{0}'")]
    DuplicateActivity(String),

    /// Two applications share an ID.
    #[error("duplicate application ID: '{0}'")]
    DuplicateApplication(String),

    /// Two participants share an ID.
    #[error("duplicate participant ID: '{0}'")]
    DuplicateParticipant(String),

    /// A transition or binding references an activity that was never declared.
    #[error("reference to unknown activity '{id}' ({side})")]
    UnknownActivity { id: String, side: &'static str },

    /// A binding references an application that was never declared.
    #[error("activity '{activity}' references unknown application '{application}'")]
    UnknownApplication { activity: String, application: String },

    /// An activity's performer names an undeclared participant.
    #[error("activity '{activity}' references unknown participant '{participant}'")]
    UnknownParticipant { activity: String, participant: String },

    /// `add_application` was given a different number of data names than the
    /// application declares parameters.
    #[error(
        "application '{application}' on activity '{activity}' takes {expected} arguments, got {got}"
    )]
    ApplicationArity {
        activity: String,
        application: String,
        expected: usize,
        got: usize,
    },
}

/// Violations of the instance / activity / work item state machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The operation needs a running instance.
    #[error("process instance is {0}, not running")]
    NotRunning(ProcessStatus),

    /// `start` was called on an instance that already left `created`.
    #[error("process instance already started (status: {0})")]
    AlreadyStarted(ProcessStatus),

    /// `abort` was called twice.
    #[error("process instance already aborted")]
    AlreadyAborted,

    /// Workflow-relevant data may only be seeded before `start`.
    #[error("workflow-relevant data can only be seeded before start (status: {0})")]
    DataSealed(ProcessStatus),

    #[error("unknown activity {0}")]
    UnknownActivity(ActivityId),

    #[error("activity {activity} has no work item {work_item}")]
    UnknownWorkItem {
        activity: ActivityId,
        work_item: WorkItemId,
    },

    /// The work item already finished, or was aborted or reverted.
    #[error("work item {work_item} of activity {activity} is {status}, not started")]
    WorkItemNotStarted {
        activity: ActivityId,
        work_item: WorkItemId,
        status: String,
    },
}

/// Errors produced by a running process instance.
#[derive(Debug, Error)]
pub enum EngineError {
    /// `start` was called with the wrong number of values.
    #[error("{} arguments. Expected {expected}. got {got}", too_many_or_few(.expected, .got))]
    ArgumentCountMismatch { expected: usize, got: usize },

    /// `work_item_finished` was called with the wrong number of results.
    #[error(
        "application '{application}' returns {expected} output values, got {got}"
    )]
    ResultCountMismatch {
        application: String,
        expected: usize,
        got: usize,
    },

    /// The integration has no work item implementation for an application.
    #[error(
        "no work item for application '{application}' of activity '{activity}' (performer: {})",
        .performer.as_deref().unwrap_or("none")
    )]
    Resolution {
        activity: String,
        application: String,
        performer: Option<String>,
    },

    /// A data name bound to an input parameter has no value.
    #[error("activity '{activity}' reads unbound workflow variable '{name}'")]
    UnboundVariable { activity: String, name: String },

    /// A transition guard could not be evaluated.
    #[error("evaluating '{expression}' on transition {from} -> {to} failed: {source}")]
    Evaluation {
        from: String,
        to: String,
        expression: String,
        #[source]
        source: EvaluationError,
    },

    /// A single settle activated more activities than the configured limit.
    #[error("activation limit of {0} reached; the process graph likely loops without waiting")]
    ActivationLimit(usize),

    /// A snapshot cannot be restored onto the given definition.
    #[error("cannot restore snapshot: {0}")]
    Snapshot(String),

    /// Runtime state references something its definition does not declare.
    #[error("instance state does not match its definition: {0}")]
    Inconsistent(String),

    #[error(transparent)]
    State(#[from] StateError),
}

fn too_many_or_few(expected: &usize, got: &usize) -> &'static str {
    if got > expected {
        "Too many"
    } else {
        "Too few"
    }
}

/// Failure reported by an [`Evaluator`](crate::evaluator::Evaluator).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EvaluationError(pub String);

impl EvaluationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

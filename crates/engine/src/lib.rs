//! `engine` crate: process definitions and the instance execution engine.
//!
//! A [`ProcessDefinition`] is built once (parameters, activities, transitions,
//! applications) with an injected [`Integration`] and [`Evaluator`], then
//! shared behind an `Arc`.  Each [`ProcessInstance`] drives one execution:
//! activating activities, dispatching work items, writing results back into
//! workflow-relevant data, routing over transitions, and compensating on
//! abort.

pub mod activity;
pub mod data;
pub mod definition;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod instance;
pub mod integration;
pub mod models;
pub mod snapshot;

pub use activity::{Activity, ActivityId, ActivityStatus, WorkItemHandle, WorkItemId, WorkItemStatus};
pub use data::WorkflowData;
pub use definition::ProcessDefinition;
pub use error::{DefinitionError, EngineError, EvaluationError, StateError};
pub use evaluator::{CelEvaluator, Evaluator};
pub use events::ProcessEvent;
pub use instance::{Agendum, InstanceConfig, ProcessInstance, ProcessStatus};
pub use integration::{Integration, MappingIntegration, ParticipantContext, Resolution};
pub use models::{
    ActivityDefinition, Application, Direction, JoinPolicy, Parameter, ParticipantDefinition,
    SplitPolicy, TransitionDefinition,
};
pub use snapshot::{InstanceSnapshot, SNAPSHOT_VERSION};

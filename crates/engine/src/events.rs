//! Lifecycle events recorded by a process instance.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::activity::{ActivityId, WorkItemId};
use crate::WorkflowData;

/// Something that happened to an instance, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProcessEvent {
    ProcessStarted {
        arguments: Vec<Value>,
    },
    ActivityStarted {
        activity: ActivityId,
        definition: String,
    },
    WorkItemStarted {
        activity: ActivityId,
        work_item: WorkItemId,
        application: String,
        participant: String,
    },
    WorkItemFinished {
        activity: ActivityId,
        work_item: WorkItemId,
        results: Vec<Value>,
    },
    ActivityCompleted {
        activity: ActivityId,
        definition: String,
    },
    TransitionFired {
        from: String,
        to: String,
    },
    ProcessCompleted {
        outputs: WorkflowData,
    },
    WorkItemAborted {
        activity: ActivityId,
        work_item: WorkItemId,
    },
    WorkItemReverted {
        activity: ActivityId,
        work_item: WorkItemId,
    },
    ActivityAborted {
        activity: ActivityId,
        definition: String,
    },
    ProcessAborted,
}

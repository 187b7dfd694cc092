//! Runtime activities and the work items they own.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use workitems::{Participant, WorkItem};

/// Runtime activity ID, unique within a process instance and increasing in
/// activation order.
pub type ActivityId = u64;

/// Work item ID, unique within its activity and starting at 1.
pub type WorkItemId = u64;

/// Addresses one work item of one process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkItemHandle {
    pub activity: ActivityId,
    pub work_item: WorkItemId,
}

impl WorkItemHandle {
    pub fn new(activity: ActivityId, work_item: WorkItemId) -> Self {
        Self {
            activity,
            work_item,
        }
    }
}

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    /// At least one work item has not finished.
    Active,
    /// Every work item finished.
    Completed,
    /// Cancelled or compensated by `abort`.
    Aborted,
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Started,
    Finished,
    /// Cancelled while still started.
    Aborted,
    /// Compensated after having finished.
    Reverted,
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Finished => write!(f, "finished"),
            Self::Aborted => write!(f, "aborted"),
            Self::Reverted => write!(f, "reverted"),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkItemRecord
// ---------------------------------------------------------------------------

/// The engine's record of one dispatched work item.
pub struct WorkItemRecord {
    pub(crate) id: WorkItemId,
    pub(crate) application: String,
    /// Index into the activity definition's application bindings.
    pub(crate) binding: usize,
    pub(crate) participant: Participant,
    pub(crate) args: Vec<Value>,
    pub(crate) status: WorkItemStatus,
    pub(crate) item: Box<dyn WorkItem>,
}

impl WorkItemRecord {
    pub fn id(&self) -> WorkItemId {
        self.id
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    /// Values `start` was called with.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn status(&self) -> WorkItemStatus {
        self.status
    }
}

impl fmt::Debug for WorkItemRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItemRecord")
            .field("id", &self.id)
            .field("application", &self.application)
            .field("participant", &self.participant)
            .field("args", &self.args)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Activity
// ---------------------------------------------------------------------------

/// One activation of an activity definition.
#[derive(Debug)]
pub struct Activity {
    pub(crate) id: ActivityId,
    pub(crate) definition: String,
    pub(crate) status: ActivityStatus,
    /// Outgoing transitions have been evaluated and fired.
    pub(crate) routed: bool,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) finished_at: Option<DateTime<Utc>>,
    pub(crate) work_items: Vec<WorkItemRecord>,
}

impl Activity {
    pub fn id(&self) -> ActivityId {
        self.id
    }

    /// ID of the activity definition this is an activation of.
    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn status(&self) -> ActivityStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Work items in dispatch order.
    pub fn work_items(&self) -> &[WorkItemRecord] {
        &self.work_items
    }

    pub fn work_item(&self, id: WorkItemId) -> Option<&WorkItemRecord> {
        self.work_items.iter().find(|w| w.id == id)
    }

    /// Work items dispatched for one application (an application may fan out).
    pub fn work_items_for<'a>(
        &'a self,
        application: &'a str,
    ) -> impl Iterator<Item = &'a WorkItemRecord> + 'a {
        self.work_items
            .iter()
            .filter(move |w| w.application == application)
    }

    pub(crate) fn work_item_mut(&mut self, id: WorkItemId) -> Option<&mut WorkItemRecord> {
        self.work_items.iter_mut().find(|w| w.id == id)
    }

    pub(crate) fn all_finished(&self) -> bool {
        self.work_items
            .iter()
            .all(|w| w.status == WorkItemStatus::Finished)
    }
}

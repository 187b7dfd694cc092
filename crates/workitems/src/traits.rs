//! The `WorkItem` trait every externally performed unit of work implements,
//! and the types the engine hands to it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The actor responsible for performing a work item.
///
/// Resolved by the engine's integration for every application an activity
/// dispatches.  Serializable so it survives an instance snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Identifies the actor (a user or a work queue).
    pub id: String,
    /// The performer selector of the activity this participant was resolved for.
    pub performer: Option<String>,
}

impl Participant {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            performer: None,
        }
    }

    pub fn with_performer(mut self, performer: impl Into<String>) -> Self {
        self.performer = Some(performer.into());
        self
    }
}

/// Everything a work item is bound to at creation time.
///
/// Defined here (in the workitems crate) so both the engine and individual
/// work item implementations can import it without a circular dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItemBinding {
    /// ID of the process definition the instance was created from.
    pub process_id: String,
    /// ID of the owning process instance.
    pub instance_id: Uuid,
    /// Runtime ID of the owning activity (unique within the instance).
    pub activity_id: u64,
    /// ID of the activity definition that was activated.
    pub activity_definition: String,
    /// ID of the work item (unique within the activity, starting at 1).
    pub work_item_id: u64,
    /// ID of the application this work item performs.
    pub application: String,
    /// Who performs it.
    pub participant: Participant,
}

/// What a work item reports back from `start`.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkItemOutcome {
    /// The work continues outside the engine; completion arrives later
    /// through `ProcessInstance::work_item_finished`.
    Pending,
    /// The work completed within `start`.  Carries the values of the
    /// application's output parameters, in declared order.
    Finished(Vec<Value>),
}

/// The core work item trait.
///
/// The engine calls `start` exactly once, and afterwards at most one of
/// `abort` (while the item is unfinished) or `revert` (after it finished).
/// Work items that cannot be cancelled or compensated keep the no-op defaults.
pub trait WorkItem: Send {
    /// Begin the work with the values of the application's input parameters,
    /// in declared order.
    fn start(&mut self, args: &[Value]) -> WorkItemOutcome;

    /// Cancel unfinished work.
    fn abort(&mut self) {}

    /// Compensate work that already finished.
    fn revert(&mut self) {}
}

/// Builds work items for one application.
///
/// Supplied by the engine's integration, invoked once per dispatched work item
/// and once more for every work item rebuilt from a snapshot.
pub trait WorkItemFactory: Send + Sync {
    fn create(&self, binding: &WorkItemBinding) -> Box<dyn WorkItem>;
}

impl<F> WorkItemFactory for F
where
    F: Fn(&WorkItemBinding) -> Box<dyn WorkItem> + Send + Sync,
{
    fn create(&self, binding: &WorkItemBinding) -> Box<dyn WorkItem> {
        self(binding)
    }
}

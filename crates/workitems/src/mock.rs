//! `RecordingWorkItem`, a test double for `WorkItem`.
//!
//! Useful in unit and integration tests where a real worker is either
//! unavailable or irrelevant.  Every call the engine makes is appended to a
//! shared log so tests can assert both arguments and ordering.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::debug;

use crate::{WorkItem, WorkItemBinding, WorkItemFactory, WorkItemOutcome};

/// Which engine callback was invoked.
#[derive(Debug, Clone, PartialEq)]
pub enum CallKind {
    Start(Vec<Value>),
    Abort,
    Revert,
}

/// One recorded engine → work item call.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItemCall {
    pub activity_definition: String,
    pub activity_id: u64,
    pub work_item_id: u64,
    pub kind: CallKind,
}

impl fmt::Display for WorkItemCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.kind {
            CallKind::Start(_) => "started",
            CallKind::Abort => "aborted",
            CallKind::Revert => "reverted",
        };
        write!(
            f,
            "Workitem {} for activity '{}' {}.",
            self.work_item_id, self.activity_definition, verb
        )
    }
}

/// Log shared between a factory, its work items and the test.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<WorkItemCall>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: WorkItemCall) {
        self.0.lock().unwrap().push(call);
    }

    /// All calls seen so far (in call order).
    pub fn calls(&self) -> Vec<WorkItemCall> {
        self.0.lock().unwrap().clone()
    }

    /// The calls rendered as human-readable lines.
    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }

    /// Arguments of every `start` call, in call order.
    pub fn started_with(&self) -> Vec<Vec<Value>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c.kind {
                CallKind::Start(args) => Some(args),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Computes output values synchronously from the start arguments.
pub type ComputeFn = Arc<dyn Fn(&[Value]) -> Vec<Value> + Send + Sync>;

/// Behaviour injected into `RecordingWorkItem` at construction time.
#[derive(Clone)]
pub enum MockBehaviour {
    /// Return from `start` without finishing.
    Pending,
    /// Finish within `start` with fixed output values.
    Finish(Vec<Value>),
    /// Finish within `start` with outputs computed from the arguments.
    Compute(ComputeFn),
}

/// A work item that records every call it receives.
pub struct RecordingWorkItem {
    binding: WorkItemBinding,
    behaviour: MockBehaviour,
    log: CallLog,
}

impl RecordingWorkItem {
    fn record(&self, kind: CallKind) {
        debug!(
            activity = %self.binding.activity_definition,
            work_item = self.binding.work_item_id,
            ?kind,
            "recording work item call"
        );
        self.log.push(WorkItemCall {
            activity_definition: self.binding.activity_definition.clone(),
            activity_id: self.binding.activity_id,
            work_item_id: self.binding.work_item_id,
            kind,
        });
    }
}

impl WorkItem for RecordingWorkItem {
    fn start(&mut self, args: &[Value]) -> WorkItemOutcome {
        self.record(CallKind::Start(args.to_vec()));
        match &self.behaviour {
            MockBehaviour::Pending => WorkItemOutcome::Pending,
            MockBehaviour::Finish(values) => WorkItemOutcome::Finished(values.clone()),
            MockBehaviour::Compute(f) => WorkItemOutcome::Finished(f(args)),
        }
    }

    fn abort(&mut self) {
        self.record(CallKind::Abort);
    }

    fn revert(&mut self) {
        self.record(CallKind::Revert);
    }
}

/// Factory producing `RecordingWorkItem`s that all write to one log.
#[derive(Clone)]
pub struct RecordingFactory {
    behaviour: MockBehaviour,
    log: CallLog,
}

impl RecordingFactory {
    /// Work items that stay pending after `start`.
    pub fn pending(log: &CallLog) -> Self {
        Self {
            behaviour: MockBehaviour::Pending,
            log: log.clone(),
        }
    }

    /// Work items that finish immediately with `values`.
    pub fn finishing(log: &CallLog, values: Vec<Value>) -> Self {
        Self {
            behaviour: MockBehaviour::Finish(values),
            log: log.clone(),
        }
    }

    /// Work items that finish immediately with `f(args)`.
    pub fn computing(
        log: &CallLog,
        f: impl Fn(&[Value]) -> Vec<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            behaviour: MockBehaviour::Compute(Arc::new(f)),
            log: log.clone(),
        }
    }
}

impl WorkItemFactory for RecordingFactory {
    fn create(&self, binding: &WorkItemBinding) -> Box<dyn WorkItem> {
        Box::new(RecordingWorkItem {
            binding: binding.clone(),
            behaviour: self.behaviour.clone(),
            log: self.log.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Participant;
    use serde_json::json;
    use uuid::Uuid;

    fn binding(activity: &str, work_item_id: u64) -> WorkItemBinding {
        WorkItemBinding {
            process_id: "sample".into(),
            instance_id: Uuid::new_v4(),
            activity_id: 1,
            activity_definition: activity.into(),
            work_item_id,
            application: activity.into(),
            participant: Participant::new("system"),
        }
    }

    #[test]
    fn pending_item_records_start_arguments() {
        let log = CallLog::new();
        let mut item = RecordingFactory::pending(&log).create(&binding("eek", 1));

        let outcome = item.start(&[json!(99), json!(42)]);

        assert_eq!(outcome, WorkItemOutcome::Pending);
        assert_eq!(log.started_with(), vec![vec![json!(99), json!(42)]]);
        assert_eq!(log.lines(), vec!["Workitem 1 for activity 'eek' started."]);
    }

    #[test]
    fn computing_item_finishes_with_derived_outputs() {
        let log = CallLog::new();
        let factory = RecordingFactory::computing(&log, |args| {
            vec![json!(args[0].as_i64().unwrap_or_default() + 1)]
        });
        let mut item = factory.create(&binding("eek", 1));

        assert_eq!(
            item.start(&[json!(1)]),
            WorkItemOutcome::Finished(vec![json!(2)])
        );
    }

    #[test]
    fn abort_and_revert_are_logged_in_order() {
        let log = CallLog::new();
        let factory = RecordingFactory::pending(&log);
        let mut first = factory.create(&binding("eek", 1));
        let mut second = factory.create(&binding("ook", 1));

        second.abort();
        first.revert();

        assert_eq!(
            log.lines(),
            vec![
                "Workitem 1 for activity 'ook' aborted.",
                "Workitem 1 for activity 'eek' reverted.",
            ]
        );
    }
}

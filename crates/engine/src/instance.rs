//! Process instance runtime.
//!
//! `ProcessInstance` is a continuation-passing state machine:
//! 1. `start` binds the process arguments and activates every activity that
//!    has no incoming transition.
//! 2. Activating an activity resolves, binds and starts its work items.  A work
//!    item may finish inside `start`; otherwise it stays pending until someone
//!    calls `work_item_finished`.
//! 3. When the last work item of an activity finishes, the activity completes
//!    and its outgoing transitions are evaluated; matching targets activate.
//! 4. The instance completes once nothing is active and nothing is queued.
//! 5. `abort` cancels unfinished work and compensates finished work, newest
//!    activity first.
//!
//! Each engine call works through its own agenda of activations and routings.
//! A step that fails (an unresolvable application, a broken guard) reports its
//! error to that call and is parked on the instance's stalled list, which only
//! `resume` retries; later calls for other work items are unaffected.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use workitems::{WorkItemBinding, WorkItemOutcome};

use crate::activity::{
    Activity, ActivityId, ActivityStatus, WorkItemHandle, WorkItemRecord, WorkItemStatus,
};
use crate::definition::ProcessDefinition;
use crate::events::ProcessEvent;
use crate::integration::ParticipantContext;
use crate::models::{Application, ApplicationBinding, JoinPolicy, SplitPolicy};
use crate::{EngineError, StateError, WorkflowData};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Upper bound on activations performed by one engine call; guards against
    /// graphs that loop through activities which never wait.
    pub max_activations_per_settle: usize,
    /// Keep a [`ProcessEvent`] history for `take_events`.
    pub record_events: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            max_activations_per_settle: 10_000,
            record_events: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Status and agenda
// ---------------------------------------------------------------------------

/// Overall status of a process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Created but not started; data may still be seeded.
    Created,
    Running,
    Completed,
    Aborted,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// A queued engine step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Agendum {
    /// Create a new activation of an activity definition.
    Activate { definition: String },
    /// Evaluate and fire the outgoing transitions of a completed activity.
    Route { activity: ActivityId },
}

/// Why an agenda step failed.
enum StepError {
    /// Nothing changed; the step is stalled until `resume`.
    Retry(EngineError),
    /// The step took effect before failing and must not run again.
    Settled(EngineError),
}

impl From<EngineError> for StepError {
    fn from(err: EngineError) -> Self {
        Self::Retry(err)
    }
}

// ---------------------------------------------------------------------------
// ProcessInstance
// ---------------------------------------------------------------------------

/// One execution of a [`ProcessDefinition`].
///
/// All mutation goes through `&mut self`, so the "last finishing work item
/// completes the activity" decision is made exactly once.  Share an instance
/// across threads behind a `Mutex`.
#[derive(Debug)]
pub struct ProcessInstance {
    pub(crate) id: Uuid,
    pub(crate) definition: Arc<ProcessDefinition>,
    pub(crate) config: InstanceConfig,
    pub(crate) status: ProcessStatus,
    pub(crate) data: WorkflowData,
    /// Keyed by runtime ID, so iteration is activation order.
    pub(crate) activities: BTreeMap<ActivityId, Activity>,
    pub(crate) next_activity_id: ActivityId,
    /// Steps queued by the engine call in progress; empty between calls.
    pub(crate) agenda: VecDeque<Agendum>,
    /// Failed steps waiting for `resume`.
    pub(crate) stalled: VecDeque<Agendum>,
    /// AND-join targets → declaration indices of the incoming transitions
    /// that already fired.
    pub(crate) joins: BTreeMap<String, BTreeSet<usize>>,
    pub(crate) outputs: Option<WorkflowData>,
    pub(crate) events: Vec<ProcessEvent>,
}

impl ProcessInstance {
    pub(crate) fn new(definition: Arc<ProcessDefinition>, config: InstanceConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition,
            config,
            status: ProcessStatus::Created,
            data: WorkflowData::new(),
            activities: BTreeMap::new(),
            next_activity_id: 1,
            agenda: VecDeque::new(),
            stalled: VecDeque::new(),
            joins: BTreeMap::new(),
            outputs: None,
            events: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Runtime API
    // -----------------------------------------------------------------------

    /// Bind `args` to the process input parameters (in declaration order) and
    /// activate the initial activities.
    ///
    /// Returns once every synchronously reachable work item has been started.
    ///
    /// # Errors
    /// - [`EngineError::ArgumentCountMismatch`] if `args` does not match the
    ///   number of input parameters; the instance stays unstarted.
    /// - [`StateError::AlreadyStarted`] if the instance left `created`.
    /// - Any activation error; the failed step is stalled until `resume`.
    #[instrument(skip_all, fields(process = %self.definition.id(), instance = %self.id))]
    pub fn start(&mut self, args: Vec<Value>) -> Result<(), EngineError> {
        if self.status != ProcessStatus::Created {
            return Err(StateError::AlreadyStarted(self.status).into());
        }

        let definition = Arc::clone(&self.definition);
        let names: Vec<&str> = definition
            .input_parameters()
            .map(|p| p.name.as_str())
            .collect();
        if names.len() != args.len() {
            return Err(EngineError::ArgumentCountMismatch {
                expected: names.len(),
                got: args.len(),
            });
        }

        for (name, value) in names.into_iter().zip(args.iter().cloned()) {
            self.data.set(name, value);
        }
        self.status = ProcessStatus::Running;
        info!("process started with {} arguments", args.len());
        self.emit(ProcessEvent::ProcessStarted { arguments: args });

        for activity in definition.initial_activities() {
            self.agenda.push_back(Agendum::Activate {
                definition: activity.to_owned(),
            });
        }
        self.settle()
    }

    /// Report that a work item finished, with the values of its application's
    /// output parameters in declared order.
    ///
    /// Each value is written into workflow-relevant data under the data name
    /// that parameter was bound to.  If this was the activity's last
    /// unfinished work item, the activity completes and routes before this
    /// call returns.
    ///
    /// # Errors
    /// - [`StateError`] for unknown handles, an item that is not `started`, or
    ///   an instance that is not running.
    /// - [`EngineError::ResultCountMismatch`] if `results` has the wrong
    ///   length; nothing is written.
    /// - Any error raised while routing or activating downstream.
    #[instrument(skip_all, fields(instance = %self.id, activity = handle.activity, work_item = handle.work_item))]
    pub fn work_item_finished(
        &mut self,
        handle: WorkItemHandle,
        results: Vec<Value>,
    ) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.record_finish(handle, results)?;
        self.complete_if_finished(handle.activity);
        self.settle()
    }

    /// Retry every stalled step, oldest first.
    #[instrument(skip_all, fields(instance = %self.id, stalled = self.stalled.len()))]
    pub fn resume(&mut self) -> Result<(), EngineError> {
        self.ensure_running()?;
        let stalled = std::mem::take(&mut self.stalled);
        self.agenda.extend(stalled);
        self.settle()
    }

    /// Cancel the instance, compensating in reverse activation order.
    ///
    /// Active activities have their unfinished work items aborted (and their
    /// finished ones reverted); completed activities have their work items
    /// reverted.  Terminal: every later mutating call fails.
    #[instrument(skip_all, fields(instance = %self.id))]
    pub fn abort(&mut self) -> Result<(), EngineError> {
        if self.status == ProcessStatus::Aborted {
            return Err(StateError::AlreadyAborted.into());
        }
        info!("aborting process (was {})", self.status);
        self.status = ProcessStatus::Aborted;
        self.agenda.clear();
        self.stalled.clear();
        self.joins.clear();

        let mut events = Vec::new();
        for activity in self.activities.values_mut().rev() {
            if activity.status == ActivityStatus::Aborted {
                continue;
            }
            for record in activity.work_items.iter_mut().rev() {
                match record.status {
                    WorkItemStatus::Started => {
                        record.item.abort();
                        record.status = WorkItemStatus::Aborted;
                        events.push(ProcessEvent::WorkItemAborted {
                            activity: activity.id,
                            work_item: record.id,
                        });
                    }
                    WorkItemStatus::Finished => {
                        record.item.revert();
                        record.status = WorkItemStatus::Reverted;
                        events.push(ProcessEvent::WorkItemReverted {
                            activity: activity.id,
                            work_item: record.id,
                        });
                    }
                    WorkItemStatus::Aborted | WorkItemStatus::Reverted => {}
                }
            }
            debug!(activity = activity.id, definition = %activity.definition, "activity aborted");
            activity.status = ActivityStatus::Aborted;
            activity.finished_at.get_or_insert_with(Utc::now);
            events.push(ProcessEvent::ActivityAborted {
                activity: activity.id,
                definition: activity.definition.clone(),
            });
        }
        for event in events {
            self.emit(event);
        }
        self.emit(ProcessEvent::ProcessAborted);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn definition(&self) -> &Arc<ProcessDefinition> {
        &self.definition
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn workflow_relevant_data(&self) -> &WorkflowData {
        &self.data
    }

    /// Seed workflow-relevant data before `start`.
    pub fn workflow_relevant_data_mut(&mut self) -> Result<&mut WorkflowData, StateError> {
        match self.status {
            ProcessStatus::Created => Ok(&mut self.data),
            other => Err(StateError::DataSealed(other)),
        }
    }

    pub fn activity(&self, id: ActivityId) -> Option<&Activity> {
        self.activities.get(&id)
    }

    /// Every activity, in activation order.
    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.activities.values()
    }

    /// Activations of one activity definition, in activation order.
    pub fn activations<'a>(&'a self, definition: &'a str) -> impl Iterator<Item = &'a Activity> + 'a {
        self.activities
            .values()
            .filter(move |a| a.definition == definition)
    }

    /// Work items still waiting for `work_item_finished`.
    pub fn pending_work_items(&self) -> Vec<WorkItemHandle> {
        self.activities
            .values()
            .filter(|a| a.status == ActivityStatus::Active)
            .flat_map(|a| {
                a.work_items
                    .iter()
                    .filter(|w| w.status == WorkItemStatus::Started)
                    .map(move |w| WorkItemHandle::new(a.id, w.id))
            })
            .collect()
    }

    /// Failed steps waiting for `resume`, oldest first.
    pub fn stalled(&self) -> impl Iterator<Item = &Agendum> {
        self.stalled.iter()
    }

    /// Values of the process output parameters, once completed.
    pub fn outputs(&self) -> Option<&WorkflowData> {
        self.outputs.as_ref()
    }

    /// Drain the recorded event history.
    pub fn take_events(&mut self) -> Vec<ProcessEvent> {
        std::mem::take(&mut self.events)
    }

    // -----------------------------------------------------------------------
    // Internal: agenda processing
    // -----------------------------------------------------------------------

    fn ensure_running(&self) -> Result<(), StateError> {
        match self.status {
            ProcessStatus::Running => Ok(()),
            other => Err(StateError::NotRunning(other)),
        }
    }

    fn emit(&mut self, event: ProcessEvent) {
        debug!(?event, "process event");
        if self.config.record_events {
            self.events.push(event);
        }
    }

    /// Run the agenda to exhaustion.  Failed steps are stalled and the rest
    /// keep running; the first failure is returned.
    fn settle(&mut self) -> Result<(), EngineError> {
        let mut activations = 0usize;
        let mut first_error = None;

        while let Some(step) = self.agenda.pop_front() {
            let result = match &step {
                Agendum::Activate { definition } => {
                    activations += 1;
                    if activations > self.config.max_activations_per_settle {
                        Err(StepError::Retry(EngineError::ActivationLimit(
                            self.config.max_activations_per_settle,
                        )))
                    } else {
                        self.activate(definition)
                    }
                }
                Agendum::Route { activity } => self.route(*activity),
            };

            let err = match result {
                Ok(()) => continue,
                Err(StepError::Retry(err)) => {
                    warn!(?step, "step failed and is stalled: {err}");
                    self.stalled.push_back(step);
                    err
                }
                Err(StepError::Settled(err)) => {
                    warn!(?step, "step failed after taking effect: {err}");
                    err
                }
            };
            if first_error.is_none() {
                first_error = Some(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                self.complete_if_idle();
                Ok(())
            }
        }
    }

    fn activate(&mut self, definition_id: &str) -> Result<(), StepError> {
        let definition = Arc::clone(&self.definition);
        let activity_def = definition
            .activity(definition_id)
            .ok_or_else(|| EngineError::Inconsistent(format!("unknown activity '{definition_id}'")))?;

        // Resolve and bind everything before creating the activity, so a
        // failure leaves no trace behind.
        let mut planned = Vec::with_capacity(activity_def.applications().len());
        for (index, binding) in activity_def.applications().iter().enumerate() {
            let application = lookup_application(&definition, binding)?;
            let ctx = ParticipantContext {
                process_id: definition.id(),
                instance_id: self.id,
                activity: definition_id,
                application: &binding.application,
                performer: activity_def.performer.as_deref(),
                data: &self.data,
            };
            let resolution = definition.integration().resolve(&ctx).ok_or_else(|| {
                EngineError::Resolution {
                    activity: definition_id.to_owned(),
                    application: binding.application.clone(),
                    performer: activity_def.performer.clone(),
                }
            })?;
            let args = bind_arguments(application, binding, &self.data, definition_id)?;
            planned.push((index, binding, resolution, args));
        }

        let activity_id = self.next_activity_id;
        self.next_activity_id += 1;

        // Register every work item before any starts, so one that finishes
        // inside `start` cannot complete the activity early.
        let mut work_items = Vec::with_capacity(planned.len());
        for (position, (index, binding, resolution, args)) in planned.into_iter().enumerate() {
            let work_item_binding = WorkItemBinding {
                process_id: definition.id().to_owned(),
                instance_id: self.id,
                activity_id,
                activity_definition: definition_id.to_owned(),
                work_item_id: position as u64 + 1,
                application: binding.application.clone(),
                participant: resolution.participant.clone(),
            };
            work_items.push(WorkItemRecord {
                id: work_item_binding.work_item_id,
                application: binding.application.clone(),
                binding: index,
                participant: resolution.participant,
                args,
                status: WorkItemStatus::Started,
                item: resolution.factory.create(&work_item_binding),
            });
        }
        let starts: Vec<ProcessEvent> = work_items
            .iter()
            .map(|w| ProcessEvent::WorkItemStarted {
                activity: activity_id,
                work_item: w.id,
                application: w.application.clone(),
                participant: w.participant.id.clone(),
            })
            .collect();

        self.activities.insert(
            activity_id,
            Activity {
                id: activity_id,
                definition: definition_id.to_owned(),
                status: ActivityStatus::Active,
                routed: false,
                started_at: Utc::now(),
                finished_at: None,
                work_items,
            },
        );
        info!(activity = activity_id, definition = definition_id, "activity started");
        self.emit(ProcessEvent::ActivityStarted {
            activity: activity_id,
            definition: definition_id.to_owned(),
        });

        let mut failure = None;
        for (work_item, event) in (1..).zip(starts) {
            self.emit(event);
            let outcome = match self
                .activities
                .get_mut(&activity_id)
                .and_then(|a| a.work_item_mut(work_item))
            {
                Some(record) => record.item.start(&record.args),
                None => continue,
            };
            if let WorkItemOutcome::Finished(results) = outcome {
                let handle = WorkItemHandle::new(activity_id, work_item);
                if let Err(err) = self.record_finish(handle, results) {
                    warn!(work_item, "work item finished inside start with bad results: {err}");
                    failure.get_or_insert(err);
                }
            }
        }

        self.complete_if_finished(activity_id);
        match failure {
            Some(err) => Err(StepError::Settled(err)),
            None => Ok(()),
        }
    }

    fn route(&mut self, activity_id: ActivityId) -> Result<(), StepError> {
        let definition = Arc::clone(&self.definition);
        let Some(activity) = self.activities.get(&activity_id) else {
            return Err(StepError::Settled(StateError::UnknownActivity(activity_id).into()));
        };
        if activity.routed || activity.status != ActivityStatus::Completed {
            return Ok(());
        }
        let origin = activity.definition.clone();
        let split = definition
            .activity(&origin)
            .map(|a| a.split)
            .unwrap_or_default();

        // Evaluate every guard before firing any, so a failure fires nothing.
        let mut satisfied = Vec::new();
        for (index, transition) in definition.outgoing(&origin) {
            let fires = match &transition.condition {
                None => true,
                Some(expression) => definition
                    .evaluator()
                    .evaluate(expression, &self.data)
                    .map_err(|err| EngineError::Evaluation {
                        from: transition.from.clone(),
                        to: transition.to.clone(),
                        expression: expression.clone(),
                        source: err,
                    })?,
            };
            if fires {
                satisfied.push((index, transition));
            }
        }
        if split == SplitPolicy::Xor {
            satisfied.truncate(1);
        }

        if let Some(activity) = self.activities.get_mut(&activity_id) {
            activity.routed = true;
        }

        for (index, transition) in satisfied {
            debug!(from = %transition.from, to = %transition.to, "transition fired");
            self.emit(ProcessEvent::TransitionFired {
                from: transition.from.clone(),
                to: transition.to.clone(),
            });

            let join = definition
                .activity(&transition.to)
                .map(|a| a.join)
                .unwrap_or_default();
            match join {
                JoinPolicy::Or => self.agenda.push_back(Agendum::Activate {
                    definition: transition.to.clone(),
                }),
                JoinPolicy::And => {
                    let arrived = self.joins.entry(transition.to.clone()).or_default();
                    arrived.insert(index);
                    let ready = definition
                        .incoming(&transition.to)
                        .all(|(i, _)| arrived.contains(&i));
                    if ready {
                        self.joins.remove(&transition.to);
                        self.agenda.push_back(Agendum::Activate {
                            definition: transition.to.clone(),
                        });
                    } else {
                        debug!(target_activity = %transition.to, "and-join waiting for more transitions");
                    }
                }
            }
        }
        Ok(())
    }

    /// Write back a finished work item's results and mark it finished.
    fn record_finish(
        &mut self,
        handle: WorkItemHandle,
        results: Vec<Value>,
    ) -> Result<(), EngineError> {
        let definition = Arc::clone(&self.definition);
        let activity = self
            .activities
            .get_mut(&handle.activity)
            .ok_or(StateError::UnknownActivity(handle.activity))?;
        let record = activity
            .work_items
            .iter_mut()
            .find(|w| w.id == handle.work_item)
            .ok_or(StateError::UnknownWorkItem {
                activity: handle.activity,
                work_item: handle.work_item,
            })?;
        if record.status != WorkItemStatus::Started {
            return Err(StateError::WorkItemNotStarted {
                activity: handle.activity,
                work_item: handle.work_item,
                status: record.status.to_string(),
            }
            .into());
        }

        let binding = definition
            .activity(&activity.definition)
            .and_then(|a| a.applications().get(record.binding))
            .ok_or_else(|| {
                EngineError::Inconsistent(format!(
                    "activity '{}' has no application binding {}",
                    activity.definition, record.binding
                ))
            })?;
        let application = lookup_application(&definition, binding)?;
        if application.output_count() != results.len() {
            return Err(EngineError::ResultCountMismatch {
                application: binding.application.clone(),
                expected: application.output_count(),
                got: results.len(),
            });
        }
        let targets: Vec<&str> = application
            .parameters()
            .iter()
            .zip(&binding.arguments)
            .filter(|(p, _)| p.is_output())
            .map(|(_, name)| name.as_str())
            .collect();

        record.status = WorkItemStatus::Finished;
        for (name, value) in targets.into_iter().zip(results.iter().cloned()) {
            self.data.set(name, value);
        }
        self.emit(ProcessEvent::WorkItemFinished {
            activity: handle.activity,
            work_item: handle.work_item,
            results,
        });
        Ok(())
    }

    fn complete_if_finished(&mut self, activity_id: ActivityId) {
        let Some(activity) = self.activities.get_mut(&activity_id) else {
            return;
        };
        if activity.status != ActivityStatus::Active || !activity.all_finished() {
            return;
        }
        activity.status = ActivityStatus::Completed;
        activity.finished_at = Some(Utc::now());
        let definition = activity.definition.clone();
        info!(activity = activity_id, definition = %definition, "activity completed");
        self.agenda.push_back(Agendum::Route {
            activity: activity_id,
        });
        self.emit(ProcessEvent::ActivityCompleted {
            activity: activity_id,
            definition,
        });
    }

    fn complete_if_idle(&mut self) {
        if self.status != ProcessStatus::Running
            || !self.agenda.is_empty()
            || !self.stalled.is_empty()
        {
            return;
        }
        if self
            .activities
            .values()
            .any(|a| a.status == ActivityStatus::Active)
        {
            return;
        }

        let outputs: WorkflowData = self
            .definition
            .output_parameters()
            .map(|p| {
                let value = self.data.get(&p.name).cloned().unwrap_or(Value::Null);
                (p.name.clone(), value)
            })
            .collect();
        self.status = ProcessStatus::Completed;
        info!(instance = %self.id, "process completed");
        self.outputs = Some(outputs.clone());
        self.emit(ProcessEvent::ProcessCompleted { outputs });
    }
}

fn lookup_application<'a>(
    definition: &'a ProcessDefinition,
    binding: &ApplicationBinding,
) -> Result<&'a Application, EngineError> {
    definition.application(&binding.application).ok_or_else(|| {
        EngineError::Inconsistent(format!("unknown application '{}'", binding.application))
    })
}

/// Values for the application's input parameters, read from
/// workflow-relevant data through the binding's data names.
fn bind_arguments(
    application: &Application,
    binding: &ApplicationBinding,
    data: &WorkflowData,
    activity: &str,
) -> Result<Vec<Value>, EngineError> {
    let mut args = Vec::with_capacity(application.input_count());
    for (_, name) in application
        .parameters()
        .iter()
        .zip(&binding.arguments)
        .filter(|(p, _)| p.is_input())
    {
        let value = data.get(name).ok_or_else(|| EngineError::UnboundVariable {
            activity: activity.to_owned(),
            name: name.clone(),
        })?;
        args.push(value.clone());
    }
    Ok(args)
}

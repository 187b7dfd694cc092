//! Suspend / resume contract for process instances.
//!
//! A snapshot lists exactly the fields that make up an instance's state.  The
//! definition itself is not part of it: a snapshot names the definition it was
//! taken from, and is restored onto that same (shared, immutable) definition.
//! Work item implementations are rebuilt through the definition's integration.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;
use workitems::{Participant, WorkItemBinding};

use crate::activity::{
    Activity, ActivityId, ActivityStatus, WorkItemId, WorkItemRecord, WorkItemStatus,
};
use crate::definition::ProcessDefinition;
use crate::instance::{Agendum, InstanceConfig, ProcessInstance, ProcessStatus};
use crate::integration::ParticipantContext;
use crate::models::ActivityDefinition;
use crate::{EngineError, WorkflowData};

/// Format version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub version: u32,
    pub definition_id: String,
    pub instance_id: Uuid,
    pub status: ProcessStatus,
    pub config: InstanceConfig,
    pub data: WorkflowData,
    pub next_activity_id: ActivityId,
    pub activities: Vec<ActivitySnapshot>,
    /// Failed steps waiting for `resume`.
    pub stalled: Vec<Agendum>,
    pub joins: BTreeMap<String, BTreeSet<usize>>,
    pub outputs: Option<WorkflowData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySnapshot {
    pub id: ActivityId,
    pub definition: String,
    pub status: ActivityStatus,
    pub routed: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub work_items: Vec<WorkItemSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemSnapshot {
    pub id: WorkItemId,
    pub application: String,
    pub binding: usize,
    pub participant: Participant,
    pub args: Vec<Value>,
    pub status: WorkItemStatus,
}

impl ProcessInstance {
    /// Capture the instance's full state.
    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            version: SNAPSHOT_VERSION,
            definition_id: self.definition.id().to_owned(),
            instance_id: self.id,
            status: self.status,
            config: self.config.clone(),
            data: self.data.clone(),
            next_activity_id: self.next_activity_id,
            activities: self
                .activities
                .values()
                .map(|a| ActivitySnapshot {
                    id: a.id,
                    definition: a.definition.clone(),
                    status: a.status,
                    routed: a.routed,
                    started_at: a.started_at,
                    finished_at: a.finished_at,
                    work_items: a
                        .work_items
                        .iter()
                        .map(|w| WorkItemSnapshot {
                            id: w.id,
                            application: w.application.clone(),
                            binding: w.binding,
                            participant: w.participant.clone(),
                            args: w.args.clone(),
                            status: w.status,
                        })
                        .collect(),
                })
                .collect(),
            stalled: self.stalled.iter().cloned().collect(),
            joins: self.joins.clone(),
            outputs: self.outputs.clone(),
        }
    }

    /// Rebuild a live instance from `snapshot` on `definition`.
    ///
    /// Work items are recreated through the definition's integration but not
    /// started again.
    ///
    /// # Errors
    /// - [`EngineError::Snapshot`] for a version or definition mismatch, or a
    ///   snapshot referencing activities/applications the definition lacks.
    /// - [`EngineError::Resolution`] if a work item can no longer be resolved.
    pub fn restore(
        definition: Arc<ProcessDefinition>,
        snapshot: InstanceSnapshot,
    ) -> Result<Self, EngineError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(EngineError::Snapshot(format!(
                "unsupported version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }
        if snapshot.definition_id != definition.id() {
            return Err(EngineError::Snapshot(format!(
                "taken from definition '{}', not '{}'",
                snapshot.definition_id,
                definition.id()
            )));
        }
        for step in &snapshot.stalled {
            if let Agendum::Activate { definition: id } = step {
                require_activity(&definition, id)?;
            }
        }

        let mut activities = BTreeMap::new();
        for activity in snapshot.activities {
            let activity_def = require_activity(&definition, &activity.definition)?;
            let mut work_items = Vec::with_capacity(activity.work_items.len());
            for w in activity.work_items {
                let bound = activity_def.applications().get(w.binding);
                if bound.map(|b| b.application.as_str()) != Some(w.application.as_str()) {
                    return Err(EngineError::Snapshot(format!(
                        "activity '{}' has no binding {} for application '{}'",
                        activity.definition, w.binding, w.application
                    )));
                }
                let ctx = ParticipantContext {
                    process_id: definition.id(),
                    instance_id: snapshot.instance_id,
                    activity: &activity.definition,
                    application: &w.application,
                    performer: activity_def.performer.as_deref(),
                    data: &snapshot.data,
                };
                let resolution = definition.integration().resolve(&ctx).ok_or_else(|| {
                    EngineError::Resolution {
                        activity: activity.definition.clone(),
                        application: w.application.clone(),
                        performer: activity_def.performer.clone(),
                    }
                })?;
                let binding = WorkItemBinding {
                    process_id: definition.id().to_owned(),
                    instance_id: snapshot.instance_id,
                    activity_id: activity.id,
                    activity_definition: activity.definition.clone(),
                    work_item_id: w.id,
                    application: w.application.clone(),
                    participant: w.participant.clone(),
                };
                work_items.push(WorkItemRecord {
                    id: w.id,
                    application: w.application,
                    binding: w.binding,
                    participant: w.participant,
                    args: w.args,
                    status: w.status,
                    item: resolution.factory.create(&binding),
                });
            }
            activities.insert(
                activity.id,
                Activity {
                    id: activity.id,
                    definition: activity.definition,
                    status: activity.status,
                    routed: activity.routed,
                    started_at: activity.started_at,
                    finished_at: activity.finished_at,
                    work_items,
                },
            );
        }

        info!(instance = %snapshot.instance_id, status = %snapshot.status, "process instance restored");
        Ok(Self {
            id: snapshot.instance_id,
            definition,
            config: snapshot.config,
            status: snapshot.status,
            data: snapshot.data,
            activities,
            next_activity_id: snapshot.next_activity_id,
            agenda: VecDeque::new(),
            stalled: VecDeque::from(snapshot.stalled),
            joins: snapshot.joins,
            outputs: snapshot.outputs,
            events: Vec::new(),
        })
    }
}

fn require_activity<'a>(
    definition: &'a ProcessDefinition,
    id: &str,
) -> Result<&'a ActivityDefinition, EngineError> {
    definition
        .activity(id)
        .ok_or_else(|| EngineError::Snapshot(format!("unknown activity '{id}'")))
}

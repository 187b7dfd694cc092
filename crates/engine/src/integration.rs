//! Resolution of (activity, application, performer) to a participant and a
//! work item implementation.
//!
//! The engine never looks anything up globally: every definition carries one
//! [`Integration`] object, injected by whoever registers the process.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;
use workitems::{Participant, WorkItemFactory};

use crate::WorkflowData;

/// What the integration sees when asked to resolve an application.
#[derive(Debug, Clone, Copy)]
pub struct ParticipantContext<'a> {
    pub process_id: &'a str,
    pub instance_id: Uuid,
    /// ID of the activity definition being activated.
    pub activity: &'a str,
    pub application: &'a str,
    /// The activity's participant selector.
    pub performer: Option<&'a str>,
    /// Current workflow-relevant data (read-only).
    pub data: &'a WorkflowData,
}

/// A resolved participant plus the factory that builds its work item.
#[derive(Clone)]
pub struct Resolution {
    pub participant: Participant,
    pub factory: Arc<dyn WorkItemFactory>,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("participant", &self.participant)
            .finish_non_exhaustive()
    }
}

/// The resolver contract consumed by the engine.
pub trait Integration: Send + Sync {
    /// `None` means no work item implementation exists for this application;
    /// the engine reports it as a resolution error.
    fn resolve(&self, ctx: &ParticipantContext<'_>) -> Option<Resolution>;
}

/// An [`Integration`] backed by explicit maps.
///
/// Work items are looked up by `(activity, application)` first and by
/// `application` alone second.  Participants are looked up by performer; an
/// unmapped performer becomes a participant with the performer as its ID, and
/// an activity without a performer gets the default participant.
#[derive(Clone)]
pub struct MappingIntegration {
    activity_work_items: HashMap<(String, String), Arc<dyn WorkItemFactory>>,
    work_items: HashMap<String, Arc<dyn WorkItemFactory>>,
    participants: HashMap<String, Participant>,
    default_participant: Participant,
}

impl Default for MappingIntegration {
    fn default() -> Self {
        Self {
            activity_work_items: HashMap::new(),
            work_items: HashMap::new(),
            participants: HashMap::new(),
            default_participant: Participant::new("system"),
        }
    }
}

impl MappingIntegration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `factory` for `application` wherever it is dispatched.
    pub fn register_work_item(
        &mut self,
        application: impl Into<String>,
        factory: impl WorkItemFactory + 'static,
    ) -> &mut Self {
        self.work_items.insert(application.into(), Arc::new(factory));
        self
    }

    /// Use `factory` for `application` only when `activity` dispatches it.
    pub fn register_activity_work_item(
        &mut self,
        activity: impl Into<String>,
        application: impl Into<String>,
        factory: impl WorkItemFactory + 'static,
    ) -> &mut Self {
        self.activity_work_items
            .insert((activity.into(), application.into()), Arc::new(factory));
        self
    }

    pub fn register_participant(
        &mut self,
        performer: impl Into<String>,
        participant: Participant,
    ) -> &mut Self {
        self.participants.insert(performer.into(), participant);
        self
    }

    pub fn with_default_participant(mut self, participant: Participant) -> Self {
        self.default_participant = participant;
        self
    }

    fn participant_for(&self, performer: Option<&str>) -> Participant {
        match performer {
            None => self.default_participant.clone(),
            Some(performer) => self
                .participants
                .get(performer)
                .cloned()
                .unwrap_or_else(|| Participant::new(performer))
                .with_performer(performer),
        }
    }
}

impl Integration for MappingIntegration {
    fn resolve(&self, ctx: &ParticipantContext<'_>) -> Option<Resolution> {
        let key = (ctx.activity.to_owned(), ctx.application.to_owned());
        let factory = self
            .activity_work_items
            .get(&key)
            .or_else(|| self.work_items.get(ctx.application))?;
        let participant = self.participant_for(ctx.performer);
        debug!(
            activity = ctx.activity,
            application = ctx.application,
            participant = %participant.id,
            "resolved work item"
        );
        Some(Resolution {
            participant,
            factory: Arc::clone(factory),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workitems::mock::{CallLog, RecordingFactory};

    fn ctx<'a>(
        data: &'a WorkflowData,
        activity: &'a str,
        performer: Option<&'a str>,
    ) -> ParticipantContext<'a> {
        ParticipantContext {
            process_id: "sample",
            instance_id: Uuid::new_v4(),
            activity,
            application: "review",
            performer,
            data,
        }
    }

    #[test]
    fn unknown_application_does_not_resolve() {
        let data = WorkflowData::new();
        assert!(MappingIntegration::new().resolve(&ctx(&data, "a", None)).is_none());
    }

    #[test]
    fn participants_follow_the_performer() {
        let log = CallLog::new();
        let mut integration = MappingIntegration::new();
        integration
            .register_work_item("review", RecordingFactory::pending(&log))
            .register_participant("reviewer", Participant::new("alice"));
        let data = WorkflowData::new();

        let mapped = integration.resolve(&ctx(&data, "a", Some("reviewer"))).unwrap();
        assert_eq!(mapped.participant, Participant::new("alice").with_performer("reviewer"));

        let unmapped = integration.resolve(&ctx(&data, "a", Some("clerk"))).unwrap();
        assert_eq!(unmapped.participant.id, "clerk");

        let anonymous = integration.resolve(&ctx(&data, "a", None)).unwrap();
        assert_eq!(anonymous.participant, Participant::new("system"));
    }

    #[test]
    fn activity_specific_factory_wins() {
        let generic = CallLog::new();
        let specific = CallLog::new();
        let mut integration = MappingIntegration::new();
        integration
            .register_work_item("review", RecordingFactory::pending(&generic))
            .register_activity_work_item("b", "review", RecordingFactory::pending(&specific));
        let data = WorkflowData::new();

        let resolution = integration.resolve(&ctx(&data, "b", None)).unwrap();
        let binding = workitems::WorkItemBinding {
            process_id: "sample".into(),
            instance_id: Uuid::new_v4(),
            activity_id: 1,
            activity_definition: "b".into(),
            work_item_id: 1,
            application: "review".into(),
            participant: resolution.participant.clone(),
        };
        resolution.factory.create(&binding).start(&[]);

        assert!(generic.is_empty());
        assert_eq!(specific.len(), 1);
    }
}

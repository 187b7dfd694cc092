//! Process definitions: the static graph every instance executes.
//!
//! Rules enforced while building:
//! 1. Parameter names are unique within a signature.
//! 2. Activity, application and participant IDs are unique.
//! 3. Transition endpoints name declared activities.
//! 4. Application bindings name declared activities and applications and
//!    supply exactly one data name per application parameter.
//! 5. Performers name declared participants.
//!
//! Declarations must therefore come before references: participants before
//! the activities that name them, activities before transitions, activities
//! and applications before `add_application`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::evaluator::{CelEvaluator, Evaluator};
use crate::instance::{InstanceConfig, ProcessInstance};
use crate::integration::{Integration, MappingIntegration};
use crate::models::{
    ensure_unique, ActivityDefinition, Application, ApplicationBinding, Parameter,
    ParticipantDefinition, TransitionDefinition,
};
use crate::DefinitionError;

/// The static process graph plus its injected collaborators.
///
/// Build it once, wrap it in an `Arc`, and share it with every instance.
pub struct ProcessDefinition {
    id: String,
    parameters: Vec<Parameter>,
    activities: BTreeMap<String, ActivityDefinition>,
    transitions: Vec<TransitionDefinition>,
    applications: HashMap<String, Application>,
    participants: HashMap<String, ParticipantDefinition>,
    integration: Arc<dyn Integration>,
    evaluator: Arc<dyn Evaluator>,
}

impl fmt::Debug for ProcessDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessDefinition")
            .field("id", &self.id)
            .field("parameters", &self.parameters)
            .field("activities", &self.activities)
            .field("transitions", &self.transitions)
            .field("applications", &self.applications)
            .field("participants", &self.participants)
            .finish_non_exhaustive()
    }
}

impl ProcessDefinition {
    /// An empty definition with no work item implementations and the
    /// [`CelEvaluator`] for guards.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parameters: Vec::new(),
            activities: BTreeMap::new(),
            transitions: Vec::new(),
            applications: HashMap::new(),
            participants: HashMap::new(),
            integration: Arc::new(MappingIntegration::new()),
            evaluator: Arc::new(CelEvaluator),
        }
    }

    pub fn with_integration(mut self, integration: impl Integration + 'static) -> Self {
        self.integration = Arc::new(integration);
        self
    }

    pub fn with_evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    // -----------------------------------------------------------------------
    // Builder
    // -----------------------------------------------------------------------

    /// Append parameters to the process signature.
    pub fn define_parameters(
        &mut self,
        parameters: impl IntoIterator<Item = Parameter>,
    ) -> Result<(), DefinitionError> {
        let mut combined = self.parameters.clone();
        combined.extend(parameters);
        ensure_unique(&format!("process '{}'", self.id), &combined)?;
        self.parameters = combined;
        Ok(())
    }

    pub fn define_participants<K: Into<String>>(
        &mut self,
        participants: impl IntoIterator<Item = (K, ParticipantDefinition)>,
    ) -> Result<(), DefinitionError> {
        for (id, participant) in participants {
            let id = id.into();
            if self.participants.contains_key(&id) {
                return Err(DefinitionError::DuplicateParticipant(id));
            }
            self.participants.insert(id, participant);
        }
        Ok(())
    }

    pub fn define_activities<K: Into<String>>(
        &mut self,
        activities: impl IntoIterator<Item = (K, ActivityDefinition)>,
    ) -> Result<(), DefinitionError> {
        for (id, mut activity) in activities {
            let id = id.into();
            if self.activities.contains_key(&id) {
                return Err(DefinitionError::DuplicateActivity(id));
            }
            if let Some(performer) = &activity.performer {
                if !self.participants.contains_key(performer) {
                    return Err(DefinitionError::UnknownParticipant {
                        activity: id,
                        participant: performer.clone(),
                    });
                }
            }
            for binding in &activity.applications {
                self.check_binding(&id, binding)?;
            }
            activity.id = id.clone();
            self.activities.insert(id, activity);
        }
        Ok(())
    }

    pub fn define_transitions(
        &mut self,
        transitions: impl IntoIterator<Item = TransitionDefinition>,
    ) -> Result<(), DefinitionError> {
        for transition in transitions {
            if !self.activities.contains_key(&transition.from) {
                return Err(DefinitionError::UnknownActivity {
                    id: transition.from,
                    side: "from",
                });
            }
            if !self.activities.contains_key(&transition.to) {
                return Err(DefinitionError::UnknownActivity {
                    id: transition.to,
                    side: "to",
                });
            }
            self.transitions.push(transition);
        }
        Ok(())
    }

    pub fn define_applications<K: Into<String>>(
        &mut self,
        applications: impl IntoIterator<Item = (K, Application)>,
    ) -> Result<(), DefinitionError> {
        for (id, application) in applications {
            let id = id.into();
            if self.applications.contains_key(&id) {
                return Err(DefinitionError::DuplicateApplication(id));
            }
            self.applications.insert(id, application);
        }
        Ok(())
    }

    /// Make `activity` dispatch `application`, binding its parameters
    /// positionally to the workflow-relevant data names in `arguments`.
    ///
    /// The data names need not match the application's own parameter names,
    /// so one application can be reused over different variables.
    pub fn add_application<S: Into<String>>(
        &mut self,
        activity: &str,
        application: &str,
        arguments: impl IntoIterator<Item = S>,
    ) -> Result<(), DefinitionError> {
        let binding = ApplicationBinding {
            application: application.to_owned(),
            arguments: arguments.into_iter().map(Into::into).collect(),
        };
        if !self.activities.contains_key(activity) {
            return Err(DefinitionError::UnknownActivity {
                id: activity.to_owned(),
                side: "binding",
            });
        }
        self.check_binding(activity, &binding)?;
        if let Some(definition) = self.activities.get_mut(activity) {
            definition.applications.push(binding);
        }
        debug!(activity, application, "application bound");
        Ok(())
    }

    fn check_binding(
        &self,
        activity: &str,
        binding: &ApplicationBinding,
    ) -> Result<(), DefinitionError> {
        let application = self.applications.get(&binding.application).ok_or_else(|| {
            DefinitionError::UnknownApplication {
                activity: activity.to_owned(),
                application: binding.application.clone(),
            }
        })?;
        let expected = application.parameters().len();
        if binding.arguments.len() != expected {
            return Err(DefinitionError::ApplicationArity {
                activity: activity.to_owned(),
                application: binding.application.clone(),
                expected,
                got: binding.arguments.len(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Instances
    // -----------------------------------------------------------------------

    /// Create a new, not yet started instance of this process.
    pub fn instantiate(self: &Arc<Self>) -> ProcessInstance {
        ProcessInstance::new(Arc::clone(self), InstanceConfig::default())
    }

    pub fn instantiate_with(self: &Arc<Self>, config: InstanceConfig) -> ProcessInstance {
        ProcessInstance::new(Arc::clone(self), config)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The process signature, in declaration order.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Parameters `start` takes values for.
    pub fn input_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.is_input())
    }

    /// Parameters reported as process outputs on completion.
    pub fn output_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.is_output())
    }

    pub fn activity(&self, id: &str) -> Option<&ActivityDefinition> {
        self.activities.get(id)
    }

    /// All activities, ordered by ID.
    pub fn activities(&self) -> impl Iterator<Item = &ActivityDefinition> {
        self.activities.values()
    }

    /// All transitions, in declaration order.
    pub fn transitions(&self) -> &[TransitionDefinition] {
        &self.transitions
    }

    pub fn application(&self, id: &str) -> Option<&Application> {
        self.applications.get(id)
    }

    /// Transitions into `activity` as `(declaration index, transition)`.
    pub fn incoming<'a>(
        &'a self,
        activity: &'a str,
    ) -> impl Iterator<Item = (usize, &'a TransitionDefinition)> + 'a {
        self.transitions
            .iter()
            .enumerate()
            .filter(move |(_, t)| t.to == activity)
    }

    /// Transitions out of `activity` as `(declaration index, transition)`.
    pub fn outgoing<'a>(
        &'a self,
        activity: &'a str,
    ) -> impl Iterator<Item = (usize, &'a TransitionDefinition)> + 'a {
        self.transitions
            .iter()
            .enumerate()
            .filter(move |(_, t)| t.from == activity)
    }

    /// Activities without incoming transitions, ordered by ID.
    pub fn initial_activities(&self) -> Vec<&str> {
        self.activities
            .keys()
            .filter(|id| !self.transitions.iter().any(|t| &t.to == *id))
            .map(String::as_str)
            .collect()
    }

    pub(crate) fn integration(&self) -> &dyn Integration {
        self.integration.as_ref()
    }

    pub(crate) fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator.as_ref()
    }
}

//! Static process-graph types.
//!
//! These types describe *what* a process looks like; they carry no runtime
//! state.  A [`ProcessDefinition`](crate::definition::ProcessDefinition) owns
//! them and validates every cross-reference as they are added.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::DefinitionError;

// ---------------------------------------------------------------------------
// Parameter
// ---------------------------------------------------------------------------

/// Which way a parameter's value flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
    InputOutput,
}

/// A named, directional slot in a process or application signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub direction: Direction,
}

impl Parameter {
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            direction,
        }
    }

    pub fn input(name: impl Into<String>) -> Self {
        Self::new(name, Direction::Input)
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self::new(name, Direction::Output)
    }

    pub fn input_output(name: impl Into<String>) -> Self {
        Self::new(name, Direction::InputOutput)
    }

    /// A value flows in (Input or InputOutput).
    pub fn is_input(&self) -> bool {
        matches!(self.direction, Direction::Input | Direction::InputOutput)
    }

    /// A value flows out (Output or InputOutput).
    pub fn is_output(&self) -> bool {
        matches!(self.direction, Direction::Output | Direction::InputOutput)
    }
}

/// Reject a signature in which two parameters share a name.
pub(crate) fn ensure_unique<'a>(
    owner: &str,
    parameters: impl IntoIterator<Item = &'a Parameter>,
) -> Result<(), DefinitionError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for parameter in parameters {
        if !seen.insert(parameter.name.as_str()) {
            return Err(DefinitionError::DuplicateParameter {
                owner: owner.to_owned(),
                name: parameter.name.clone(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// A unit of work with an ordered call signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    parameters: Vec<Parameter>,
}

impl Application {
    /// # Errors
    /// [`DefinitionError::DuplicateParameter`] if two parameters share a name.
    pub fn new(parameters: impl IntoIterator<Item = Parameter>) -> Result<Self, DefinitionError> {
        let parameters: Vec<Parameter> = parameters.into_iter().collect();
        ensure_unique("application signature", &parameters)?;
        Ok(Self { parameters })
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Number of values `WorkItem::start` receives.
    pub fn input_count(&self) -> usize {
        self.parameters.iter().filter(|p| p.is_input()).count()
    }

    /// Number of values `work_item_finished` must report.
    pub fn output_count(&self) -> usize {
        self.parameters.iter().filter(|p| p.is_output()).count()
    }
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// A declared performer role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDefinition {
    pub name: String,
}

impl ParticipantDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

// ---------------------------------------------------------------------------
// ActivityDefinition
// ---------------------------------------------------------------------------

/// How an activity with several incoming transitions activates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Activate every time any incoming transition fires.
    #[default]
    Or,
    /// Activate once every declared incoming transition has fired.
    And,
}

/// Which of an activity's true outgoing transitions fire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Every transition whose guard holds.
    #[default]
    Or,
    /// Only the first transition (in declaration order) whose guard holds.
    Xor,
}

/// An application an activity dispatches, with the workflow-relevant data
/// names its parameters are bound to (positionally).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationBinding {
    pub application: String,
    pub arguments: Vec<String>,
}

/// A node in the static process graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDefinition {
    /// Set by the owning definition when the activity is declared.
    pub id: String,
    /// Participant selector handed to the integration.
    pub performer: Option<String>,
    pub join: JoinPolicy,
    pub split: SplitPolicy,
    pub(crate) applications: Vec<ApplicationBinding>,
}

impl ActivityDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_performer(mut self, performer: impl Into<String>) -> Self {
        self.performer = Some(performer.into());
        self
    }

    pub fn with_join(mut self, join: JoinPolicy) -> Self {
        self.join = join;
        self
    }

    pub fn with_split(mut self, split: SplitPolicy) -> Self {
        self.split = split;
        self
    }

    /// Applications in the order they are dispatched.
    pub fn applications(&self) -> &[ApplicationBinding] {
        &self.applications
    }
}

// ---------------------------------------------------------------------------
// TransitionDefinition
// ---------------------------------------------------------------------------

/// Directed edge from one activity to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDefinition {
    pub from: String,
    pub to: String,
    /// Guard expression; `None` always fires.
    pub condition: Option<String>,
}

impl TransitionDefinition {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

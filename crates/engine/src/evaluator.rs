//! Transition guard evaluation.
//!
//! The engine only depends on the [`Evaluator`] trait.  [`CelEvaluator`] is the
//! built-in default and evaluates guards as CEL expressions, with every
//! workflow-relevant data entry bound as a variable.

use cel_interpreter::{Context, Program, Value as CelValue};
use serde_json::Value;

use crate::{EvaluationError, WorkflowData};

/// Evaluates a guard expression against workflow-relevant data.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, expression: &str, data: &WorkflowData) -> Result<bool, EvaluationError>;
}

impl<F> Evaluator for F
where
    F: Fn(&str, &WorkflowData) -> Result<bool, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, expression: &str, data: &WorkflowData) -> Result<bool, EvaluationError> {
        self(expression, data)
    }
}

/// Default guard evaluator backed by `cel-interpreter`.
///
/// Guards are ordinary CEL: `x > 1 && name == 'ada'`, `!(flag)`,
/// `'b' in tags`, `order.total >= 10`.  A guard must produce a boolean;
/// any other result, a syntax error or a reference to an unknown variable is
/// an [`EvaluationError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CelEvaluator;

impl Evaluator for CelEvaluator {
    fn evaluate(&self, expression: &str, data: &WorkflowData) -> Result<bool, EvaluationError> {
        let program = Program::compile(expression).map_err(|e| {
            EvaluationError::new(format!("failed to compile '{expression}': {e}"))
        })?;

        let mut context = Context::default();
        for (name, value) in data.iter() {
            bind_variable(&mut context, name, value).map_err(|e| {
                EvaluationError::new(format!("failed to bind variable '{name}': {e}"))
            })?;
        }

        let result = program.execute(&context).map_err(|e| {
            EvaluationError::new(format!("failed to evaluate '{expression}': {e}"))
        })?;
        match result {
            CelValue::Bool(b) => Ok(b),
            other => Err(EvaluationError::new(format!(
                "'{expression}' returned {other:?}, not a boolean"
            ))),
        }
    }
}

/// Integers that fit go in as CEL `int` so they compare exactly against
/// integer literals; everything else goes through serde.
fn bind_variable(
    context: &mut Context,
    name: &str,
    value: &Value,
) -> Result<(), Box<dyn std::error::Error>> {
    match value.as_i64() {
        Some(i) => context.add_variable(name, i)?,
        None => context.add_variable(name, value.clone())?,
    }
    Ok(())
}

//! Column-level partial updates for a session row.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::{self, ColumnKind, ModuleKind, QuestionColumns};
use crate::error::ValidationError;
use crate::models::Answer;

/// A set of column -> value assignments. Columns not present are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPatch(BTreeMap<String, Value>);

impl FieldPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Checks every column against the catalog: known, patchable, and a value
    /// of the right shape (or null).
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in &self.0 {
            let column = catalog::column(name)
                .ok_or_else(|| ValidationError::UnknownColumn(name.clone()))?;
            if !column.patchable {
                return Err(ValidationError::ReadOnlyColumn(name.clone()));
            }
            check_kind(name, column.kind, value)?;
        }
        Ok(())
    }

    /// Patch for the answer to `question` of `module`, including the elapsed
    /// seconds column when the question has one.
    pub fn for_answer(
        module: ModuleKind,
        question: usize,
        answer: &Answer,
        elapsed_seconds: i64,
    ) -> Result<Self, ValidationError> {
        let columns = module
            .question_columns(question)
            .ok_or_else(|| ValidationError::UnknownColumn(format!("{module}_q{}", question + 1)))?;

        let mut patch = FieldPatch::new();
        match columns {
            QuestionColumns::Scored { score, time } => {
                let value = match (answer.correct, &answer.value) {
                    (Some(correct), _) => Value::from(i64::from(correct)),
                    (None, Value::Bool(b)) => Value::from(i64::from(*b)),
                    (None, v @ Value::Number(_)) => v.clone(),
                    (None, other) => {
                        return Err(ValidationError::ColumnType {
                            column: score,
                            expected: "score or graded answer",
                            actual: type_name(other).to_string(),
                        })
                    }
                };
                patch.set(score, value);
                patch.set(time, elapsed_seconds);
            }
            QuestionColumns::Media { url } => match &answer.value {
                Value::String(s) => patch.set(url, s.clone()),
                other => {
                    return Err(ValidationError::ColumnType {
                        column: url,
                        expected: "media url",
                        actual: type_name(other).to_string(),
                    })
                }
            },
            QuestionColumns::Reactions { slots } => {
                let reactions = match &answer.value {
                    Value::Array(items) => items.clone(),
                    other => {
                        return Err(ValidationError::ColumnType {
                            column: slots.first().cloned().unwrap_or_default(),
                            expected: "array of reaction times",
                            actual: type_name(other).to_string(),
                        })
                    }
                };
                for (i, slot) in slots.into_iter().enumerate() {
                    patch.set(slot, reactions.get(i).cloned().unwrap_or(Value::Null));
                }
            }
        }
        patch.validate()?;
        Ok(patch)
    }
}

impl From<Map<String, Value>> for FieldPatch {
    fn from(map: Map<String, Value>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl IntoIterator for FieldPatch {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn check_kind(name: &str, kind: ColumnKind, value: &Value) -> Result<(), ValidationError> {
    let ok = match (kind, value) {
        (_, Value::Null) => true,
        (ColumnKind::Integer, Value::Number(n)) => n.as_i64().is_some(),
        (ColumnKind::Text, Value::String(_)) => true,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(ValidationError::ColumnType {
            column: name.to_string(),
            expected: kind.name(),
            actual: type_name(value).to_string(),
        })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A value submitted for the current question.
///
/// `value` is opaque to the wizard: answer text, a numeric score, a media URL,
/// or an array for multi-select and reaction-time questions. `correct` is set
/// by the caller when the module grades the answer itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,
}

impl Answer {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            correct: None,
        }
    }

    pub fn graded(value: impl Into<Value>, correct: bool) -> Self {
        Self {
            value: value.into(),
            correct: Some(correct),
        }
    }

    /// Null, blank strings and empty arrays or objects count as "no answer".
    pub fn is_empty(&self) -> bool {
        match &self.value {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        }
    }
}

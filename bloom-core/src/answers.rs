use std::collections::BTreeMap;

use serde_json::Value;

/// In-memory snapshot of everything answered so far, keyed by module then
/// question. Values are opaque; modules store whatever shape they need.
#[derive(Debug, Default, Clone)]
pub struct AnswerAggregator {
    modules: BTreeMap<String, BTreeMap<String, Value>>,
}

impl AnswerAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under (module, question), replacing any earlier value.
    pub fn record(&mut self, module: &str, question: &str, value: Value) {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(question.to_string(), value);
    }

    pub fn get(&self, module: &str, question: &str) -> Option<&Value> {
        self.modules.get(module).and_then(|m| m.get(question))
    }

    pub fn len(&self) -> usize {
        self.modules.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, Value>> {
        self.modules.clone()
    }
}

//! Rule registry - transformation rules grouped per stream.

use std::collections::HashMap;

use crate::rule::TransformationRule;

/// Read-only map from stream name to its rules, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: HashMap<String, Vec<TransformationRule>>,
}

impl RuleRegistry {
    pub fn new(rules: impl IntoIterator<Item = TransformationRule>) -> Self {
        let mut grouped: HashMap<String, Vec<TransformationRule>> = HashMap::new();
        for rule in rules {
            grouped
                .entry(rule.stream_name.clone())
                .or_default()
                .push(rule);
        }
        Self { rules: grouped }
    }

    /// Rules for `stream`; empty if none are registered.
    pub fn rules_for(&self, stream: &str) -> &[TransformationRule] {
        self.rules.get(stream).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn streams(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Total number of rules across all streams.
    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<TransformationRule> for RuleRegistry {
    fn from_iter<T: IntoIterator<Item = TransformationRule>>(iter: T) -> Self {
        Self::new(iter)
    }
}

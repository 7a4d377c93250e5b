use tracing::debug;

use super::rule::{Frequency, RecurrenceRule};

/// The recurrence rules an organization's obligations draw on.
#[derive(Debug, Clone, Default)]
pub struct RecurrenceBook {
    rules: Vec<RecurrenceRule>,
}

impl RecurrenceBook {
    pub fn new(rules: impl IntoIterator<Item = RecurrenceRule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    pub fn rules(&self) -> &[RecurrenceRule] {
        &self.rules
    }

    /// The rule named by `key`, else the newest active rule for `frequency`,
    /// else a calendar-aligned standard rule.
    pub fn lookup(&self, key: Option<&str>, frequency: Frequency) -> RecurrenceRule {
        if let Some(key) = key {
            let named = self
                .rules
                .iter()
                .filter(|rule| rule.status.is_active() && rule.key == key)
                .max_by_key(|rule| rule.version);
            if let Some(rule) = named {
                return rule.clone();
            }
            debug!(key, %frequency, "recurrence rule not found, falling back to frequency");
        }

        self.rules
            .iter()
            .filter(|rule| rule.status.is_active() && rule.frequency == frequency)
            .max_by_key(|rule| rule.version)
            .cloned()
            .unwrap_or_else(|| RecurrenceRule::standard(frequency))
    }
}

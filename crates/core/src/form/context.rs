//! Session mode and widget naming.

use crate::constants::WIDGET_PREFIX;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a form session was opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// A new encounter.
    #[default]
    Enter,
    /// An existing encounter, widgets prefilled.
    Edit,
    /// An existing encounter, read only.
    View,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Enter => "enter",
            Mode::Edit => "edit",
            Mode::View => "view",
        };
        f.write_str(s)
    }
}

/// Hands out widget field names and remembers which label each widget was rendered under.
///
/// The label of a widget is the last non-empty line of text seen since the previous widget.
/// When two widgets share a label the first one keeps it.
#[derive(Clone, Debug, Default)]
pub(crate) struct WidgetRegistry {
    count: u32,
    pending_text: String,
    by_label: BTreeMap<String, String>,
}

impl WidgetRegistry {
    /// Records text rendered between widgets.
    pub(crate) fn observe_text(&mut self, text: &str) {
        self.pending_text.push_str(text);
    }

    /// Allocates the next field name and labels it with the pending text.
    pub(crate) fn register(&mut self) -> String {
        self.count += 1;
        let field = format!("{WIDGET_PREFIX}{}", self.count);

        let label = self
            .pending_text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map(str::to_string);
        self.pending_text.clear();

        if let Some(label) = label {
            self.by_label.entry(label).or_insert_with(|| field.clone());
        }
        field
    }

    pub(crate) fn into_labels(self) -> BTreeMap<String, String> {
        self.by_label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_is_last_non_empty_line() {
        let mut registry = WidgetRegistry::default();
        registry.observe_text("Heading\n  Enrollment Date: ");
        registry.observe_text("\n   \n");
        assert_eq!(registry.register(), "w1");

        registry.observe_text("Encounter Date:");
        assert_eq!(registry.register(), "w2");

        // no text since the previous widget
        assert_eq!(registry.register(), "w3");

        registry.observe_text("Encounter Date:");
        assert_eq!(registry.register(), "w4");

        let labels = registry.into_labels();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["Enrollment Date:"], "w1");
        assert_eq!(labels["Encounter Date:"], "w2");
    }
}

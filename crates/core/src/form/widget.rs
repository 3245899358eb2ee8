//! HTML for form inputs.

use super::context::Mode;
use crate::constants::{DATE_FORMAT, DATE_PICKER_SCRIPT};
use chrono::NaiveDate;
use htmlform::{escape_attribute, escape_text};

/// One selectable value of a dropdown or radio group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct WidgetOption {
    pub value: String,
    pub label: String,
}

impl WidgetOption {
    pub(crate) fn new(value: impl ToString, label: impl Into<String>) -> Self {
        Self {
            value: value.to_string(),
            label: label.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Widget {
    Date {
        field: String,
        value: Option<NaiveDate>,
    },
    /// Dropdown with a leading empty option.
    Select {
        field: String,
        options: Vec<WidgetOption>,
        selected: Option<String>,
    },
    Radio {
        field: String,
        options: Vec<WidgetOption>,
        selected: Option<String>,
    },
    Hidden {
        field: String,
        value: String,
    },
    Submit {
        label: String,
    },
}

impl Widget {
    pub(crate) fn render(&self, mode: Mode) -> String {
        if mode == Mode::View {
            return self.render_value();
        }

        match self {
            Widget::Date { field, value } => {
                let field = escape_attribute(field);
                let value = value
                    .map(|d| d.format(DATE_FORMAT).to_string())
                    .unwrap_or_default();
                format!(
                    "<input type=\"date\" name=\"{field}\" id=\"{field}\" value=\"{value}\"/>\
                     <script type=\"text/javascript\">{DATE_PICKER_SCRIPT}('{field}');</script>"
                )
            }
            Widget::Select {
                field,
                options,
                selected,
            } => {
                let field = escape_attribute(field);
                let mut out = format!("<select name=\"{field}\" id=\"{field}\"><option value=\"\"></option>");
                for option in options {
                    out.push_str(&format!(
                        "<option value=\"{}\"{}>{}</option>",
                        escape_attribute(&option.value),
                        selected_attr(selected, option, "selected"),
                        escape_text(&option.label)
                    ));
                }
                out.push_str("</select>");
                out
            }
            Widget::Radio {
                field,
                options,
                selected,
            } => {
                let field = escape_attribute(field);
                let mut out = String::new();
                for option in options {
                    let value = escape_attribute(&option.value);
                    out.push_str(&format!(
                        "<span class=\"radio\"><input type=\"radio\" name=\"{field}\" id=\"{field}_{value}\" value=\"{value}\"{}/>\
                         <label for=\"{field}_{value}\">{}</label></span>",
                        selected_attr(selected, option, "checked"),
                        escape_text(&option.label)
                    ));
                }
                out
            }
            Widget::Hidden { field, value } => {
                let field = escape_attribute(field);
                format!(
                    "<input type=\"hidden\" name=\"{field}\" id=\"{field}\" value=\"{}\"/>",
                    escape_attribute(value)
                )
            }
            Widget::Submit { label } => format!(
                "<input type=\"submit\" class=\"submitButton\" value=\"{}\"/>",
                escape_attribute(label)
            ),
        }
    }

    /// Read-only rendering used in view mode.
    fn render_value(&self) -> String {
        let shown = match self {
            Widget::Date { value, .. } => value
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
            Widget::Select {
                options, selected, ..
            }
            | Widget::Radio {
                options, selected, ..
            } => options
                .iter()
                .find(|o| selected.as_deref() == Some(o.value.as_str()))
                .map(|o| o.label.clone())
                .unwrap_or_default(),
            Widget::Hidden { .. } | Widget::Submit { .. } => return String::new(),
        };
        format!("<span class=\"value\">{}</span>", escape_text(&shown))
    }
}

fn selected_attr(selected: &Option<String>, option: &WidgetOption, attribute: &str) -> String {
    if selected.as_deref() == Some(option.value.as_str()) {
        format!(" {attribute}=\"{attribute}\"")
    } else {
        String::new()
    }
}

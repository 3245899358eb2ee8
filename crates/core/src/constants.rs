//! Constants used throughout the form-entry core crate.

/// Directory searched for form templates when no explicit directory is configured.
pub const FORM_DIR: &str = "forms";

/// File extension of form templates.
pub const FORM_FILE_EXTENSION: &str = "html";

/// Format of every date posted by, or rendered into, a widget.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Generated widget field names are this prefix followed by a counter starting at 1.
pub const WIDGET_PREFIX: &str = "w";

/// Client-side function attached to rendered date widgets.
pub const DATE_PICKER_SCRIPT: &str = "setupDatePicker";

/// Label of the submit button when the template does not set one.
pub const DEFAULT_SUBMIT_LABEL: &str = "Enter Form";

/// Longest accepted form name.
pub const MAX_FORM_NAME_LEN: usize = 128;

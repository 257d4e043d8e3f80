//! Structured, human-readable reports of recoverable problems.

use std::fmt;

/// Category of a recoverable problem surfaced by a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// A container or artifact could not be opened.
    OpenFailure,
    /// A derived field name already exists.
    SchemaConflict,
    /// A value exceeded the range of its narrower target type.
    ValueOverflow,
    /// A field name was shortened to fit the interchange format.
    FieldTruncated,
    /// One layer, field, feature or artifact could not be created.
    CreationFailure,
    /// A feature could not be read from its source.
    ReadFailure,
    /// The external version-control tool reported failure.
    ToolFailure,
}

impl Category {
    /// Short label used when rendering diagnostics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::OpenFailure => "open-failure",
            Self::SchemaConflict => "schema-conflict",
            Self::ValueOverflow => "value-overflow",
            Self::FieldTruncated => "field-truncated",
            Self::CreationFailure => "creation-failure",
            Self::ReadFailure => "read-failure",
            Self::ToolFailure => "tool-failure",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A recoverable problem tied to the entity it affected.
///
/// # Examples
/// ```
/// use layersync_core::{Category, Diagnostic};
///
/// let diagnostic = Diagnostic::new(Category::ValueOverflow, "PlochyRZV_p.kod#4", "3000000000");
/// assert_eq!(diagnostic.to_string(), "[value-overflow] PlochyRZV_p.kod#4: 3000000000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// What went wrong.
    pub category: Category,
    /// Identifier of the affected layer, field, feature or artifact.
    pub subject: String,
    /// Free-form detail, usually the underlying error message.
    pub detail: String,
}

impl Diagnostic {
    /// Create a diagnostic.
    pub fn new(category: Category, subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            category,
            subject: subject.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.category, self.subject, self.detail)
    }
}

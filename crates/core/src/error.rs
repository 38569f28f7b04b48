use crate::field_id::FieldIdentifier;

/// A submitted value that could not be converted to the widget's typed value.
///
/// Parse errors never abort a submission: the owning element folds them into its
/// [`SubmissionError`] list against the paired error widget.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot parse '{raw}' ({message_key})")]
pub struct ParseError {
    pub message_key: &'static str,
    pub raw: String,
}

impl ParseError {
    pub fn new(message_key: &'static str, raw: impl Into<String>) -> Self {
        Self {
            message_key,
            raw: raw.into(),
        }
    }
}

/// Failure reported by an external lookup collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("record lookup failed: {0}")]
pub struct LookupError(pub String);

#[derive(Debug, thiserror::Error)]
pub enum FormError {
    // Configuration errors: fatal while the form is being built.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("missing required attribute '{0}'")]
    MissingAttribute(String),
    #[error("invalid value '{value}' for attribute '{attribute}'")]
    InvalidAttribute { attribute: String, value: String },
    #[error("cannot find {kind}: {key}")]
    UnresolvedEntity { kind: &'static str, key: String },

    // Programming errors: invariant violations, never shown to users.
    #[error("widget {0} is not registered in this context")]
    UnregisteredWidget(String),
    #[error("field {0} belongs to a different form entry context")]
    ForeignField(String),
    #[error("widget {0} already has an error widget")]
    DuplicateErrorWidget(String),
    #[error("mode {mode} {reason}")]
    ModeMismatch { mode: String, reason: &'static str },
    #[error("a form opened in VIEW mode does not accept submissions")]
    ReadOnlyMode,

    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl FormError {
    /// True for errors that belong next to a field rather than aborting the operation.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, FormError::Parse(_))
    }

    pub(crate) fn invalid_attribute(attribute: &str, value: &str) -> Self {
        FormError::InvalidAttribute {
            attribute: attribute.to_owned(),
            value: value.to_owned(),
        }
    }

    pub(crate) fn unresolved(kind: &'static str, key: impl Into<String>) -> Self {
        FormError::UnresolvedEntity {
            kind,
            key: key.into(),
        }
    }
}

pub type FormResult<T> = std::result::Result<T, FormError>;

/// One validation failure, keyed by the error widget that displays it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionError {
    pub field: String,
    pub message_key: String,
}

impl SubmissionError {
    pub fn new(field: &FieldIdentifier, message_key: impl Into<String>) -> Self {
        Self {
            field: field.as_str().to_owned(),
            message_key: message_key.into(),
        }
    }
}

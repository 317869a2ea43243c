use crate::location::SourceLocation;

/// Request-schema violation: missing key, unknown key, or wrong type.
///
/// Non-retriable and never downgradable — schema violations are programmer
/// errors in the calling policy, not transient runtime conditions.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    #[error("{builtin}: unknown key(s) {keys:?} at {location}")]
    UnknownKeys { builtin: String, keys: Vec<String>, location: SourceLocation },

    #[error("{builtin}: missing required key(s) {keys:?} at {location}")]
    MissingKeys { builtin: String, keys: Vec<String>, location: SourceLocation },

    #[error("{builtin}: key '{key}' must be a {expected}, got {got} at {location}")]
    WrongType { builtin: String, key: String, expected: String, got: String, location: SourceLocation },

    #[error("{builtin}: key '{key}' has an invalid value: {message} at {location}")]
    InvalidValue { builtin: String, key: String, message: String, location: SourceLocation },
}

impl TypeError {
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownKeys { .. } => "type_unknown_keys",
            Self::MissingKeys { .. } => "type_missing_keys",
            Self::WrongType { .. } => "type_wrong_type",
            Self::InvalidValue { .. } => "type_invalid_value",
        }
    }

    pub const fn location(&self) -> &SourceLocation {
        match self {
            Self::UnknownKeys { location, .. }
            | Self::MissingKeys { location, .. }
            | Self::WrongType { location, .. }
            | Self::InvalidValue { location, .. } => location,
        }
    }
}

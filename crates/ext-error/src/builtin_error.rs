use crate::location::SourceLocation;

/// Execution error surfaced by a backend (SQL driver, AWS SDK, document
/// store driver, key-value client, graph driver, Vault).
///
/// Retriable in principle, but the framework never retries on its own —
/// rule-language semantics are per-call and retrying would change them.
#[derive(Debug, thiserror::Error)]
#[error("{builtin}: {message}")]
pub struct BuiltinError {
    pub builtin:  String,
    pub message:  String,
    pub location: SourceLocation,
    /// Backend-specific code, when the driver's error type carries one
    /// (SQL state/number, AWS API error code, HTTP status, ...).
    pub code:     Option<String>,
    pub severity: Option<String>,
    pub detail:   Option<String>,
}

impl BuiltinError {
    pub fn new(builtin: impl Into<String>, message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            builtin: builtin.into(),
            message: message.into(),
            location,
            code: None,
            severity: None,
            detail: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub const fn error_code(&self) -> &'static str {
        "builtin_error"
    }
}

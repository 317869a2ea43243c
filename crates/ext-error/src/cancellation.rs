/// The host request context was cancelled while a builtin call was in
/// flight. Surfaced verbatim; never cached, never downgraded.
#[derive(Debug, thiserror::Error)]
#[error("request cancelled during {builtin}")]
pub struct CancellationError {
    pub builtin: String,
}

impl CancellationError {
    pub fn new(builtin: impl Into<String>) -> Self {
        Self { builtin: builtin.into() }
    }

    pub const fn error_code(&self) -> &'static str {
        "cancelled"
    }
}

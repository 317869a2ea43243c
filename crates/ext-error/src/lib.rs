//! Unified error types shared by every crate in the builtin framework.
//!
//! The taxonomy mirrors §7 of the framework design: [`TypeError`] for
//! request-schema violations, [`BuiltinError`] for backend execution
//! failures, [`CancellationError`] for host-initiated cancellation, and
//! [`CompilationError`] for the nested rule-language evaluator. All four
//! fold into [`ExtError`], the type every builtin's `Result` uses.

// Error variants are self-documenting via their #[error(...)] messages.
#![allow(missing_docs)]

mod builtin_error;
mod cancellation;
mod compilation;
mod config;
mod location;
mod type_error;

pub use builtin_error::BuiltinError;
pub use cancellation::CancellationError;
pub use compilation::CompilationError;
pub use config::ConfigError;
pub use location::SourceLocation;
pub use type_error::TypeError;

/// Result alias used throughout the builtin framework.
pub type Result<T> = std::result::Result<T, ExtError>;

/// Unified error type wrapping every domain error kind.
#[derive(Debug, thiserror::Error)]
pub enum ExtError {
    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Builtin(#[from] BuiltinError),

    #[error(transparent)]
    Cancelled(#[from] CancellationError),

    #[error(transparent)]
    Compilation(#[from] CompilationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source:  Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ExtError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Whether `raise_error: false` may downgrade this error into a data
    /// `{error: {...}}` response instead of aborting the evaluation.
    ///
    /// `TypeError` is excluded: request-schema violations are programmer
    /// errors, not runtime conditions. `CancellationError` is excluded too:
    /// a cancelled request must abort regardless of `raise_error` (§7).
    pub const fn is_downgradable(&self) -> bool {
        !matches!(self, Self::Type(_) | Self::Cancelled(_))
    }

    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Type(e) => e.error_code(),
            Self::Builtin(e) => e.error_code(),
            Self::Cancelled(e) => e.error_code(),
            Self::Compilation(e) => e.error_code(),
            Self::Config(e) => e.error_code(),
            Self::Internal { .. } => "internal_error",
        }
    }
}

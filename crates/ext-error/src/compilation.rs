/// The ad-hoc module passed to the nested rule-language evaluator
/// (`rego.eval`) failed to parse or compile.
#[derive(Debug, thiserror::Error)]
#[error("module '{module}' failed to compile: {message}")]
pub struct CompilationError {
    pub module:  String,
    pub message: String,
}

impl CompilationError {
    pub fn new(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self { module: module.into(), message: message.into() }
    }

    pub const fn error_code(&self) -> &'static str {
        "compilation_error"
    }
}

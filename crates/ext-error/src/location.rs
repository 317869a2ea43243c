use std::fmt;

/// Position of a builtin call site within the compiled policy.
///
/// Mirrors the location info the rule-language compiler attaches to every
/// expression so that errors surfaced from a builtin can be traced back to
/// the exact line/column that invoked it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub row:  u32,
    pub col:  u32,
}

impl SourceLocation {
    pub const fn new(file: String, row: u32, col: u32) -> Self {
        Self { file, row, col }
    }

    /// A location used when the call site is not known (e.g. unit tests
    /// exercising a builtin directly rather than through the VM).
    pub fn unknown() -> Self {
        Self { file: "<unknown>".to_string(), row: 0, col: 0 }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.row, self.col)
    }
}

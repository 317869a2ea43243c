//! SQL dialect differences the translator must account for: identifier
//! quoting, string-literal escaping, and parameter placeholders.
//!
//! Grounded in the teacher's per-database `where_generator` modules
//! (`fraiseql_core::db::{postgres,mysql,sqlite,sqlserver}::where_generator`),
//! which differ along exactly these three axes.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Mysql,
    Sqlite,
    Postgres,
    Sqlserver,
}

impl Dialect {
    /// Unknown dialect names fall back to sqlite (`spec.md` §4.5).
    pub fn parse(name: &str) -> Self {
        match name {
            "mysql" => Self::Mysql,
            "postgres" => Self::Postgres,
            "sqlserver" => Self::Sqlserver,
            _ => Self::Sqlite,
        }
    }

    pub fn quote_identifier(self, ident: &str) -> String {
        match self {
            Self::Mysql => format!("`{ident}`"),
            Self::Sqlite | Self::Postgres => format!("\"{ident}\""),
            Self::Sqlserver => format!("[{ident}]"),
        }
    }

    /// Escape and quote a string literal, inlined directly into the
    /// generated SQL (`ucast.as_sql` returns a single string, not a
    /// parameterized query — see `spec.md` §9 Open Questions).
    pub fn string_literal(self, s: &str) -> String {
        let escaped = s.replace('\'', "''");
        match self {
            // Postgres accepts the escape-string syntax (`E'...'`), which
            // the reference scenario (spec.md §8 S4) uses verbatim.
            Self::Postgres => format!("E'{escaped}'"),
            Self::Mysql | Self::Sqlite | Self::Sqlserver => format!("'{escaped}'"),
        }
    }

    pub fn number_literal(self, n: &crate::value::Number) -> String {
        n.literal().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_dialect_falls_back_to_sqlite() {
        assert_eq!(Dialect::parse("oracle"), Dialect::Sqlite);
    }

    #[test]
    fn postgres_uses_escape_string_syntax() {
        assert_eq!(Dialect::Postgres.string_literal("bob"), "E'bob'");
    }

    #[test]
    fn quoting_differs_by_dialect() {
        assert_eq!(Dialect::Mysql.quote_identifier("t"), "`t`");
        assert_eq!(Dialect::Sqlserver.quote_identifier("t"), "[t]");
        assert_eq!(Dialect::Postgres.quote_identifier("t"), "\"t\"");
    }
}

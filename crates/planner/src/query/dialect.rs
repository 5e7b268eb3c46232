//! Defines the `Dialect` trait for database-specific SQL syntax.

pub trait Dialect: Send + Sync {
    /// Wraps an identifier (like a table or column name) in the correct
    /// quotation marks for the dialect, escaping embedded quote characters.
    ///
    /// - PostgreSQL uses double quotes: `"my_column"`
    fn quote_identifier(&self, ident: &str) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn quote_identifier(&self, ident: &str) -> String {
        format!(r#""{}""#, ident.replace('"', r#""""#))
    }
}

#[cfg(test)]
mod tests {
    use super::{Dialect, Postgres};

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(Postgres.quote_identifier("id"), r#""id""#);
        assert_eq!(Postgres.quote_identifier(r#"odd"name"#), r#""odd""name""#);
    }
}

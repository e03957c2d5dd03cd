use crate::error::{BunnyError, BunnyResult};

/// Engine-specific SQL fragments. Resolved once at client construction, not
/// per query — an unsupported dialect name should fail fast before any SQL
/// gets built against it.
pub trait SqlDialect: Send + Sync {
    /// The engine's expression for `year(date_expr) - year_of_birth`.
    fn year_difference(&self, date_expr: &str, year_of_birth_expr: &str) -> String;

    fn name(&self) -> &'static str;
}

pub struct Postgres;

impl SqlDialect for Postgres {
    fn year_difference(&self, date_expr: &str, year_of_birth_expr: &str) -> String {
        format!("date_part('year', {date_expr}) - {year_of_birth_expr}")
    }

    fn name(&self) -> &'static str {
        "postgresql"
    }
}

pub struct Mssql;

impl SqlDialect for Mssql {
    fn year_difference(&self, date_expr: &str, year_of_birth_expr: &str) -> String {
        format!("DATEPART(year, {date_expr}) - {year_of_birth_expr}")
    }

    fn name(&self) -> &'static str {
        "mssql"
    }
}

/// Resolves the dialect for an engine name, failing fast on anything not
/// explicitly supported rather than producing broken SQL later.
pub fn for_engine(name: &str) -> BunnyResult<Box<dyn SqlDialect>> {
    match name {
        "postgresql" => Ok(Box::new(Postgres)),
        "mssql" => Ok(Box::new(Mssql)),
        other => Err(BunnyError::UnsupportedOperation(format!(
            "unsupported database dialect: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_year_diff() {
        let dialect = for_engine("postgresql").unwrap();
        assert_eq!(
            dialect.year_difference("condition_start_date", "year_of_birth"),
            "date_part('year', condition_start_date) - year_of_birth"
        );
    }

    #[test]
    fn mssql_year_diff() {
        let dialect = for_engine("mssql").unwrap();
        assert_eq!(
            dialect.year_difference("condition_start_date", "year_of_birth"),
            "DATEPART(year, condition_start_date) - year_of_birth"
        );
    }

    #[test]
    fn unsupported_dialect_fails_fast() {
        assert!(for_engine("duckdb").is_err());
    }
}

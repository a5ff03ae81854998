//! Database dialects for SQL rendering.
//!
//! Each dialect implements [`DialectFormatter`]; the renderer asks it for
//! everything that differs between databases and writes the rest itself.

mod postgres;
mod sqlserver;

pub use postgres::PostgresDialect;
pub use sqlserver::SqlServerDialect;

use crate::error::Result;
use crate::expr::{AggregateFunction, Expr, SqlType};
use crate::ir::{JoinKind, Select};

/// How a dialect spells `LIMIT`/`OFFSET`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    /// Written right after `SELECT [DISTINCT]`, e.g. `TOP (5)`.
    pub prefix: Option<String>,
    /// Written after `ORDER BY`.
    pub suffix: Option<String>,
    /// The suffix is only valid after an `ORDER BY`.
    pub requires_order_by: bool,
}

pub trait DialectFormatter: Send + Sync {
    fn name(&self) -> &str;

    /// Quote an identifier (table, alias or column name).
    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Placeholder for a captured query parameter.
    fn format_parameter_name(&self, name: &str) -> String;

    /// Boolean literal in value position.
    fn format_boolean(&self, value: bool) -> String {
        if value { "TRUE" } else { "FALSE" }.to_string()
    }

    /// False when boolean expressions cannot appear as values and boolean
    /// columns cannot appear as predicates.
    fn native_booleans(&self) -> bool {
        true
    }

    fn type_name(&self, ty: SqlType) -> &'static str;

    fn aggregate_name(&self, function: AggregateFunction) -> &'static str {
        match function {
            AggregateFunction::Count | AggregateFunction::LongCount => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Average => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }

    fn format_pagination(&self, limit: Option<&str>, offset: Option<&str>) -> Pagination;

    fn join_keyword(&self, kind: JoinKind) -> &'static str;

    /// Trailing clause of a join kind that has no predicate of its own.
    fn join_suffix(&self, _kind: JoinKind) -> Option<&'static str> {
        None
    }

    /// Whether a nested sequence can be projected as a single value.
    fn supports_complex_type_subqueries(&self) -> bool;

    /// Render a nested sequence so it yields its rows as one value. `render`
    /// writes a select within the current statement.
    fn format_complex_type_subquery(
        &self,
        select: &Select,
        render: &mut dyn FnMut(&Select) -> Result<String>,
    ) -> Result<String>;

    /// Whether a derived table may carry `ORDER BY` without pagination.
    fn allows_unpaginated_subquery_ordering(&self) -> bool {
        true
    }
}

/// `select` with the real/pad tests taken out of its projection. Inside a
/// server-side aggregate a padded row is just a row of nulls, and the flag
/// column would show up as a member of every element.
pub fn strip_default_if_empty(select: &Select) -> Select {
    select.update_projection(select.projection.map_server_bodies(&mut strip))
}

fn strip(expr: Expr) -> Expr {
    match expr {
        Expr::DefaultIfEmptyTest { expr, .. } | Expr::DefaultIfEmptyFlag(expr) => strip(*expr),
        nested @ (Expr::Exists(_) | Expr::In { .. } | Expr::SingleValue(_) | Expr::Enumerable(_)) => {
            nested
        }
        other => other.map_children(&mut strip),
    }
}

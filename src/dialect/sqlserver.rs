use crate::error::Result;
use crate::expr::{AggregateFunction, SqlType};
use crate::ir::{JoinKind, Select};

use super::{strip_default_if_empty, DialectFormatter, Pagination};

/// MS SQL Server dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl DialectFormatter for SqlServerDialect {
    fn name(&self) -> &str {
        "sql_server"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn quote_string(&self, s: &str) -> String {
        format!("N'{}'", s.replace('\'', "''"))
    }

    fn format_parameter_name(&self, name: &str) -> String {
        format!("@{}", name)
    }

    fn format_boolean(&self, value: bool) -> String {
        if value { "CAST(1 AS BIT)" } else { "CAST(0 AS BIT)" }.to_string()
    }

    fn native_booleans(&self) -> bool {
        false
    }

    fn type_name(&self, ty: SqlType) -> &'static str {
        match ty {
            SqlType::Boolean => "BIT",
            SqlType::Integer => "INT",
            SqlType::BigInt => "BIGINT",
            SqlType::Double => "FLOAT",
            SqlType::Text => "NVARCHAR(MAX)",
        }
    }

    fn aggregate_name(&self, function: AggregateFunction) -> &'static str {
        match function {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::LongCount => "COUNT_BIG",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Average => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }

    /// `TOP` when only a limit is set, otherwise `OFFSET ... FETCH`, which
    /// needs an `ORDER BY`.
    fn format_pagination(&self, limit: Option<&str>, offset: Option<&str>) -> Pagination {
        match (limit, offset) {
            (None, None) => Pagination::default(),
            (Some(limit), None) => Pagination {
                prefix: Some(format!("TOP ({})", limit)),
                suffix: None,
                requires_order_by: false,
            },
            (limit, Some(offset)) => {
                let mut suffix = format!("OFFSET {} ROWS", offset);
                if let Some(limit) = limit {
                    suffix.push_str(&format!(" FETCH NEXT {} ROWS ONLY", limit));
                }
                Pagination {
                    prefix: None,
                    suffix: Some(suffix),
                    requires_order_by: true,
                }
            }
        }
    }

    fn join_keyword(&self, kind: JoinKind) -> &'static str {
        match kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Cross => "CROSS JOIN",
            JoinKind::CrossApply => "CROSS APPLY",
            JoinKind::OuterApply => "OUTER APPLY",
        }
    }

    fn supports_complex_type_subqueries(&self) -> bool {
        true
    }

    fn format_complex_type_subquery(
        &self,
        select: &Select,
        render: &mut dyn FnMut(&Select) -> Result<String>,
    ) -> Result<String> {
        let sql = render(&strip_default_if_empty(select))?;
        Ok(format!("({} FOR JSON PATH)", sql))
    }

    fn allows_unpaginated_subquery_ordering(&self) -> bool {
        false
    }
}

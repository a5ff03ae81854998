use crate::error::Result;
use crate::expr::SqlType;
use crate::ir::{JoinKind, Select};

use super::{strip_default_if_empty, DialectFormatter, Pagination};

/// PostgreSQL dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl DialectFormatter for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn format_parameter_name(&self, name: &str) -> String {
        format!(":{}", name)
    }

    fn type_name(&self, ty: SqlType) -> &'static str {
        match ty {
            SqlType::Boolean => "BOOLEAN",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Text => "TEXT",
        }
    }

    fn format_pagination(&self, limit: Option<&str>, offset: Option<&str>) -> Pagination {
        let suffix = match (limit, offset) {
            (Some(limit), Some(offset)) => Some(format!("LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => Some(format!("LIMIT {}", limit)),
            (None, Some(offset)) => Some(format!("OFFSET {}", offset)),
            (None, None) => None,
        };
        Pagination {
            prefix: None,
            suffix,
            requires_order_by: false,
        }
    }

    fn join_keyword(&self, kind: JoinKind) -> &'static str {
        match kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Cross => "CROSS JOIN",
            JoinKind::CrossApply => "CROSS JOIN LATERAL",
            JoinKind::OuterApply => "LEFT JOIN LATERAL",
        }
    }

    fn join_suffix(&self, kind: JoinKind) -> Option<&'static str> {
        (kind == JoinKind::OuterApply).then_some("ON TRUE")
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
        let alias = self.quote_identifier("$rows");
        Ok(format!(
            "(SELECT COALESCE(json_agg(row_to_json({alias})), '[]') FROM ({sql}) AS {alias})",
            alias = alias,
            sql = sql
        ))
    }
}

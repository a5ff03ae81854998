use std::collections::HashMap;
use std::convert::Infallible;

use serde::{Deserialize, Serialize};

use crate::expr::Expr;

use super::{Projection, Table};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ordering {
    pub expr: Expr,
    pub descending: bool,
}

/// A SQL-shaped query.
///
/// Once `is_distinct`, `limit`, `offset` or `grouping` is set the select is
/// closed: filtering, paginating or de-duplicating it further does not
/// commute with what it already does, so callers wrap it in a derived table
/// first. The `requires_pushdown_for_*` methods say when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub projection: Projection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<Table>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<Expr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<Ordering>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<Expr>,
    #[serde(default)]
    pub is_distinct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouping: Option<Expr>,
}

impl Select {
    pub fn new(projection: Projection, table: Option<Table>) -> Self {
        Self {
            projection,
            table,
            predicate: None,
            order_by: Vec::new(),
            offset: None,
            limit: None,
            is_distinct: false,
            grouping: None,
        }
    }

    pub fn update_projection(&self, projection: Projection) -> Select {
        Select {
            projection,
            ..self.clone()
        }
    }

    /// AND `predicate` onto the existing filter.
    pub fn add_to_predicate(&self, predicate: Expr) -> Select {
        debug_assert!(!self.is_closed(), "predicate added to a closed select");
        let predicate = match &self.predicate {
            Some(existing) => existing.clone().and(predicate),
            None => predicate,
        };
        Select {
            predicate: Some(predicate),
            ..self.clone()
        }
    }

    pub fn update_table(&self, table: Table) -> Select {
        Select {
            table: Some(table),
            ..self.clone()
        }
    }

    pub fn add_to_order_by(&self, expr: Expr, descending: bool) -> Select {
        let mut order_by = self.order_by.clone();
        order_by.push(Ordering { expr, descending });
        Select {
            order_by,
            ..self.clone()
        }
    }

    pub fn update_order_by(&self, order_by: Vec<Ordering>) -> Select {
        Select {
            order_by,
            ..self.clone()
        }
    }

    pub fn update_limit(&self, limit: Expr) -> Select {
        debug_assert!(!self.requires_pushdown_for_limit());
        Select {
            limit: Some(limit),
            ..self.clone()
        }
    }

    pub fn update_offset(&self, offset: Expr) -> Select {
        debug_assert!(!self.requires_pushdown_for_offset());
        Select {
            offset: Some(offset),
            ..self.clone()
        }
    }

    pub fn as_distinct(&self) -> Select {
        debug_assert!(!self.requires_pushdown_for_distinct());
        Select {
            is_distinct: true,
            ..self.clone()
        }
    }

    pub fn update_grouping(&self, grouping: Expr) -> Select {
        Select {
            grouping: Some(grouping),
            ..self.clone()
        }
    }

    /// Drop the ordering when nothing depends on it; used where rows only
    /// feed an aggregate, EXISTS or IN.
    pub fn without_unpaginated_ordering(&self) -> Select {
        if self.limit.is_some() || self.offset.is_some() {
            return self.clone();
        }
        Select {
            order_by: Vec::new(),
            ..self.clone()
        }
    }

    pub fn is_closed(&self) -> bool {
        self.is_distinct || self.limit.is_some() || self.offset.is_some() || self.grouping.is_some()
    }

    pub fn requires_pushdown_for_predicate(&self) -> bool {
        self.is_closed()
    }

    pub fn requires_pushdown_for_aggregate(&self) -> bool {
        self.is_closed()
    }

    pub fn requires_pushdown_for_grouping(&self) -> bool {
        self.is_closed()
    }

    /// A grouped select keeps composing its projection in place; that is how
    /// result selectors over groups become aggregates.
    pub fn requires_pushdown_for_projection(&self) -> bool {
        self.is_distinct || self.limit.is_some() || self.offset.is_some()
    }

    pub fn requires_pushdown_for_distinct(&self) -> bool {
        self.is_distinct || self.limit.is_some() || self.offset.is_some()
    }

    pub fn requires_pushdown_for_ordering(&self) -> bool {
        self.is_distinct || self.limit.is_some() || self.offset.is_some()
    }

    /// DISTINCT and OFFSET are applied before LIMIT, so only a second limit
    /// needs a derived table.
    pub fn requires_pushdown_for_limit(&self) -> bool {
        self.limit.is_some()
    }

    pub fn requires_pushdown_for_offset(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    pub fn requires_pushdown_for_left_side_of_join(&self) -> bool {
        self.is_closed() || self.table.is_none()
    }

    /// Only a plain read of one base table can sit on the right of a join as is.
    pub fn requires_pushdown_for_right_side_of_join(&self) -> bool {
        let plain = matches!(self.table, Some(Table::Base { .. }))
            && self.predicate.is_none()
            && self.order_by.is_empty()
            && !self.is_closed()
            && self.projection.is_server();
        !plain
    }

    pub fn defined_aliases(&self) -> Vec<String> {
        self.table
            .as_ref()
            .map(|t| t.defined_aliases())
            .unwrap_or_default()
    }

    /// Rename table aliases, both where they are declared and where columns
    /// refer to them. Aliases missing from `renames` are kept.
    pub fn rename_aliases(&self, renames: &HashMap<String, String>) -> Select {
        let lookup = |alias: &str| {
            renames
                .get(alias)
                .cloned()
                .unwrap_or_else(|| alias.to_string())
        };
        rename_select(self.clone(), &lookup)
    }

    pub(crate) fn rename_declared(self, rename: &dyn Fn(&str) -> String) -> Select {
        Select {
            table: self.table.map(|t| t.rename_declared(rename)),
            ..self
        }
    }

    /// Rebuild with `f` applied to every expression the select holds,
    /// including those inside derived tables.
    pub fn try_map_exprs<E, F>(self, f: &mut F) -> Result<Select, E>
    where
        F: FnMut(Expr) -> Result<Expr, E>,
    {
        Ok(Select {
            projection: self.projection.try_map_exprs(f)?,
            table: self.table.map(|t| t.try_map_exprs(f)).transpose()?,
            predicate: self.predicate.map(|p| f(p)).transpose()?,
            order_by: self
                .order_by
                .into_iter()
                .map(|o| {
                    Ok(Ordering {
                        expr: f(o.expr)?,
                        descending: o.descending,
                    })
                })
                .collect::<Result<_, E>>()?,
            offset: self.offset.map(|o| f(o)).transpose()?,
            limit: self.limit.map(|l| f(l)).transpose()?,
            is_distinct: self.is_distinct,
            grouping: self.grouping.map(|g| f(g)).transpose()?,
        })
    }

    pub fn map_exprs<F>(self, f: &mut F) -> Select
    where
        F: FnMut(Expr) -> Expr,
    {
        match self.try_map_exprs::<Infallible, _>(&mut |e| Ok(f(e))) {
            Ok(select) => select,
            Err(never) => match never {},
        }
    }

    pub fn exprs(&self) -> Vec<&Expr> {
        let mut exprs = self.projection.exprs();
        if let Some(table) = &self.table {
            exprs.extend(table.exprs());
        }
        exprs.extend(self.predicate.iter());
        exprs.extend(self.order_by.iter().map(|o| &o.expr));
        exprs.extend(self.offset.iter());
        exprs.extend(self.limit.iter());
        exprs.extend(self.grouping.iter());
        exprs
    }
}

/// Rename alias references in an expression that lives outside the select
/// being renamed, e.g. a key computed over its rows.
pub fn rename_aliases_in(expr: Expr, renames: &HashMap<String, String>) -> Expr {
    let lookup = |alias: &str| {
        renames
            .get(alias)
            .cloned()
            .unwrap_or_else(|| alias.to_string())
    };
    rename_expr(expr, &lookup)
}

fn rename_select(select: Select, rename: &dyn Fn(&str) -> String) -> Select {
    select
        .rename_declared(rename)
        .map_exprs(&mut |e| rename_expr(e, rename))
}

fn rename_expr(expr: Expr, rename: &dyn Fn(&str) -> String) -> Expr {
    match expr {
        Expr::Column { table, name } => Expr::Column {
            table: rename(&table),
            name,
        },
        other => other
            .map_children(&mut |child| rename_expr(child, rename))
            .map_selects(&mut |s| s.rename_declared(rename)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{column, constant, record};

    fn items() -> Select {
        Select::new(
            Projection::Server(record(vec![("A", column("items", "A"))])),
            Some(Table::Base {
                schema: None,
                name: "items".into(),
                alias: "items".into(),
            }),
        )
    }

    #[test]
    fn test_updates_do_not_touch_the_original() {
        let select = items();
        let filtered = select.add_to_predicate(column("items", "A").greater_than(constant(1)));
        assert!(select.predicate.is_none());
        assert!(filtered.predicate.is_some());
        let both = filtered.add_to_predicate(column("items", "A").less_than(constant(9)));
        assert!(matches!(
            both.predicate,
            Some(Expr::Binary {
                op: crate::expr::BinaryOperator::AndAlso,
                ..
            })
        ));
    }

    #[test]
    fn test_closed_select_pushdown_rules() {
        let distinct = items().as_distinct();
        assert!(distinct.is_closed());
        assert!(distinct.requires_pushdown_for_predicate());
        assert!(distinct.requires_pushdown_for_distinct());
        assert!(!distinct.requires_pushdown_for_limit());

        let limited = items().update_limit(constant(5));
        assert!(limited.requires_pushdown_for_offset());
        assert!(limited.requires_pushdown_for_limit());

        let skipped = items().update_offset(constant(2));
        assert!(!skipped.requires_pushdown_for_limit());

        let grouped = items().update_grouping(column("items", "A"));
        assert!(grouped.requires_pushdown_for_predicate());
        assert!(!grouped.requires_pushdown_for_projection());
    }

    #[test]
    fn test_plain_base_select_can_be_joined_directly() {
        assert!(!items().requires_pushdown_for_right_side_of_join());
        let filtered = items().add_to_predicate(column("items", "A").greater_than(constant(1)));
        assert!(filtered.requires_pushdown_for_right_side_of_join());
    }

    #[test]
    fn test_rename_aliases_rewrites_declarations_and_references() {
        let select = items().add_to_predicate(column("items", "A").greater_than(constant(1)));
        let mut renames = HashMap::new();
        renames.insert("items".to_string(), "items2".to_string());
        let renamed = select.rename_aliases(&renames);
        assert_eq!(renamed.defined_aliases(), vec!["items2".to_string()]);
        assert_eq!(
            renamed.predicate,
            Some(column("items2", "A").greater_than(constant(1)))
        );
        assert_eq!(
            renamed.projection,
            Projection::Server(record(vec![("A", column("items2", "A"))]))
        );
    }

    #[test]
    fn test_ordering_is_kept_only_when_paginated() {
        let ordered = items().add_to_order_by(column("items", "A"), false);
        assert!(ordered.without_unpaginated_ordering().order_by.is_empty());
        let paged = ordered.update_limit(constant(3));
        assert_eq!(paged.without_unpaginated_ordering().order_by.len(), 1);
    }
}

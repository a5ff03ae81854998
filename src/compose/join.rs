//! Joins: `Join`, `GroupJoin`, `SelectMany` and `DefaultIfEmpty`.
//!
//! The outer select keeps its predicate and ordering; its table becomes the
//! left side of a join whose right side is the inner select, pushed down
//! unless it is a plain read of one base table.

use tracing::debug;

use crate::error::Result;
use crate::expr::{references_parameter, Expr, Lambda, SequenceOperator};
use crate::ir::{
    EnumerableQuery, GroupedQuery, JoinKind, KeyPlaceholder, Projection, Select, Table,
};

use super::{pushdown_nullable, rewrite_references, sequence, Composer};

impl<'p> Composer<'p> {
    /// The inner sequence of a join, composed.
    fn inner_sequence(&mut self, inner: &Expr) -> Result<Option<Select>> {
        let inner = self.visit(inner.clone(), false)?;
        let inner = self.process_query_source(inner);
        Ok(inner.as_sequence().map(|q| q.select.clone()))
    }

    fn join_operand(&mut self, select: &Select, hint: &str) -> Select {
        if select.requires_pushdown_for_right_side_of_join() {
            self.push_down(select, hint)
        } else {
            select.clone()
        }
    }

    /// Project a join result. A selector that does not translate is applied
    /// on the client to both materialized sides.
    fn join_projection(
        &mut self,
        result: &Lambda,
        outer: &Projection,
        inner: &Projection,
    ) -> Result<Projection> {
        let body = self.expand(result, &[outer.flatten(), inner.flatten()])?;
        if self.translatable(&body) {
            return Ok(Projection::Server(body));
        }
        let client = self.post_expand(result.body.clone())?;
        Ok(Projection::Composite {
            outer: Box::new(outer.clone()),
            inner: Box::new(inner.clone()),
            result: Lambda::new(result.params.clone(), client),
        })
    }

    pub(super) fn compose_join(
        &mut self,
        query: &EnumerableQuery,
        args: &[Expr],
    ) -> Result<Option<Expr>> {
        let [inner, outer_key, inner_key, result] = args else {
            return Ok(None);
        };
        let (Some(outer_key), Some(inner_key), Some(result)) = (
            outer_key.as_lambda_of(1),
            inner_key.as_lambda_of(1),
            result.as_lambda_of(2),
        ) else {
            return Ok(None);
        };
        let Some(inner) = self.inner_sequence(inner)? else {
            return Ok(None);
        };

        let outer = if query.select.requires_pushdown_for_left_side_of_join() {
            self.push_down(&query.select, &outer_key.params[0])
        } else {
            query.select.clone()
        };
        let inner = self.join_operand(&inner, &inner_key.params[0]);
        let okey = self.expand(outer_key, &[outer.projection.flatten()])?;
        let ikey = self.expand(inner_key, &[inner.projection.flatten()])?;
        if !self.translatable(&okey) || !self.translatable(&ikey) {
            return Ok(None);
        }
        let (Some(left), Some(right)) = (outer.table.clone(), inner.table.clone()) else {
            return Ok(None);
        };

        let projection = self.join_projection(result, &outer.projection, &inner.projection)?;
        let table = Table::join(JoinKind::Inner, left, right, Some(okey.equal(ikey)));
        Ok(Some(sequence(
            outer.update_table(table).update_projection(projection),
        )))
    }

    /// The inner side stays unjoined: a `Grouped` scope that later becomes a
    /// correlated query, or an aggregate over one.
    pub(super) fn compose_group_join(
        &mut self,
        query: &EnumerableQuery,
        args: &[Expr],
    ) -> Result<Option<Expr>> {
        let [inner, outer_key, inner_key, result] = args else {
            return Ok(None);
        };
        let (Some(outer_key), Some(inner_key), Some(result)) = (
            outer_key.as_lambda_of(1),
            inner_key.as_lambda_of(1),
            result.as_lambda_of(2),
        ) else {
            return Ok(None);
        };
        let Some(inner) = self.inner_sequence(inner)? else {
            return Ok(None);
        };

        let outer = if query.select.requires_pushdown_for_projection() {
            self.push_down(&query.select, &outer_key.params[0])
        } else {
            query.select.clone()
        };
        let outer_row = outer.projection.flatten();
        let okey = self.expand(outer_key, &[outer_row.clone()])?;
        let ikey = self.expand(inner_key, &[inner.projection.flatten()])?;
        if !self.translatable(&okey) || !self.translatable(&ikey) {
            return Ok(None);
        }

        let grouped = |outer_key: Expr| {
            Expr::Grouped(Box::new(GroupedQuery {
                select: inner.clone(),
                outer_key,
                inner_key: ikey.clone(),
            }))
        };
        let body = self.expand(result, &[outer_row, grouped(okey)])?;
        let projection = if self.translatable(&body) {
            Projection::Server(body)
        } else {
            let row = result.params[0].clone();
            let row_key = outer_key.expand(&[Expr::Parameter(row.clone())]);
            let client =
                self.expand(result, &[Expr::Parameter(row.clone()), grouped(row_key)])?;
            outer.projection.merge(Lambda::new(vec![row], client))
        };
        Ok(Some(sequence(outer.update_projection(projection))))
    }

    pub(super) fn compose_select_many(
        &mut self,
        query: &EnumerableQuery,
        args: &[Expr],
    ) -> Result<Option<Expr>> {
        let (collection, result) = match args {
            [collection] => (collection.as_lambda_of(1), None),
            [collection, result] => match result.as_lambda_of(2) {
                Some(result) => (collection.as_lambda_of(1), Some(result)),
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
        let Some(collection) = collection else {
            return Ok(None);
        };

        let outer = if query.select.requires_pushdown_for_left_side_of_join() {
            self.push_down(&query.select, &collection.params[0])
        } else {
            query.select.clone()
        };
        let Some(left) = outer.table.clone() else {
            return Ok(None);
        };

        let expanded = collection.expand(&[outer.projection.flatten()]);
        let (expanded, padded) = match expanded {
            Expr::Call(call)
                if call.operator == SequenceOperator::DefaultIfEmpty && call.args.len() == 1 =>
            {
                let mut args = call.args;
                (args.remove(0), true)
            }
            other => (other, false),
        };
        let inner = self.post_expand(expanded)?;
        let correlated = references_parameter(&collection.body, &collection.params[0]);
        let hint = result
            .map(|r| r.params[1].clone())
            .unwrap_or_default();

        let inner = match inner {
            Expr::KeyPlaceholder(placeholder) => {
                let KeyPlaceholder { key, grouping } = *placeholder;
                grouping.unwrap_or(key)
            }
            other => other,
        };

        let (table, operand) = match inner {
            Expr::Grouped(grouped) => {
                let GroupedQuery {
                    select,
                    outer_key,
                    inner_key,
                } = *grouped;
                let operand = if padded {
                    let alias = self.aliases.fresh(&hint);
                    pushdown_nullable(&select, alias)
                } else {
                    self.join_operand(&select, &hint)
                };
                let Some(right) = operand.table.clone() else {
                    return Ok(None);
                };
                let Some(inner_key) = rewrite_references(&right, &inner_key) else {
                    debug!("join key of grouped inner is not projected; falling back");
                    return Ok(None);
                };
                let kind = if padded {
                    JoinKind::Left
                } else {
                    JoinKind::Inner
                };
                let table = Table::join(kind, left, right, Some(outer_key.equal(inner_key)));
                (table, operand)
            }
            other => {
                let other = self.process_query_source(other);
                let Some(select) = other.as_sequence().map(|q| q.select.clone()) else {
                    return Ok(None);
                };
                let kind = match (correlated, padded) {
                    (true, false) => JoinKind::CrossApply,
                    (true, true) => JoinKind::OuterApply,
                    (false, false) => JoinKind::Cross,
                    (false, true) => JoinKind::Left,
                };
                let operand = if padded {
                    let alias = self.aliases.fresh(&hint);
                    pushdown_nullable(&select, alias)
                } else if correlated || select.requires_pushdown_for_right_side_of_join() {
                    self.push_down(&select, &hint)
                } else {
                    select
                };
                let Some(right) = operand.table.clone() else {
                    return Ok(None);
                };
                (Table::join(kind, left, right, None), operand)
            }
        };

        let projection = match result {
            Some(result) => self.join_projection(result, &outer.projection, &operand.projection)?,
            None => operand.projection.clone(),
        };
        Ok(Some(sequence(
            outer.update_table(table).update_projection(projection),
        )))
    }

    /// A sequence that yields one padded row when empty: a one-row table
    /// left-joined to the rows.
    pub(super) fn compose_default_if_empty(
        &mut self,
        query: &EnumerableQuery,
        args: &[Expr],
    ) -> Result<Option<Expr>> {
        if !args.is_empty() || !self.translatable(&query.select.projection.flatten()) {
            return Ok(None);
        }
        let anchor = Select::new(
            Projection::Server(Expr::Record {
                type_name: None,
                fields: vec![("Empty".to_string(), Expr::Constant(crate::expr::Value::Null))],
            }),
            None,
        );
        let anchor = Table::subquery(anchor, self.aliases.fresh("e"));
        let rows = pushdown_nullable(&query.select, self.aliases.fresh(""));
        let Some(right) = rows.table.clone() else {
            return Ok(None);
        };
        let table = Table::join(JoinKind::Left, anchor, right, None);
        Ok(Some(sequence(rows.update_table(table))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{column, lambda, param, record, source};
    use crate::provider::ComposerProvider;

    fn compose(expr: Expr) -> Expr {
        ComposerProvider::default().compose(expr).unwrap().expr
    }

    fn select_of(expr: &Expr) -> &Select {
        match expr {
            Expr::Enumerable(query) => &query.select,
            other => panic!("expected a sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_join_of_two_sources_is_inner_join() {
        let query = source("orders", &["Id", "CustomerId"]).call(
            SequenceOperator::Join,
            vec![
                source("customers", &["Id", "Name"]),
                lambda(&["o"], param("o").member("CustomerId")),
                lambda(&["c"], param("c").member("Id")),
                lambda(
                    &["o", "c"],
                    record(vec![("Order", param("o").member("Id")), ("Name", param("c").member("Name"))]),
                ),
            ],
        );
        let composed = compose(query);
        let select = select_of(&composed);
        match select.table.as_ref() {
            Some(Table::Join(join)) => {
                assert_eq!(join.kind, JoinKind::Inner);
                assert!(matches!(join.right, Table::Base { .. }));
                assert_eq!(
                    join.predicate,
                    Some(column("o", "CustomerId").equal(column("c", "Id")))
                );
            }
            other => panic!("unexpected table {:?}", other),
        }
        assert!(select.projection.is_server());
    }

    #[test]
    fn test_select_many_over_unrelated_source_is_cross_join() {
        let query = source("a", &["X"]).call(
            SequenceOperator::SelectMany,
            vec![
                lambda(&["l"], source("b", &["Y"])),
                lambda(
                    &["l", "r"],
                    record(vec![("X", param("l").member("X")), ("Y", param("r").member("Y"))]),
                ),
            ],
        );
        let composed = compose(query);
        match select_of(&composed).table.as_ref() {
            Some(Table::Join(join)) => {
                assert_eq!(join.kind, JoinKind::Cross);
                assert!(join.predicate.is_none());
            }
            other => panic!("unexpected table {:?}", other),
        }
    }

    #[test]
    fn test_default_if_empty_pads_through_left_join() {
        let query = source("items", &["A"]).call(SequenceOperator::DefaultIfEmpty, vec![]);
        let composed = compose(query);
        let select = select_of(&composed);
        match select.table.as_ref() {
            Some(Table::Join(join)) => {
                assert_eq!(join.kind, JoinKind::Left);
                assert!(matches!(join.left, Table::Subquery { .. }));
            }
            other => panic!("unexpected table {:?}", other),
        }
        assert!(matches!(
            select.projection.flatten(),
            Expr::DefaultIfEmptyTest { .. }
        ));
    }
}

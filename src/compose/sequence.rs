//! Single-source operators: projection, filtering, ordering, paging and
//! element access.

use tracing::debug;

use crate::error::Result;
use crate::expr::{and_all, BinaryOperator, Expr, Lambda, SequenceOperator, Value};
use crate::ir::{EnumerableQuery, Ordering, Projection, Select, TransformationMethod};

use super::{sequence, Composer};

/// The `AndAlso` conjuncts of a predicate, left to right.
fn conjuncts(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::Binary {
            op: BinaryOperator::AndAlso,
            left,
            right,
        } => {
            let mut parts = conjuncts(left);
            parts.extend(conjuncts(right));
            parts
        }
        other => vec![other],
    }
}

/// A constant row count, clamped at zero.
fn constant_count(expr: &Expr) -> Option<Expr> {
    match expr {
        Expr::Constant(Value::Int(n)) => Some(Expr::Constant(Value::Int((*n).max(0)))),
        _ => None,
    }
}

impl<'p> Composer<'p> {
    fn open_for(&mut self, select: &Select, required: bool, hint: &str) -> Select {
        if required {
            self.push_down(select, hint)
        } else {
            select.clone()
        }
    }

    pub(super) fn compose_select(
        &mut self,
        query: &EnumerableQuery,
        args: &[Expr],
    ) -> Result<Option<Expr>> {
        let [selector] = args else {
            return Ok(None);
        };
        let Some(selector) = selector.as_lambda_of(1) else {
            return Ok(None);
        };
        let select = self.open_for(
            &query.select,
            query.select.requires_pushdown_for_projection(),
            &selector.params[0],
        );
        let body = self.expand(selector, &[select.projection.flatten()])?;
        let projection = if self.translatable(&body) {
            Projection::Server(body)
        } else {
            let client = self.post_expand(selector.body.clone())?;
            select
                .projection
                .merge(Lambda::new(selector.params.clone(), client))
        };
        Ok(Some(sequence(select.update_projection(projection))))
    }

    pub(super) fn compose_where(
        &mut self,
        query: &EnumerableQuery,
        args: &[Expr],
    ) -> Result<Option<Expr>> {
        let [predicate] = args else {
            return Ok(None);
        };
        let Some(predicate) = predicate.as_lambda_of(1) else {
            return Ok(None);
        };
        let select = self.open_for(
            &query.select,
            query.select.requires_pushdown_for_predicate(),
            &predicate.params[0],
        );
        let row = select.projection.flatten();
        let body = self.expand(predicate, &[row.clone()])?;
        if self.translatable(&body) {
            return Ok(Some(sequence(select.add_to_predicate(body))));
        }
        if !self.provider.split_predicates() {
            return Ok(None);
        }

        let mut server = Vec::new();
        let mut client = Vec::new();
        for conjunct in conjuncts(&predicate.body) {
            let part = Lambda::new(predicate.params.clone(), conjunct.clone());
            let expanded = self.expand(&part, &[row.clone()])?;
            if self.translatable(&expanded) {
                server.push(expanded);
            } else {
                client.push(conjunct.clone());
            }
        }
        let Some(server_predicate) = and_all(server) else {
            return Ok(None);
        };
        debug!(
            client_conjuncts = client.len(),
            "splitting predicate between database and client"
        );
        let filtered = sequence(select.add_to_predicate(server_predicate));
        let Some(client_predicate) = and_all(client) else {
            return Ok(Some(filtered));
        };
        let client_predicate = self.post_expand(client_predicate)?;
        let lambda = Expr::Lambda(Box::new(Lambda::new(
            predicate.params.clone(),
            client_predicate,
        )));
        self.in_memory_call(SequenceOperator::Where, vec![filtered, lambda])
            .map(Some)
    }

    /// `OrderBy*` replaces the current ordering, `ThenBy*` extends it.
    pub(super) fn compose_ordering(
        &mut self,
        query: &EnumerableQuery,
        args: &[Expr],
        append: bool,
        descending: bool,
    ) -> Result<Option<Expr>> {
        let [key] = args else {
            return Ok(None);
        };
        let Some(key) = key.as_lambda_of(1) else {
            return Ok(None);
        };
        if append && query.select.order_by.is_empty() {
            return Ok(None);
        }
        let select = self.open_for(
            &query.select,
            query.select.requires_pushdown_for_ordering(),
            &key.params[0],
        );
        let body = self.expand(key, &[select.projection.flatten()])?;
        if !body.is_scalar() || !self.translatable(&body) {
            return Ok(None);
        }
        let select = if append {
            select.add_to_order_by(body, descending)
        } else {
            select.update_order_by(vec![Ordering {
                expr: body,
                descending,
            }])
        };
        Ok(Some(sequence(select)))
    }

    pub(super) fn compose_take(
        &mut self,
        query: &EnumerableQuery,
        args: &[Expr],
    ) -> Result<Option<Expr>> {
        let Some(count) = self.row_count(args)? else {
            return Ok(None);
        };
        let select = self.open_for(
            &query.select,
            query.select.requires_pushdown_for_limit(),
            "",
        );
        Ok(Some(sequence(select.update_limit(count))))
    }

    pub(super) fn compose_skip(
        &mut self,
        query: &EnumerableQuery,
        args: &[Expr],
    ) -> Result<Option<Expr>> {
        let Some(count) = self.row_count(args)? else {
            return Ok(None);
        };
        let select = self.open_for(
            &query.select,
            query.select.requires_pushdown_for_offset(),
            "",
        );
        Ok(Some(sequence(select.update_offset(count))))
    }

    fn row_count(&mut self, args: &[Expr]) -> Result<Option<Expr>> {
        let [count] = args else {
            return Ok(None);
        };
        let count = self.visit(count.clone(), false)?;
        Ok(constant_count(&count))
    }

    pub(super) fn compose_distinct(&mut self, query: &EnumerableQuery, args: &[Expr]) -> Option<Expr> {
        if !args.is_empty() {
            return None;
        }
        let Projection::Server(body) = &query.select.projection else {
            return None;
        };
        if !self.translatable(body) {
            return None;
        }
        let select = self.open_for(
            &query.select,
            query.select.requires_pushdown_for_distinct(),
            "",
        );
        Some(sequence(select.without_unpaginated_ordering().as_distinct()))
    }

    /// `First`, `Single` and their `OrDefault` forms: limit the rows and let
    /// the client pick the element.
    pub(super) fn compose_element(
        &mut self,
        query: &EnumerableQuery,
        args: &[Expr],
        method: TransformationMethod,
    ) -> Result<Option<Expr>> {
        let select = match args {
            [] => query.select.clone(),
            [predicate] => {
                let Some(predicate) = predicate.as_lambda_of(1) else {
                    return Ok(None);
                };
                let select = self.open_for(
                    &query.select,
                    query.select.requires_pushdown_for_predicate(),
                    &predicate.params[0],
                );
                let body = self.expand(predicate, &[select.projection.flatten()])?;
                if !self.translatable(&body) {
                    return Ok(None);
                }
                select.add_to_predicate(body)
            }
            _ => return Ok(None),
        };
        let Some(limit) = method.row_limit() else {
            return Ok(None);
        };
        let select = self.open_for(&select, select.requires_pushdown_for_limit(), "");
        let select = select.update_limit(Expr::Constant(Value::Int(limit)));
        Ok(Some(
            EnumerableQuery {
                select,
                transformation: Some(method),
            }
            .into_expr(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{column, constant, param};

    #[test]
    fn test_conjuncts_flatten_nested_and() {
        let a = column("t", "A").greater_than(constant(1));
        let b = column("t", "B").less_than(constant(2));
        let c = column("t", "C").equal(constant(3));
        let expr = a.clone().and(b.clone().and(c.clone()));
        assert_eq!(conjuncts(&expr), vec![&a, &b, &c]);
    }

    #[test]
    fn test_or_is_a_single_conjunct() {
        let expr = param("x").or(param("y"));
        assert_eq!(conjuncts(&expr).len(), 1);
    }

    #[test]
    fn test_negative_count_is_clamped() {
        assert_eq!(constant_count(&constant(-3)), Some(constant(0)));
        assert_eq!(constant_count(&constant(4)), Some(constant(4)));
        assert_eq!(constant_count(&crate::expr::query_param("n")), None);
    }
}

//! Operators that reduce a sequence to one value: quantifiers, membership
//! and aggregates. Each yields a single-value select.

use crate::error::Result;
use crate::expr::{AggregateFunction, Expr, SequenceOperator, Value};
use crate::ir::{EnumerableQuery, Projection, Select};

use super::{value_aggregate, Composer};

fn single_value(select: Select) -> Expr {
    Expr::SingleValue(Box::new(select))
}

/// A select with no table computing `body`.
fn scalar_select(body: Expr) -> Select {
    Select::new(Projection::Server(body), None)
}

impl<'p> Composer<'p> {
    /// Apply the optional predicate argument of an aggregate overload.
    /// `None` when the arguments do not fit or the predicate does not
    /// translate.
    fn filtered(&mut self, select: &Select, args: &[Expr]) -> Result<Option<Select>> {
        match args {
            [] => Ok(Some(select.clone())),
            [predicate] => {
                let Some(predicate) = predicate.as_lambda_of(1) else {
                    return Ok(None);
                };
                let select = if select.requires_pushdown_for_predicate() {
                    self.push_down(select, &predicate.params[0])
                } else {
                    select.clone()
                };
                let body = self.expand(predicate, &[select.projection.flatten()])?;
                Ok(self
                    .translatable(&body)
                    .then(|| select.add_to_predicate(body)))
            }
            _ => Ok(None),
        }
    }

    fn aggregatable(&mut self, select: Select, hint: &str) -> Select {
        if select.requires_pushdown_for_aggregate() {
            self.push_down(&select, hint)
        } else {
            select
        }
    }

    pub(super) fn compose_any(
        &mut self,
        query: &EnumerableQuery,
        args: &[Expr],
    ) -> Result<Option<Expr>> {
        let Some(select) = self.filtered(&query.select, args)? else {
            return Ok(None);
        };
        let rows = select
            .without_unpaginated_ordering()
            .update_projection(Projection::Server(Expr::Constant(Value::Int(1))));
        Ok(Some(single_value(scalar_select(Expr::Exists(Box::new(
            rows,
        ))))))
    }

    /// `All(p)` holds when every row satisfies `p`: the row count equals the
    /// number of rows where `p` is true.
    pub(super) fn compose_all(
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
        let select = self.aggregatable(query.select.clone(), &predicate.params[0]);
        let body = self.expand(predicate, &[select.projection.flatten()])?;
        if !self.translatable(&body) {
            return Ok(None);
        }
        let count = Expr::Aggregate {
            function: AggregateFunction::Count,
            argument: None,
        };
        let satisfied = Expr::Aggregate {
            function: AggregateFunction::Sum,
            argument: Some(Box::new(body.if_else(
                Expr::Constant(Value::Int(1)),
                Expr::Constant(Value::Int(0)),
            ))),
        }
        .coalesce(Expr::Constant(Value::Int(0)));
        let select = select
            .without_unpaginated_ordering()
            .update_projection(Projection::Server(count.equal(satisfied)));
        Ok(Some(single_value(select)))
    }

    pub(super) fn compose_contains(
        &mut self,
        query: &EnumerableQuery,
        args: &[Expr],
    ) -> Result<Option<Expr>> {
        let [value] = args else {
            return Ok(None);
        };
        let value = self.visit(value.clone(), false)?;
        if !self.translatable(&value) {
            return Ok(None);
        }
        let Projection::Server(body) = &query.select.projection else {
            return Ok(None);
        };
        if !body.is_scalar() || !self.translatable(body) {
            return Ok(None);
        }
        let membership = Expr::In {
            value: Box::new(value),
            select: Box::new(query.select.without_unpaginated_ordering()),
        };
        Ok(Some(single_value(scalar_select(membership))))
    }

    pub(super) fn compose_count(
        &mut self,
        query: &EnumerableQuery,
        args: &[Expr],
        operator: SequenceOperator,
    ) -> Result<Option<Expr>> {
        let Some(select) = self.filtered(&query.select, args)? else {
            return Ok(None);
        };
        let select = self.aggregatable(select, "");
        let function = if operator == SequenceOperator::LongCount {
            AggregateFunction::LongCount
        } else {
            AggregateFunction::Count
        };
        let select = select
            .without_unpaginated_ordering()
            .update_projection(Projection::Server(Expr::Aggregate {
                function,
                argument: None,
            }));
        Ok(Some(single_value(select)))
    }

    /// `Sum`, `Average`, `Min` and `Max`, with or without a selector.
    pub(super) fn compose_value_aggregate(
        &mut self,
        query: &EnumerableQuery,
        args: &[Expr],
        operator: SequenceOperator,
    ) -> Result<Option<Expr>> {
        let (select, value) = match args {
            [] => {
                let select = self.aggregatable(query.select.clone(), "");
                let value = select.projection.flatten();
                (select, value)
            }
            [selector] => {
                let Some(selector) = selector.as_lambda_of(1) else {
                    return Ok(None);
                };
                let select = self.aggregatable(query.select.clone(), &selector.params[0]);
                let value = self.expand(selector, &[select.projection.flatten()])?;
                (select, value)
            }
            _ => return Ok(None),
        };
        let Some(aggregate) = value_aggregate(operator, value) else {
            return Ok(None);
        };
        if !self.translatable(&aggregate) {
            return Ok(None);
        }
        let select = select
            .without_unpaginated_ordering()
            .update_projection(Projection::Server(aggregate));
        Ok(Some(single_value(select)))
    }
}

//! Post-expansion rewrite stages.
//!
//! After a lambda is expanded over a projection, its body passes through an
//! ordered list of stages. Composition itself is one of them; the others are
//! [`RewriteStage`]s, such as [`GroupingAggregationRewriter`] or whatever a
//! plugin registers.
//!
//! # Example
//!
//! ```ignore
//! struct StripCasts;
//!
//! impl RewriteStage for StripCasts {
//!     fn name(&self) -> &str { "strip_casts" }
//!     fn rewrite(&self, expr: Expr, _: &dyn TranslatabilityAnalyzer) -> Result<Expr> {
//!         Ok(expr)
//!     }
//! }
//! ```

use anyhow::Result;

use crate::expr::{AggregateFunction, Expr, QueryCall, SequenceOperator, SqlType, Value};
use crate::ir::GroupByResult;
use crate::translate::TranslatabilityAnalyzer;

/// A pure rewrite over an expanded lambda body.
pub trait RewriteStage: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn rewrite(&self, expr: Expr, analyzer: &dyn TranslatabilityAnalyzer) -> Result<Expr>;
}

/// Turns aggregate calls over a group into SQL aggregates of the grouped
/// select, e.g. `g.Select(x => x.Price).Sum()` into `COALESCE(SUM(price), 0)`.
///
/// Only group scopes whose outer key is still the grouping key itself are
/// rewritten; once a grouped select has been pushed down its groups are
/// read through correlated subqueries instead.
pub struct GroupingAggregationRewriter;

impl RewriteStage for GroupingAggregationRewriter {
    fn name(&self) -> &str {
        "grouping_aggregation"
    }

    fn description(&self) -> &str {
        "Rewrites aggregates over groups into SQL aggregate functions"
    }

    fn rewrite(&self, expr: Expr, analyzer: &dyn TranslatabilityAnalyzer) -> Result<Expr> {
        Ok(rewrite_node(expr, analyzer))
    }
}

fn rewrite_node(expr: Expr, analyzer: &dyn TranslatabilityAnalyzer) -> Expr {
    match expr.map_children(&mut |child| rewrite_node(child, analyzer)) {
        Expr::Call(call) if in_scope_group(&call).is_some() => rewrite_call(*call, analyzer),
        other => other,
    }
}

fn in_scope_group(call: &QueryCall) -> Option<&GroupByResult> {
    match call.source() {
        Some(Expr::GroupByResult(group)) if group.outer_key == group.inner_key => Some(group),
        _ => None,
    }
}

fn rewrite_call(call: QueryCall, analyzer: &dyn TranslatabilityAnalyzer) -> Expr {
    let rewritten = match in_scope_group(&call) {
        Some(group) => aggregate(call.operator, group, &call.args[1..], analyzer),
        None => None,
    };
    rewritten.unwrap_or(Expr::Call(Box::new(call)))
}

fn aggregate(
    operator: SequenceOperator,
    group: &GroupByResult,
    args: &[Expr],
    analyzer: &dyn TranslatabilityAnalyzer,
) -> Option<Expr> {
    let rewritten = match (operator, args) {
        (SequenceOperator::Select, [selector]) => {
            let selector = selector.as_lambda_of(1)?;
            let element = selector.expand(&[group.element.clone()]);
            return Some(Expr::GroupByResult(Box::new(GroupByResult {
                element,
                ..group.clone()
            })));
        }
        (SequenceOperator::Count | SequenceOperator::LongCount, []) => Expr::Aggregate {
            function: count_function(operator),
            argument: None,
        },
        (SequenceOperator::Count | SequenceOperator::LongCount, [predicate]) => {
            let predicate = predicate.as_lambda_of(1)?.expand(&[group.element.clone()]);
            // COUNT skips the nulls of rows that fail the predicate
            Expr::Aggregate {
                function: count_function(operator),
                argument: Some(Box::new(predicate.if_else(
                    Expr::Constant(Value::Int(1)),
                    Expr::Constant(Value::Null),
                ))),
            }
        }
        (
            SequenceOperator::Sum
            | SequenceOperator::Average
            | SequenceOperator::Min
            | SequenceOperator::Max,
            [],
        ) => value_aggregate(operator, group.element.clone())?,
        (
            SequenceOperator::Sum
            | SequenceOperator::Average
            | SequenceOperator::Min
            | SequenceOperator::Max,
            [selector],
        ) => {
            let value = selector.as_lambda_of(1)?.expand(&[group.element.clone()]);
            value_aggregate(operator, value)?
        }
        _ => return None,
    };
    analyzer.is_translatable(&rewritten).then_some(rewritten)
}

fn count_function(operator: SequenceOperator) -> AggregateFunction {
    if operator == SequenceOperator::LongCount {
        AggregateFunction::LongCount
    } else {
        AggregateFunction::Count
    }
}

/// SUM, AVG, MIN or MAX of a scalar, shaped like the host operator's result.
pub fn value_aggregate(operator: SequenceOperator, value: Expr) -> Option<Expr> {
    if !value.is_scalar() {
        return None;
    }
    Some(match operator {
        SequenceOperator::Sum => Expr::Aggregate {
            function: AggregateFunction::Sum,
            argument: Some(Box::new(value)),
        }
        .coalesce(Expr::Constant(Value::Int(0))),
        SequenceOperator::Average => Expr::Aggregate {
            function: AggregateFunction::Average,
            argument: Some(Box::new(Expr::Cast {
                expr: Box::new(value),
                ty: SqlType::Double,
            })),
        },
        SequenceOperator::Min => Expr::Aggregate {
            function: AggregateFunction::Min,
            argument: Some(Box::new(value)),
        },
        SequenceOperator::Max => Expr::Aggregate {
            function: AggregateFunction::Max,
            argument: Some(Box::new(value)),
        },
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{column, lambda, param};
    use crate::ir::{Projection, Select, Table};
    use crate::translate::DefaultTranslatabilityAnalyzer;

    fn group(outer_key: Expr) -> Expr {
        Expr::GroupByResult(Box::new(GroupByResult {
            select: Select::new(
                Projection::Server(column("p", "Price")),
                Some(Table::Base {
                    schema: None,
                    name: "products".into(),
                    alias: "p".into(),
                }),
            ),
            outer_key,
            inner_key: column("p", "Category"),
            element: column("p", "Price"),
        }))
    }

    fn rewrite(expr: Expr) -> Expr {
        GroupingAggregationRewriter
            .rewrite(expr, &DefaultTranslatabilityAnalyzer::default())
            .unwrap()
    }

    #[test]
    fn test_count_over_group() {
        let expr = group(column("p", "Category")).call_in_memory(SequenceOperator::Count, vec![]);
        assert_eq!(
            rewrite(expr),
            Expr::Aggregate {
                function: AggregateFunction::Count,
                argument: None,
            }
        );
    }

    #[test]
    fn test_sum_after_select_over_group() {
        let expr = group(column("p", "Category"))
            .call_in_memory(
                SequenceOperator::Select,
                vec![lambda(&["x"], param("x").add(Expr::Constant(Value::Int(1))))],
            )
            .call_in_memory(SequenceOperator::Sum, vec![]);
        let expected = Expr::Aggregate {
            function: AggregateFunction::Sum,
            argument: Some(Box::new(column("p", "Price").add(Expr::Constant(Value::Int(1))))),
        }
        .coalesce(Expr::Constant(Value::Int(0)));
        assert_eq!(rewrite(expr), expected);
    }

    #[test]
    fn test_conditional_count() {
        let expr = group(column("p", "Category")).call_in_memory(
            SequenceOperator::Count,
            vec![lambda(&["x"], param("x").greater_than(Expr::Constant(Value::Int(10))))],
        );
        match rewrite(expr) {
            Expr::Aggregate {
                function: AggregateFunction::Count,
                argument: Some(argument),
            } => assert!(matches!(*argument, Expr::Conditional { .. })),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_pushed_down_group_is_left_alone() {
        let expr = group(column("t", "Key")).call_in_memory(SequenceOperator::Count, vec![]);
        assert!(matches!(rewrite(expr), Expr::Call(_)));
    }
}

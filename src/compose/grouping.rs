//! `GroupBy`.
//!
//! The grouped select carries `GROUP BY key`; each group is a
//! [`GroupByResult`] scope over the ungrouped select. Aggregates over that
//! scope become SQL aggregates (see `GroupingAggregationRewriter`), anything
//! else reads the group's elements through a correlated query at the end.

use crate::error::Result;
use crate::expr::{Expr, Lambda};
use crate::ir::{EnumerableQuery, GroupByResult, KeyPlaceholder, Projection};

use super::{sequence, Composer};

const GROUP_PARAM: &str = "$g";

impl<'p> Composer<'p> {
    pub(super) fn compose_group_by(
        &mut self,
        query: &EnumerableQuery,
        args: &[Expr],
    ) -> Result<Option<Expr>> {
        let (key, element, result) = match args {
            [key] => (key.as_lambda_of(1), None, None),
            [key, selector] => match selector.as_lambda() {
                Some(l) if l.arity() == 1 => (key.as_lambda_of(1), Some(l), None),
                Some(l) if l.arity() == 2 => (key.as_lambda_of(1), None, Some(l)),
                _ => return Ok(None),
            },
            [key, element, result] => match (element.as_lambda_of(1), result.as_lambda_of(2)) {
                (Some(e), Some(r)) => (key.as_lambda_of(1), Some(e), Some(r)),
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };
        let Some(key) = key else {
            return Ok(None);
        };

        let select = if query.select.requires_pushdown_for_grouping() {
            self.push_down(&query.select, &key.params[0])
        } else {
            query.select.clone()
        };
        let row = select.projection.flatten();
        let key_body = self.expand(key, &[row.clone()])?;
        if !self.translatable(&key_body) {
            return Ok(None);
        }
        let element_body = match element {
            Some(element) => self.expand(element, &[row])?,
            None => row,
        };
        if !self.translatable(&element_body) {
            return Ok(None);
        }

        let grouped_select = select
            .update_grouping(key_body.clone())
            .update_order_by(Vec::new());
        let group = |outer_key: Expr| {
            Expr::GroupByResult(Box::new(GroupByResult {
                select: select.clone(),
                outer_key,
                inner_key: key_body.clone(),
                element: element_body.clone(),
            }))
        };

        let projection = match result {
            Some(result) => {
                let body = self.expand(result, &[key_body.clone(), group(key_body.clone())])?;
                if self.translatable(&body) {
                    Projection::Server(body)
                } else {
                    let key_param = result.params[0].clone();
                    let client = self.expand(
                        result,
                        &[
                            Expr::Parameter(key_param.clone()),
                            group(Expr::Parameter(key_param.clone())),
                        ],
                    )?;
                    Projection::Server(key_body.clone()).merge(Lambda::new(vec![key_param], client))
                }
            }
            None => {
                let grouping = group(key_body.clone());
                if self.translatable(&grouping) {
                    Projection::Server(grouping)
                } else {
                    let placeholder = Expr::KeyPlaceholder(Box::new(KeyPlaceholder {
                        key: key_body.clone(),
                        grouping: None,
                    }));
                    let client = group(Expr::Parameter(GROUP_PARAM.to_string()).member("Key"));
                    Projection::Server(placeholder)
                        .merge(Lambda::new(vec![GROUP_PARAM.to_string()], client))
                }
            }
        };
        Ok(Some(sequence(grouped_select.update_projection(projection))))
    }

    /// The elements of one group: the ungrouped rows whose key equals the
    /// group's outer key, projected through the element selector.
    pub(super) fn group_elements(&mut self, group: GroupByResult) -> Expr {
        let GroupByResult {
            select,
            outer_key,
            inner_key,
            element,
        } = group;
        let select = select.update_projection(Projection::Server(element));
        self.correlate(select, inner_key, outer_key)
    }
}

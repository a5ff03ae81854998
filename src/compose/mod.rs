//! Query composition.
//!
//! [`Composer`] walks an operator chain source-first. A source becomes a
//! one-table select; each operator on top either folds into that select,
//! wraps it as a derived table first when it is closed (see
//! [`pushdown`]), or falls back to an in-memory call over whatever was
//! translated so far. Lambda arguments are expanded over the current
//! projection and passed through the provider's post-expansion stages
//! before the translatability analyzer decides what the database sees.
//!
//! ```text
//!   Source ──► Enumerable(select) ──► operator rule ──► Enumerable(select')
//!                                          │
//!                                          └─ untranslatable ──► Call{InMemory}
//! ```

mod aggregate;
mod alias;
mod fallback;
mod grouping;
mod join;
mod pushdown;
mod references;
mod sequence;
mod set_ops;
mod stages;

pub use alias::AliasGenerator;
pub use fallback::{
    resolve_in_memory, resolve_queryable, MethodSignature, ParamShape, ENUMERABLE_METHODS,
    QUERYABLE_METHODS,
};
pub use pushdown::{inject_key_placeholders, pushdown, pushdown_nullable};
pub use references::{rewrite_projection, rewrite_references};
pub use stages::{value_aggregate, GroupingAggregationRewriter, RewriteStage};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{ComposeError, Result};
use crate::expr::{
    reduce_members, CallOrigin, Expr, Lambda, QueryCall, QuerySource, SequenceOperator,
};
use crate::ir::{
    collect_materializations, rename_aliases_in, EntityMaterialization, EnumerableQuery,
    KeyPlaceholder, Projection, Select, Table, TransformationMethod,
};
use crate::provider::{ComposerProvider, PostExpansionStage};

/// The result of composing one operator chain.
///
/// `expr` is either a relational query (`Enumerable` or `SingleValue`), or
/// in-memory calls whose innermost source is one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedQuery {
    pub expr: Expr,
}

impl ComposedQuery {
    /// The select the database runs, if any part of the chain was translated.
    pub fn relational_select(&self) -> Option<&Select> {
        relational_select(&self.expr)
    }

    /// What the client does with the rows of a top-level sequence.
    pub fn transformation(&self) -> Option<TransformationMethod> {
        match &self.expr {
            Expr::Enumerable(query) => query.transformation,
            _ => None,
        }
    }

    /// True when the database computes the whole result.
    pub fn is_fully_translated(&self) -> bool {
        let relational = match &self.expr {
            Expr::Enumerable(query) => query.select.projection.is_server(),
            Expr::SingleValue(_) => true,
            _ => false,
        };
        relational && !self.expr.any(&mut |e| matches!(e, Expr::Call(_)))
    }

    /// Operators left for the client, outermost first.
    pub fn in_memory_operators(&self) -> Vec<SequenceOperator> {
        let mut operators = Vec::new();
        collect_in_memory(&self.expr, &mut operators);
        operators
    }

    pub fn materializations(&self) -> Vec<&EntityMaterialization> {
        collect_materializations(&self.expr)
    }
}

fn relational_select(expr: &Expr) -> Option<&Select> {
    match expr {
        Expr::Enumerable(query) => Some(&query.select),
        Expr::SingleValue(select) => Some(select),
        Expr::Call(call) => call.source().and_then(relational_select),
        _ => None,
    }
}

fn collect_in_memory(expr: &Expr, out: &mut Vec<SequenceOperator>) {
    if let Expr::Call(call) = expr {
        if call.origin == CallOrigin::InMemory {
            out.push(call.operator);
        }
    }
    for child in expr.children() {
        collect_in_memory(child, out);
    }
}

/// True if `expr` still holds a group scope that has not been turned into
/// relational elements.
fn contains_group_scopes(expr: &Expr) -> bool {
    expr.any(&mut |e| {
        matches!(
            e,
            Expr::GroupByResult(_)
                | Expr::Grouped(_)
                | Expr::KeyPlaceholder(_)
        ) && !matches!(e, Expr::KeyPlaceholder(p) if p.grouping.is_none())
    })
}

fn sequence(select: Select) -> Expr {
    EnumerableQuery::new(select).into_expr()
}

/// Rewrites one operator chain. Holds the per-compilation alias generator;
/// everything else comes from the provider.
pub struct Composer<'p> {
    provider: &'p ComposerProvider,
    aliases: AliasGenerator,
}

impl<'p> Composer<'p> {
    pub fn new(provider: &'p ComposerProvider) -> Self {
        Self {
            provider,
            aliases: AliasGenerator::new(provider.default_alias()),
        }
    }

    pub fn compose(mut self, expr: Expr) -> Result<ComposedQuery> {
        let composed = self.visit(expr, true)?;
        let composed = self.finish(composed)?;
        let query = ComposedQuery { expr: composed };
        debug!(
            translated = query.is_fully_translated(),
            in_memory = query.in_memory_operators().len(),
            "composed query"
        );
        Ok(query)
    }

    fn translatable(&self, expr: &Expr) -> bool {
        self.provider.analyzer().is_translatable(expr)
    }

    /// Rewrite `expr`. `top_level` is set only for the outermost call of the
    /// chain, whose element results stay element queries rather than scalar
    /// subqueries.
    pub(crate) fn visit(&mut self, expr: Expr, top_level: bool) -> Result<Expr> {
        match expr {
            Expr::Call(call) => {
                let composed = self.visit_call(*call)?;
                Ok(if top_level {
                    composed
                } else {
                    element_value(composed)
                })
            }
            Expr::Source(source) => Ok(self.visit_source(&source)),
            Expr::Member { expr, member } => {
                let target = self.visit(*expr, false)?;
                Ok(element_value(member_of(target, &member)))
            }
            other => other.try_map_children(&mut |child| self.visit(child, false)),
        }
    }

    fn visit_source(&mut self, source: &QuerySource) -> Expr {
        let alias = self.aliases.for_table(&source.table);
        let column = |name: &str| Expr::Column {
            table: alias.clone(),
            name: name.to_string(),
        };

        let mut fields: Vec<(String, Expr)> =
            source.columns.iter().map(|c| (c.clone(), column(c))).collect();
        let body = match &source.entity {
            Some(entity) => {
                for key in &entity.key {
                    if !source.columns.contains(key) {
                        fields.push((key.clone(), column(key)));
                    }
                }
                let key = match entity.key.as_slice() {
                    [single] => column(single),
                    keys => Expr::Record {
                        type_name: None,
                        fields: keys.iter().map(|k| (k.clone(), column(k))).collect(),
                    },
                };
                EntityMaterialization {
                    entity_type: entity.type_name.clone(),
                    key,
                    shadow_properties: entity
                        .shadow_columns
                        .iter()
                        .map(|c| (c.clone(), column(c)))
                        .collect(),
                    tracking: entity.tracking,
                    expr: Expr::Record {
                        type_name: Some(source.row_type().to_string()),
                        fields,
                    },
                }
                .into_expr()
            }
            None => Expr::Record {
                type_name: Some(source.row_type().to_string()),
                fields,
            },
        };

        let table = Table::Base {
            schema: source.schema.clone(),
            name: source.table.clone(),
            alias,
        };
        sequence(Select::new(Projection::Server(body), Some(table)))
    }

    fn visit_call(&mut self, call: QueryCall) -> Result<Expr> {
        let QueryCall {
            operator,
            origin,
            args,
            type_argument,
        } = call;
        let mut args = args.into_iter();
        let Some(source) = args.next() else {
            return Err(ComposeError::UnresolvedFallback {
                operator,
                shape: String::new(),
            });
        };
        let rest: Vec<Expr> = args.collect();

        let source = self.visit(source, false)?;
        let source = self.process_query_source(source);
        if let Some(query) = source.as_sequence().cloned() {
            let composed =
                self.apply_operator(operator, &query, &rest, type_argument.as_deref())?;
            if let Some(composed) = composed {
                trace!(operator = operator.name(), "composed operator");
                return Ok(composed);
            }
        }

        debug!(
            operator = operator.name(),
            "falling back to in-memory evaluation"
        );
        let mut all = Vec::with_capacity(rest.len() + 1);
        all.push(source);
        for arg in rest {
            all.push(self.visit(arg, false)?);
        }
        let method = match origin {
            CallOrigin::Queryable => resolve_queryable(operator, &all)?,
            CallOrigin::InMemory => resolve_in_memory(operator, &all)?,
        };
        Ok(Expr::Call(Box::new(QueryCall {
            operator: method.operator,
            origin: CallOrigin::InMemory,
            args: all,
            type_argument,
        })))
    }

    /// Build an in-memory call directly, e.g. for the client half of a
    /// split predicate.
    fn in_memory_call(&self, operator: SequenceOperator, args: Vec<Expr>) -> Result<Expr> {
        let method = resolve_in_memory(operator, &args)?;
        Ok(Expr::Call(Box::new(QueryCall::new(
            method.operator,
            CallOrigin::InMemory,
            args,
        ))))
    }

    fn apply_operator(
        &mut self,
        operator: SequenceOperator,
        query: &EnumerableQuery,
        args: &[Expr],
        type_argument: Option<&str>,
    ) -> Result<Option<Expr>> {
        use SequenceOperator as Op;

        // comparers only exist on the client
        if args.iter().any(|a| matches!(a, Expr::Comparer(_))) {
            return Ok(None);
        }
        match operator {
            Op::AsQueryable => Ok(transform(query, args, TransformationMethod::AsQueryable)),
            Op::ToList => Ok(transform(query, args, TransformationMethod::ToList)),
            Op::ToArray => Ok(transform(query, args, TransformationMethod::ToArray)),
            Op::Select => self.compose_select(query, args),
            Op::Where => self.compose_where(query, args),
            Op::OfType | Op::Cast => Ok(compose_type_filter(query, args, type_argument)),
            Op::OrderBy => self.compose_ordering(query, args, false, false),
            Op::OrderByDescending => self.compose_ordering(query, args, false, true),
            Op::ThenBy => self.compose_ordering(query, args, true, false),
            Op::ThenByDescending => self.compose_ordering(query, args, true, true),
            Op::Reverse => Ok(compose_reverse(query, args)),
            Op::Take => self.compose_take(query, args),
            Op::Skip => self.compose_skip(query, args),
            Op::Distinct => Ok(self.compose_distinct(query, args)),
            Op::First => self.compose_element(query, args, TransformationMethod::First),
            Op::FirstOrDefault => {
                self.compose_element(query, args, TransformationMethod::FirstOrDefault)
            }
            Op::Single => self.compose_element(query, args, TransformationMethod::Single),
            Op::SingleOrDefault => {
                self.compose_element(query, args, TransformationMethod::SingleOrDefault)
            }
            Op::Any => self.compose_any(query, args),
            Op::All => self.compose_all(query, args),
            Op::Contains => self.compose_contains(query, args),
            Op::Count | Op::LongCount => self.compose_count(query, args, operator),
            Op::Sum | Op::Average | Op::Min | Op::Max => {
                self.compose_value_aggregate(query, args, operator)
            }
            Op::Concat | Op::Union | Op::Except | Op::Intersect => {
                self.compose_set_operation(query, args, operator)
            }
            Op::Join => self.compose_join(query, args),
            Op::GroupJoin => self.compose_group_join(query, args),
            Op::SelectMany => self.compose_select_many(query, args),
            Op::DefaultIfEmpty => self.compose_default_if_empty(query, args),
            Op::GroupBy => self.compose_group_by(query, args),
            Op::AsEnumerable
            | Op::Last
            | Op::LastOrDefault
            | Op::ElementAt
            | Op::ElementAtOrDefault
            | Op::TakeWhile
            | Op::SkipWhile
            | Op::Zip
            | Op::SequenceEqual
            | Op::Aggregate => Ok(None),
        }
    }

    /// Expand `lambda` over `args` and run the body through the
    /// post-expansion stages.
    fn expand(&mut self, lambda: &Lambda, args: &[Expr]) -> Result<Expr> {
        let body = lambda.expand(args);
        self.post_expand(body)
    }

    fn post_expand(&mut self, expr: Expr) -> Result<Expr> {
        let provider = self.provider;
        let mut current = expr;
        for stage in provider.stages() {
            current = match stage {
                PostExpansionStage::Compose => self.visit(current, false)?,
                PostExpansionStage::Rewrite(rewrite) => rewrite
                    .rewrite(current, provider.analyzer())
                    .map_err(|e| ComposeError::Stage {
                        stage: rewrite.name().to_string(),
                        message: format!("{:#}", e),
                    })?,
            };
        }
        Ok(current)
    }

    fn push_down(&mut self, select: &Select, hint: &str) -> Select {
        let alias = self.aliases.fresh(hint);
        pushdown(select, alias)
    }

    /// Unwrap group scopes that are used as a sequence.
    fn process_query_source(&mut self, expr: Expr) -> Expr {
        match expr {
            Expr::KeyPlaceholder(placeholder) => {
                let KeyPlaceholder { key, grouping } = *placeholder;
                match grouping {
                    Some(grouping) => self.process_query_source(grouping),
                    None => Expr::KeyPlaceholder(Box::new(KeyPlaceholder {
                        key,
                        grouping: None,
                    })),
                }
            }
            Expr::Grouped(grouped) => {
                let grouped = *grouped;
                self.correlate(grouped.select, grouped.inner_key, grouped.outer_key)
            }
            Expr::GroupByResult(group) if group.outer_key != group.inner_key => {
                self.group_elements(*group)
            }
            Expr::Grouping { elements, .. } => *elements,
            other => other,
        }
    }

    /// The rows of `select` whose `inner_key` equals `outer_key`, as a
    /// correlated query under fresh aliases.
    fn correlate(&mut self, select: Select, inner_key: Expr, outer_key: Expr) -> Expr {
        let renames: HashMap<String, String> = select
            .defined_aliases()
            .into_iter()
            .map(|alias| {
                let fresh = self.aliases.fresh(&alias);
                (alias, fresh)
            })
            .collect();
        let select = select.rename_aliases(&renames);
        let inner_key = rename_aliases_in(inner_key, &renames);

        let (select, inner_key) = if select.requires_pushdown_for_predicate() {
            let element = select.projection.flatten();
            let keyed = select.update_projection(Projection::Server(Expr::Record {
                type_name: None,
                fields: vec![("Key".to_string(), inner_key), ("Element".to_string(), element)],
            }));
            let pushed = self.push_down(&keyed, "");
            let row = pushed.projection.flatten();
            let key = reduce_members(row.clone().member("Key"));
            let element = reduce_members(row.member("Element"));
            (pushed.update_projection(Projection::Server(element)), key)
        } else {
            (select, inner_key)
        };
        sequence(select.add_to_predicate(inner_key.equal(outer_key)))
    }

    /// Replace every remaining group scope with a `Grouping` over correlated
    /// elements, bottom-up.
    fn expand_groups(&mut self, expr: Expr) -> Expr {
        let expr = expr.map_children(&mut |child| self.expand_groups(child));
        match expr {
            Expr::GroupByResult(group) => {
                let key = group.outer_key.clone();
                Expr::Grouping {
                    key: Box::new(key),
                    elements: Box::new(self.group_elements(*group)),
                }
            }
            Expr::Grouped(grouped) => {
                let grouped = *grouped;
                self.correlate(grouped.select, grouped.inner_key, grouped.outer_key)
            }
            Expr::KeyPlaceholder(placeholder) => {
                let KeyPlaceholder { key, grouping } = *placeholder;
                match grouping {
                    Some(grouping) => grouping,
                    None => Expr::KeyPlaceholder(Box::new(KeyPlaceholder {
                        key,
                        grouping: None,
                    })),
                }
            }
            other => other,
        }
    }

    /// The outermost call is done: expand leftover group scopes, compose
    /// once more so aggregates over them become subqueries, and move a
    /// client projection back to the server if it now translates.
    fn finish(&mut self, expr: Expr) -> Result<Expr> {
        let mut expr = expr;
        while contains_group_scopes(&expr) {
            debug!("expanding group scopes");
            expr = self.expand_groups(expr);
            expr = self.post_expand(expr)?;
        }
        Ok(match expr {
            Expr::Enumerable(query) if !query.select.projection.is_server() => {
                let flat = query.select.projection.flatten();
                if self.translatable(&flat) {
                    let select = query.select.update_projection(Projection::Server(flat));
                    EnumerableQuery {
                        select,
                        transformation: query.transformation,
                    }
                    .into_expr()
                } else {
                    Expr::Enumerable(query)
                }
            }
            other => other,
        })
    }
}

/// Record a client transformation of the sequence.
fn transform(
    query: &EnumerableQuery,
    args: &[Expr],
    method: TransformationMethod,
) -> Option<Expr> {
    args.is_empty()
        .then(|| query.with_transformation(method).into_expr())
}

/// Member access on a composed value. An element query takes the member
/// into its projection.
fn member_of(target: Expr, member: &str) -> Expr {
    match target {
        Expr::Enumerable(query) if !query.is_sequence() && query.select.projection.is_server() => {
            let EnumerableQuery {
                select,
                transformation,
            } = *query;
            let body = reduce_members(select.projection.flatten().member(member));
            EnumerableQuery {
                select: select.update_projection(Projection::Server(body)),
                transformation,
            }
            .into_expr()
        }
        target => reduce_members(target.member(member)),
    }
}

/// Inside a larger expression an element query with a scalar projection is
/// a scalar subquery.
fn element_value(expr: Expr) -> Expr {
    match expr {
        Expr::Enumerable(query)
            if !query.is_sequence()
                && matches!(&query.select.projection, Projection::Server(body) if body.is_scalar()) =>
        {
            Expr::SingleValue(Box::new(query.select))
        }
        other => other,
    }
}

fn compose_type_filter(
    query: &EnumerableQuery,
    args: &[Expr],
    type_argument: Option<&str>,
) -> Option<Expr> {
    let type_argument = type_argument?;
    if !args.is_empty() {
        return None;
    }
    let row_type = match query.select.projection.flatten() {
        Expr::Record {
            type_name: Some(name),
            ..
        } => name,
        Expr::Materialize(materialize) => materialize.entity_type,
        _ => return None,
    };
    (row_type == type_argument).then(|| query.clone().into_expr())
}

fn compose_reverse(query: &EnumerableQuery, args: &[Expr]) -> Option<Expr> {
    let select = &query.select;
    if !args.is_empty()
        || select.order_by.is_empty()
        || select.limit.is_some()
        || select.offset.is_some()
    {
        return None;
    }
    let order_by = select
        .order_by
        .iter()
        .map(|o| crate::ir::Ordering {
            expr: o.expr.clone(),
            descending: !o.descending,
        })
        .collect();
    Some(sequence(select.update_order_by(order_by)))
}

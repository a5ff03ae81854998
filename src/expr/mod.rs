//! Host expression trees.
//!
//! An operator chain arrives as an [`Expr`]: sources, sequence-operator calls,
//! lambdas and scalar host code. The composer rewrites it into the same type,
//! replacing every part it manages to translate with relational nodes from
//! [`crate::ir`]. Keeping both in one closed enum means every rewrite matches
//! exhaustively and nothing falls through unhandled.

mod build;
mod expand;
mod operator;

pub use build::*;
pub use expand::{reduce_members, references_parameter, replace_structural, substitute};
pub use operator::{CallOrigin, QueryCall, SequenceOperator};

use std::convert::Infallible;

use serde::{Deserialize, Serialize};

use crate::ir::{
    EntityDescriptor, EntityMaterialization, EnumerableQuery, GroupByResult, GroupedQuery,
    KeyPlaceholder, Select,
};

/// A literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    AndAlso,
    OrElse,
    Coalesce,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::LessThan
                | BinaryOperator::LessThanOrEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterThanOrEqual
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOperator::AndAlso | BinaryOperator::OrElse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOperator {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    LongCount,
    Sum,
    Average,
    Min,
    Max,
}

/// Scalar SQL types the composer introduces through casts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    Boolean,
    Integer,
    BigInt,
    Double,
    Text,
}

/// A lambda: formal parameters and a body that refers to them by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Expr,
}

impl Lambda {
    pub fn new(params: Vec<String>, body: Expr) -> Self {
        Self { params, body }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Substitute `args` for the parameters and reduce member accesses that
    /// become statically resolvable (e.g. a field read off a record literal).
    pub fn expand(&self, args: &[Expr]) -> Expr {
        let bindings: Vec<(String, Expr)> = self
            .params
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();
        reduce_members(substitute(self.body.clone(), &bindings))
    }
}

/// A base table exposed to queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub table: String,
    pub columns: Vec<String>,
    /// Present when rows of this table are materialized as tracked entities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityDescriptor>,
}

impl QuerySource {
    /// Name of the row type; used by `OfType`/`Cast`.
    pub fn row_type(&self) -> &str {
        match &self.entity {
            Some(entity) => &entity.type_name,
            None => &self.table,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Constant(Value),
    /// A lambda parameter.
    Parameter(String),
    /// A value captured from the host program, bound at execution time.
    QueryParameter(String),
    /// An equality comparer handed to an operator overload.
    Comparer(String),
    Lambda(Box<Lambda>),
    Member {
        expr: Box<Expr>,
        member: String,
    },
    Record {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        type_name: Option<String>,
        fields: Vec<(String, Expr)>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    /// Host code the database knows nothing about.
    ClientCall {
        function: String,
        args: Vec<Expr>,
    },
    Source(QuerySource),
    Call(Box<QueryCall>),

    // Relational nodes produced by composition.
    Column {
        table: String,
        name: String,
    },
    Aggregate {
        function: AggregateFunction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        argument: Option<Box<Expr>>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        ty: SqlType,
    },
    Exists(Box<Select>),
    In {
        value: Box<Expr>,
        select: Box<Select>,
    },
    /// A select producing exactly one row and one value.
    SingleValue(Box<Select>),
    Enumerable(Box<EnumerableQuery>),
    Grouped(Box<GroupedQuery>),
    GroupByResult(Box<GroupByResult>),
    KeyPlaceholder(Box<KeyPlaceholder>),
    /// A group with its key and a correlated query over its elements.
    Grouping {
        key: Box<Expr>,
        elements: Box<Expr>,
    },
    /// Projection of the right side of an outer join; exposes a real/pad flag.
    DefaultIfEmptyFlag(Box<Expr>),
    /// `expr`, or null when `flag` says the row is padding.
    DefaultIfEmptyTest {
        expr: Box<Expr>,
        flag: Box<Expr>,
    },
    Materialize(Box<EntityMaterialization>),
}

fn map_box<E, F>(expr: Box<Expr>, f: &mut F) -> Result<Box<Expr>, E>
where
    F: FnMut(Expr) -> Result<Expr, E>,
{
    Ok(Box::new(f(*expr)?))
}

fn map_vec<E, F>(exprs: Vec<Expr>, f: &mut F) -> Result<Vec<Expr>, E>
where
    F: FnMut(Expr) -> Result<Expr, E>,
{
    exprs.into_iter().map(|e| f(e)).collect()
}

/// Map a lambda held outside an `Expr` by presenting it to `f` as one, so
/// scope-aware rewrites see its parameters.
pub(crate) fn try_map_lambda<E, F>(lambda: Lambda, f: &mut F) -> Result<Lambda, E>
where
    F: FnMut(Expr) -> Result<Expr, E>,
{
    let params = lambda.params.clone();
    match f(Expr::Lambda(Box::new(lambda)))? {
        Expr::Lambda(mapped) => Ok(*mapped),
        body => Ok(Lambda { params, body }),
    }
}

impl Expr {
    /// Rebuild this node with `f` applied to each direct child, including the
    /// expressions held by nested selects.
    pub fn try_map_children<E, F>(self, f: &mut F) -> Result<Expr, E>
    where
        F: FnMut(Expr) -> Result<Expr, E>,
    {
        Ok(match self {
            leaf @ (Expr::Constant(_)
            | Expr::Parameter(_)
            | Expr::QueryParameter(_)
            | Expr::Comparer(_)
            | Expr::Source(_)
            | Expr::Column { .. }) => leaf,
            Expr::Lambda(lambda) => {
                let Lambda { params, body } = *lambda;
                Expr::Lambda(Box::new(Lambda {
                    params,
                    body: f(body)?,
                }))
            }
            Expr::Member { expr, member } => Expr::Member {
                expr: map_box(expr, f)?,
                member,
            },
            Expr::Record { type_name, fields } => Expr::Record {
                type_name,
                fields: fields
                    .into_iter()
                    .map(|(name, e)| Ok((name, f(e)?)))
                    .collect::<Result<_, E>>()?,
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op,
                left: map_box(left, f)?,
                right: map_box(right, f)?,
            },
            Expr::Unary { op, expr } => Expr::Unary {
                op,
                expr: map_box(expr, f)?,
            },
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => Expr::Conditional {
                test: map_box(test, f)?,
                if_true: map_box(if_true, f)?,
                if_false: map_box(if_false, f)?,
            },
            Expr::ClientCall { function, args } => Expr::ClientCall {
                function,
                args: map_vec(args, f)?,
            },
            Expr::Call(call) => {
                let QueryCall {
                    operator,
                    origin,
                    args,
                    type_argument,
                } = *call;
                Expr::Call(Box::new(QueryCall {
                    operator,
                    origin,
                    args: map_vec(args, f)?,
                    type_argument,
                }))
            }
            Expr::Aggregate { function, argument } => Expr::Aggregate {
                function,
                argument: argument.map(|a| map_box(a, f)).transpose()?,
            },
            Expr::Function { name, args } => Expr::Function {
                name,
                args: map_vec(args, f)?,
            },
            Expr::Cast { expr, ty } => Expr::Cast {
                expr: map_box(expr, f)?,
                ty,
            },
            Expr::Exists(select) => Expr::Exists(Box::new(select.try_map_exprs(f)?)),
            Expr::In { value, select } => Expr::In {
                value: map_box(value, f)?,
                select: Box::new(select.try_map_exprs(f)?),
            },
            Expr::SingleValue(select) => Expr::SingleValue(Box::new(select.try_map_exprs(f)?)),
            Expr::Enumerable(query) => {
                let EnumerableQuery {
                    select,
                    transformation,
                } = *query;
                Expr::Enumerable(Box::new(EnumerableQuery {
                    select: select.try_map_exprs(f)?,
                    transformation,
                }))
            }
            Expr::Grouped(grouped) => {
                let GroupedQuery {
                    select,
                    outer_key,
                    inner_key,
                } = *grouped;
                Expr::Grouped(Box::new(GroupedQuery {
                    select: select.try_map_exprs(f)?,
                    outer_key: f(outer_key)?,
                    inner_key: f(inner_key)?,
                }))
            }
            Expr::GroupByResult(group) => {
                let GroupByResult {
                    select,
                    outer_key,
                    inner_key,
                    element,
                } = *group;
                Expr::GroupByResult(Box::new(GroupByResult {
                    select: select.try_map_exprs(f)?,
                    outer_key: f(outer_key)?,
                    inner_key: f(inner_key)?,
                    element: f(element)?,
                }))
            }
            Expr::KeyPlaceholder(placeholder) => {
                let KeyPlaceholder { key, grouping } = *placeholder;
                Expr::KeyPlaceholder(Box::new(KeyPlaceholder {
                    key: f(key)?,
                    grouping: grouping.map(|g| f(g)).transpose()?,
                }))
            }
            Expr::Grouping { key, elements } => Expr::Grouping {
                key: map_box(key, f)?,
                elements: map_box(elements, f)?,
            },
            Expr::DefaultIfEmptyFlag(expr) => Expr::DefaultIfEmptyFlag(map_box(expr, f)?),
            Expr::DefaultIfEmptyTest { expr, flag } => Expr::DefaultIfEmptyTest {
                expr: map_box(expr, f)?,
                flag: map_box(flag, f)?,
            },
            Expr::Materialize(materialize) => {
                let EntityMaterialization {
                    entity_type,
                    key,
                    shadow_properties,
                    tracking,
                    expr,
                } = *materialize;
                Expr::Materialize(Box::new(EntityMaterialization {
                    entity_type,
                    key: f(key)?,
                    shadow_properties: shadow_properties
                        .into_iter()
                        .map(|(name, e)| Ok((name, f(e)?)))
                        .collect::<Result<_, E>>()?,
                    tracking,
                    expr: f(expr)?,
                }))
            }
        })
    }

    /// Infallible form of [`Expr::try_map_children`].
    pub fn map_children<F>(self, f: &mut F) -> Expr
    where
        F: FnMut(Expr) -> Expr,
    {
        match self.try_map_children::<Infallible, _>(&mut |e| Ok(f(e))) {
            Ok(expr) => expr,
            Err(never) => match never {},
        }
    }

    /// Apply `f` to the selects this node holds directly, leaving everything
    /// else untouched.
    pub fn map_selects<F>(self, f: &mut F) -> Expr
    where
        F: FnMut(Select) -> Select,
    {
        match self {
            Expr::Exists(select) => Expr::Exists(Box::new(f(*select))),
            Expr::In { value, select } => Expr::In {
                value,
                select: Box::new(f(*select)),
            },
            Expr::SingleValue(select) => Expr::SingleValue(Box::new(f(*select))),
            Expr::Enumerable(query) => {
                let EnumerableQuery {
                    select,
                    transformation,
                } = *query;
                Expr::Enumerable(Box::new(EnumerableQuery {
                    select: f(select),
                    transformation,
                }))
            }
            Expr::Grouped(mut grouped) => {
                grouped.select = f(grouped.select);
                Expr::Grouped(grouped)
            }
            Expr::GroupByResult(mut group) => {
                group.select = f(group.select);
                Expr::GroupByResult(group)
            }
            other => other,
        }
    }

    /// Direct children, in the same order [`Expr::try_map_children`] visits them.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Constant(_)
            | Expr::Parameter(_)
            | Expr::QueryParameter(_)
            | Expr::Comparer(_)
            | Expr::Source(_)
            | Expr::Column { .. } => Vec::new(),
            Expr::Lambda(lambda) => vec![&lambda.body],
            Expr::Member { expr, .. } => vec![expr.as_ref()],
            Expr::Record { fields, .. } => fields.iter().map(|(_, e)| e).collect(),
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Unary { expr, .. } => vec![expr.as_ref()],
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => vec![test.as_ref(), if_true.as_ref(), if_false.as_ref()],
            Expr::ClientCall { args, .. } => args.iter().collect(),
            Expr::Call(call) => call.args.iter().collect(),
            Expr::Aggregate { argument, .. } => argument.iter().map(|a| a.as_ref()).collect(),
            Expr::Function { args, .. } => args.iter().collect(),
            Expr::Cast { expr, .. } => vec![expr.as_ref()],
            Expr::Exists(select) | Expr::SingleValue(select) => select.exprs(),
            Expr::In { value, select } => {
                let mut children = vec![value.as_ref()];
                children.extend(select.exprs());
                children
            }
            Expr::Enumerable(query) => query.select.exprs(),
            Expr::Grouped(grouped) => {
                let mut children = grouped.select.exprs();
                children.push(&grouped.outer_key);
                children.push(&grouped.inner_key);
                children
            }
            Expr::GroupByResult(group) => {
                let mut children = group.select.exprs();
                children.push(&group.outer_key);
                children.push(&group.inner_key);
                children.push(&group.element);
                children
            }
            Expr::KeyPlaceholder(placeholder) => {
                let mut children = vec![&placeholder.key];
                children.extend(placeholder.grouping.iter());
                children
            }
            Expr::Grouping { key, elements } => vec![key.as_ref(), elements.as_ref()],
            Expr::DefaultIfEmptyFlag(expr) => vec![expr.as_ref()],
            Expr::DefaultIfEmptyTest { expr, flag } => vec![expr.as_ref(), flag.as_ref()],
            Expr::Materialize(materialize) => {
                let mut children = vec![&materialize.key];
                children.extend(materialize.shadow_properties.iter().map(|(_, e)| e));
                children.push(&materialize.expr);
                children
            }
        }
    }

    /// True if `pred` holds for this node or any node below it.
    pub fn any(&self, pred: &mut impl FnMut(&Expr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        self.children().into_iter().any(|child| child.any(pred))
    }

    pub fn as_lambda(&self) -> Option<&Lambda> {
        match self {
            Expr::Lambda(lambda) => Some(lambda),
            _ => None,
        }
    }

    /// A lambda argument with exactly `arity` parameters.
    pub fn as_lambda_of(&self, arity: usize) -> Option<&Lambda> {
        self.as_lambda().filter(|l| l.arity() == arity)
    }

    /// The relational query behind this expression, if it is still usable
    /// as a sequence source (element results such as `First` are not).
    pub fn as_sequence(&self) -> Option<&EnumerableQuery> {
        match self {
            Expr::Enumerable(query) if query.is_sequence() => Some(query),
            _ => None,
        }
    }

    /// Scalar values, as opposed to records, groups and nested sequences.
    pub fn is_scalar(&self) -> bool {
        match self {
            Expr::Record { .. }
            | Expr::Enumerable(_)
            | Expr::Grouped(_)
            | Expr::GroupByResult(_)
            | Expr::Grouping { .. }
            | Expr::Materialize(_)
            | Expr::Lambda(_)
            | Expr::Source(_)
            | Expr::Call(_)
            | Expr::Comparer(_) => false,
            Expr::KeyPlaceholder(placeholder) => placeholder.key.is_scalar(),
            Expr::DefaultIfEmptyFlag(expr) => expr.is_scalar(),
            Expr::DefaultIfEmptyTest { expr, .. } => expr.is_scalar(),
            _ => true,
        }
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self, Expr::Constant(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_children_reaches_nested_select() {
        let select = Select::new(
            crate::ir::Projection::Server(param("x")),
            None,
        );
        let expr = Expr::Exists(Box::new(select));
        let mapped = expr.map_children(&mut |e| match e {
            Expr::Parameter(_) => constant(1),
            other => other,
        });
        match mapped {
            Expr::Exists(select) => assert_eq!(select.projection.flatten(), constant(1)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_any_finds_client_call() {
        let expr = param("x")
            .member("A")
            .greater_than(client_call("Score", vec![param("x")]));
        assert!(expr.any(&mut |e| matches!(e, Expr::ClientCall { .. })));
        assert!(!expr.any(&mut |e| matches!(e, Expr::Column { .. })));
    }

    #[test]
    fn test_lambda_expand_reduces_record_members() {
        let lambda = Lambda::new(vec!["x".into()], param("x").member("B"));
        let row = record(vec![("A", column("t", "A")), ("B", column("t", "B"))]);
        assert_eq!(lambda.expand(&[row]), column("t", "B"));
    }

    #[test]
    fn test_is_scalar() {
        assert!(column("t", "A").is_scalar());
        assert!(!record(vec![("A", constant(1))]).is_scalar());
        assert!(Expr::DefaultIfEmptyTest {
            expr: Box::new(column("t", "A")),
            flag: Box::new(column("t", "$empty")),
        }
        .is_scalar());
    }

    #[test]
    fn test_serde_round_trip_of_call() {
        let expr = source("items", &["A", "B"])
            .call(SequenceOperator::Where, vec![lambda(&["x"], param("x").member("A").greater_than(constant(1)))]);
        let json = serde_json::to_string(&expr).unwrap();
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(expr, back);
    }
}

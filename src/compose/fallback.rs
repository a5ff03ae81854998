//! In-memory equivalents of sequence operators.
//!
//! When an operator stays on the client its call is rebuilt against the
//! in-memory method with the same shape: expression parameters become
//! delegates and queryable sequences become plain sequences. Both method
//! sets are static tables, so resolution is a lookup by operator and
//! parameter shape rather than anything decided at run time.

use crate::error::{ComposeError, Result};
use crate::expr::{Expr, SequenceOperator};

/// Shape of one method parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamShape {
    Queryable,
    Sequence,
    /// An expression tree of a lambda with this many parameters.
    Expression(usize),
    /// A compiled lambda with this many parameters.
    Delegate(usize),
    Value,
    Comparer,
}

impl ParamShape {
    /// The in-memory counterpart of a queryable parameter.
    pub fn in_memory(self) -> ParamShape {
        match self {
            ParamShape::Queryable => ParamShape::Sequence,
            ParamShape::Expression(n) => ParamShape::Delegate(n),
            other => other,
        }
    }

    fn accepts(self, position: usize, arg: &Expr) -> bool {
        match (self, arg) {
            (ParamShape::Queryable | ParamShape::Sequence, _) if position == 0 => true,
            (ParamShape::Expression(n) | ParamShape::Delegate(n), Expr::Lambda(lambda)) => {
                lambda.arity() == n
            }
            (ParamShape::Comparer, Expr::Comparer(_)) => true,
            (
                ParamShape::Value | ParamShape::Sequence | ParamShape::Queryable,
                Expr::Lambda(_) | Expr::Comparer(_),
            ) => false,
            (ParamShape::Value | ParamShape::Sequence | ParamShape::Queryable, _) => true,
            _ => false,
        }
    }

    fn describe(arg: &Expr) -> String {
        match arg {
            Expr::Lambda(lambda) => format!("lambda/{}", lambda.arity()),
            Expr::Comparer(_) => "comparer".to_string(),
            _ => "value".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSignature {
    pub operator: SequenceOperator,
    pub params: &'static [ParamShape],
}

impl MethodSignature {
    fn accepts(&self, args: &[Expr]) -> bool {
        self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .enumerate()
                .all(|(i, (param, arg))| param.accepts(i, arg))
    }

    fn in_memory_params(&self) -> Vec<ParamShape> {
        self.params.iter().map(|p| p.in_memory()).collect()
    }
}

use ParamShape::{Comparer as C, Value as V};
use SequenceOperator as Op;

const Q: ParamShape = ParamShape::Queryable;
const S: ParamShape = ParamShape::Sequence;
const E1: ParamShape = ParamShape::Expression(1);
const E2: ParamShape = ParamShape::Expression(2);
const D1: ParamShape = ParamShape::Delegate(1);
const D2: ParamShape = ParamShape::Delegate(2);

macro_rules! methods {
    ($($op:ident [$($param:expr),*]),* $(,)?) => {
        &[$(MethodSignature { operator: Op::$op, params: &[$($param),*] }),*]
    };
}

/// Operators as called on a queryable source.
pub static QUERYABLE_METHODS: &[MethodSignature] = methods![
    AsQueryable[Q],
    AsEnumerable[Q],
    ToList[Q],
    ToArray[Q],
    Select[Q, E1],
    Select[Q, E2],
    SelectMany[Q, E1],
    SelectMany[Q, E2],
    SelectMany[Q, E1, E2],
    SelectMany[Q, E2, E2],
    Join[Q, S, E1, E1, E2],
    Join[Q, S, E1, E1, E2, C],
    GroupJoin[Q, S, E1, E1, E2],
    GroupJoin[Q, S, E1, E1, E2, C],
    Where[Q, E1],
    Where[Q, E2],
    OfType[Q],
    Cast[Q],
    GroupBy[Q, E1],
    GroupBy[Q, E1, C],
    GroupBy[Q, E1, E1],
    GroupBy[Q, E1, E1, C],
    GroupBy[Q, E1, E2],
    GroupBy[Q, E1, E2, C],
    GroupBy[Q, E1, E1, E2],
    GroupBy[Q, E1, E1, E2, C],
    DefaultIfEmpty[Q],
    DefaultIfEmpty[Q, V],
    First[Q],
    First[Q, E1],
    FirstOrDefault[Q],
    FirstOrDefault[Q, E1],
    Last[Q],
    Last[Q, E1],
    LastOrDefault[Q],
    LastOrDefault[Q, E1],
    Single[Q],
    Single[Q, E1],
    SingleOrDefault[Q],
    SingleOrDefault[Q, E1],
    ElementAt[Q, V],
    ElementAtOrDefault[Q, V],
    OrderBy[Q, E1],
    OrderBy[Q, E1, C],
    OrderByDescending[Q, E1],
    OrderByDescending[Q, E1, C],
    ThenBy[Q, E1],
    ThenBy[Q, E1, C],
    ThenByDescending[Q, E1],
    ThenByDescending[Q, E1, C],
    Reverse[Q],
    Take[Q, V],
    Skip[Q, V],
    TakeWhile[Q, E1],
    TakeWhile[Q, E2],
    SkipWhile[Q, E1],
    SkipWhile[Q, E2],
    Distinct[Q],
    Distinct[Q, C],
    Concat[Q, S],
    Union[Q, S],
    Union[Q, S, C],
    Except[Q, S],
    Except[Q, S, C],
    Intersect[Q, S],
    Intersect[Q, S, C],
    Zip[Q, S, E2],
    SequenceEqual[Q, S],
    SequenceEqual[Q, S, C],
    All[Q, E1],
    Any[Q],
    Any[Q, E1],
    Contains[Q, V],
    Contains[Q, V, C],
    Count[Q],
    Count[Q, E1],
    LongCount[Q],
    LongCount[Q, E1],
    Sum[Q],
    Sum[Q, E1],
    Average[Q],
    Average[Q, E1],
    Min[Q],
    Min[Q, E1],
    Max[Q],
    Max[Q, E1],
    Aggregate[Q, E2],
    Aggregate[Q, V, E2],
    Aggregate[Q, V, E2, E1],
];

/// Operators over plain in-memory sequences.
pub static ENUMERABLE_METHODS: &[MethodSignature] = methods![
    AsEnumerable[S],
    ToList[S],
    ToArray[S],
    Select[S, D1],
    Select[S, D2],
    SelectMany[S, D1],
    SelectMany[S, D2],
    SelectMany[S, D1, D2],
    SelectMany[S, D2, D2],
    Join[S, S, D1, D1, D2],
    Join[S, S, D1, D1, D2, C],
    GroupJoin[S, S, D1, D1, D2],
    GroupJoin[S, S, D1, D1, D2, C],
    Where[S, D1],
    Where[S, D2],
    OfType[S],
    Cast[S],
    GroupBy[S, D1],
    GroupBy[S, D1, C],
    GroupBy[S, D1, D1],
    GroupBy[S, D1, D1, C],
    GroupBy[S, D1, D2],
    GroupBy[S, D1, D2, C],
    GroupBy[S, D1, D1, D2],
    GroupBy[S, D1, D1, D2, C],
    DefaultIfEmpty[S],
    DefaultIfEmpty[S, V],
    First[S],
    First[S, D1],
    FirstOrDefault[S],
    FirstOrDefault[S, D1],
    Last[S],
    Last[S, D1],
    LastOrDefault[S],
    LastOrDefault[S, D1],
    Single[S],
    Single[S, D1],
    SingleOrDefault[S],
    SingleOrDefault[S, D1],
    ElementAt[S, V],
    ElementAtOrDefault[S, V],
    OrderBy[S, D1],
    OrderBy[S, D1, C],
    OrderByDescending[S, D1],
    OrderByDescending[S, D1, C],
    ThenBy[S, D1],
    ThenBy[S, D1, C],
    ThenByDescending[S, D1],
    ThenByDescending[S, D1, C],
    Reverse[S],
    Take[S, V],
    Skip[S, V],
    TakeWhile[S, D1],
    TakeWhile[S, D2],
    SkipWhile[S, D1],
    SkipWhile[S, D2],
    Distinct[S],
    Distinct[S, C],
    Concat[S, S],
    Union[S, S],
    Union[S, S, C],
    Except[S, S],
    Except[S, S, C],
    Intersect[S, S],
    Intersect[S, S, C],
    Zip[S, S, D2],
    SequenceEqual[S, S],
    SequenceEqual[S, S, C],
    All[S, D1],
    Any[S],
    Any[S, D1],
    Contains[S, V],
    Contains[S, V, C],
    Count[S],
    Count[S, D1],
    LongCount[S],
    LongCount[S, D1],
    Sum[S],
    Sum[S, D1],
    Average[S],
    Average[S, D1],
    Min[S],
    Min[S, D1],
    Max[S],
    Max[S, D1],
    Aggregate[S, D2],
    Aggregate[S, V, D2],
    Aggregate[S, V, D2, D1],
];

/// The in-memory operator that replaces `operator` on the client.
fn in_memory_operator(operator: SequenceOperator) -> SequenceOperator {
    match operator {
        SequenceOperator::AsQueryable => SequenceOperator::AsEnumerable,
        other => other,
    }
}

/// Find the single in-memory method a queryable call maps to.
pub fn resolve_queryable(
    operator: SequenceOperator,
    args: &[Expr],
) -> Result<&'static MethodSignature> {
    let candidates: Vec<&MethodSignature> = QUERYABLE_METHODS
        .iter()
        .filter(|m| m.operator == operator && m.accepts(args))
        .collect();
    let queryable = exactly_one(operator, args, candidates)?;
    let target = in_memory_operator(operator);
    let params = queryable.in_memory_params();
    let matches: Vec<&MethodSignature> = ENUMERABLE_METHODS
        .iter()
        .filter(|m| m.operator == target && m.params == params.as_slice())
        .collect();
    exactly_one(operator, args, matches)
}

/// Find the single in-memory method an in-memory call already names.
pub fn resolve_in_memory(
    operator: SequenceOperator,
    args: &[Expr],
) -> Result<&'static MethodSignature> {
    let target = in_memory_operator(operator);
    let candidates: Vec<&MethodSignature> = ENUMERABLE_METHODS
        .iter()
        .filter(|m| m.operator == target && m.accepts(args))
        .collect();
    exactly_one(operator, args, candidates)
}

fn exactly_one(
    operator: SequenceOperator,
    args: &[Expr],
    mut candidates: Vec<&'static MethodSignature>,
) -> Result<&'static MethodSignature> {
    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err(ComposeError::UnresolvedFallback {
            operator,
            shape: shape_of(args),
        }),
        n => Err(ComposeError::AmbiguousFallback {
            operator,
            shape: shape_of(args),
            candidates: n,
        }),
    }
}

fn shape_of(args: &[Expr]) -> String {
    args.iter()
        .enumerate()
        .map(|(i, arg)| {
            if i == 0 {
                "sequence".to_string()
            } else {
                ParamShape::describe(arg)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

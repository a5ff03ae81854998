//! Sequence operators and calls to them.

use serde::{Deserialize, Serialize};

use super::Expr;

/// Every sequence operator the composer knows about, translatable or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SequenceOperator {
    AsQueryable,
    AsEnumerable,
    ToList,
    ToArray,
    Select,
    SelectMany,
    Join,
    GroupJoin,
    Where,
    OfType,
    Cast,
    GroupBy,
    DefaultIfEmpty,
    First,
    FirstOrDefault,
    Last,
    LastOrDefault,
    Single,
    SingleOrDefault,
    ElementAt,
    ElementAtOrDefault,
    OrderBy,
    OrderByDescending,
    ThenBy,
    ThenByDescending,
    Reverse,
    Take,
    Skip,
    TakeWhile,
    SkipWhile,
    Distinct,
    Concat,
    Union,
    Except,
    Intersect,
    Zip,
    SequenceEqual,
    All,
    Any,
    Contains,
    Count,
    LongCount,
    Sum,
    Average,
    Min,
    Max,
    Aggregate,
}

impl SequenceOperator {
    pub fn name(self) -> &'static str {
        match self {
            SequenceOperator::AsQueryable => "AsQueryable",
            SequenceOperator::AsEnumerable => "AsEnumerable",
            SequenceOperator::ToList => "ToList",
            SequenceOperator::ToArray => "ToArray",
            SequenceOperator::Select => "Select",
            SequenceOperator::SelectMany => "SelectMany",
            SequenceOperator::Join => "Join",
            SequenceOperator::GroupJoin => "GroupJoin",
            SequenceOperator::Where => "Where",
            SequenceOperator::OfType => "OfType",
            SequenceOperator::Cast => "Cast",
            SequenceOperator::GroupBy => "GroupBy",
            SequenceOperator::DefaultIfEmpty => "DefaultIfEmpty",
            SequenceOperator::First => "First",
            SequenceOperator::FirstOrDefault => "FirstOrDefault",
            SequenceOperator::Last => "Last",
            SequenceOperator::LastOrDefault => "LastOrDefault",
            SequenceOperator::Single => "Single",
            SequenceOperator::SingleOrDefault => "SingleOrDefault",
            SequenceOperator::ElementAt => "ElementAt",
            SequenceOperator::ElementAtOrDefault => "ElementAtOrDefault",
            SequenceOperator::OrderBy => "OrderBy",
            SequenceOperator::OrderByDescending => "OrderByDescending",
            SequenceOperator::ThenBy => "ThenBy",
            SequenceOperator::ThenByDescending => "ThenByDescending",
            SequenceOperator::Reverse => "Reverse",
            SequenceOperator::Take => "Take",
            SequenceOperator::Skip => "Skip",
            SequenceOperator::TakeWhile => "TakeWhile",
            SequenceOperator::SkipWhile => "SkipWhile",
            SequenceOperator::Distinct => "Distinct",
            SequenceOperator::Concat => "Concat",
            SequenceOperator::Union => "Union",
            SequenceOperator::Except => "Except",
            SequenceOperator::Intersect => "Intersect",
            SequenceOperator::Zip => "Zip",
            SequenceOperator::SequenceEqual => "SequenceEqual",
            SequenceOperator::All => "All",
            SequenceOperator::Any => "Any",
            SequenceOperator::Contains => "Contains",
            SequenceOperator::Count => "Count",
            SequenceOperator::LongCount => "LongCount",
            SequenceOperator::Sum => "Sum",
            SequenceOperator::Average => "Average",
            SequenceOperator::Min => "Min",
            SequenceOperator::Max => "Max",
            SequenceOperator::Aggregate => "Aggregate",
        }
    }
}

/// Where a call came from: the queryable surface, or plain in-memory sequences.
///
/// In-memory calls are both what user code writes inside lambdas (e.g. over a
/// group) and what the composer emits when an operator falls back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOrigin {
    Queryable,
    InMemory,
}

/// A call to a sequence operator. `args[0]` is always the source sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCall {
    pub operator: SequenceOperator,
    pub origin: CallOrigin,
    pub args: Vec<Expr>,
    /// Type argument of `OfType`/`Cast`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_argument: Option<String>,
}

impl QueryCall {
    pub fn new(operator: SequenceOperator, origin: CallOrigin, args: Vec<Expr>) -> Self {
        Self {
            operator,
            origin,
            args,
            type_argument: None,
        }
    }

    pub fn source(&self) -> Option<&Expr> {
        self.args.first()
    }
}

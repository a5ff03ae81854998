//! Relational intermediate representation.
//!
//! ```text
//! Select ── projection: Projection (Server | Client | Composite)
//!        ├─ table:      Table (Base | Subquery | Join | SetOperation)
//!        ├─ predicate, order_by, limit, offset, is_distinct, grouping
//! ```
//!
//! Every node is plain data. Updates return new values, so two rewrite
//! branches can start from the same select without seeing each other.

mod leaves;
mod materialize;
mod projection;
mod select;
mod table;

pub use leaves::{
    column_name, gather_leaves, join_path, map_leaves, Leaf, EMPTY_FLAG, SCALAR_LEAF,
};
pub use materialize::{
    collect_materializations, EntityDescriptor, EntityMaterialization, TrackingMode,
};
pub use projection::{Projection, INNER_PREFIX, OUTER_PREFIX};
pub use select::{rename_aliases_in, Ordering, Select};
pub use table::{always_true, JoinKind, JoinTable, SetOperationTable, SetOperator, Table};

use serde::{Deserialize, Serialize};

use crate::expr::Expr;

/// What the client does with the rows once they arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformationMethod {
    AsQueryable,
    ToList,
    ToArray,
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
}

impl TransformationMethod {
    /// Element transformations reduce the sequence to one value.
    pub fn is_element(self) -> bool {
        matches!(
            self,
            TransformationMethod::First
                | TransformationMethod::FirstOrDefault
                | TransformationMethod::Single
                | TransformationMethod::SingleOrDefault
        )
    }

    /// Single* must see a second row to report a cardinality violation.
    pub fn row_limit(self) -> Option<i64> {
        match self {
            TransformationMethod::First | TransformationMethod::FirstOrDefault => Some(1),
            TransformationMethod::Single | TransformationMethod::SingleOrDefault => Some(2),
            _ => None,
        }
    }
}

/// A sequence still backed by one relational select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumerableQuery {
    pub select: Select,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<TransformationMethod>,
}

impl EnumerableQuery {
    pub fn new(select: Select) -> Self {
        Self {
            select,
            transformation: None,
        }
    }

    pub fn with_transformation(&self, method: TransformationMethod) -> Self {
        Self {
            select: self.select.clone(),
            transformation: Some(method),
        }
    }

    pub fn is_sequence(&self) -> bool {
        !self.transformation.is_some_and(|t| t.is_element())
    }

    pub fn into_expr(self) -> Expr {
        Expr::Enumerable(Box::new(self))
    }
}

/// The not-yet-materialized inner side of a group join. Equality of the two
/// keys becomes either a join predicate or a correlation predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedQuery {
    pub select: Select,
    pub outer_key: Expr,
    pub inner_key: Expr,
}

/// The scope of one group produced by `GroupBy`.
///
/// `select` is the ungrouped select the group draws from; `outer_key` is the
/// key as the grouped query sees it and `inner_key` the same key computed per
/// element, so the group's elements are the rows where the two agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupByResult {
    pub select: Select,
    pub outer_key: Expr,
    pub inner_key: Expr,
    pub element: Expr,
}

/// A grouping whose server side is only its key. `grouping` carries the
/// pending group scope (a `GroupByResult` or `Grouped` node) when the key
/// was split off it by a pushdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPlaceholder {
    pub key: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouping: Option<Expr>,
}

/// Point a pending group scope at a new outer key.
pub fn with_outer_key(grouping: Expr, key: Expr) -> Expr {
    match grouping {
        Expr::GroupByResult(mut group) => {
            group.outer_key = key;
            Expr::GroupByResult(group)
        }
        Expr::Grouped(mut grouped) => {
            grouped.outer_key = key;
            Expr::Grouped(grouped)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::column;

    #[test]
    fn test_element_transformation_is_not_a_sequence() {
        let select = Select::new(Projection::Server(column("t", "A")), None);
        let query = EnumerableQuery::new(select);
        assert!(query.is_sequence());
        assert!(query.with_transformation(TransformationMethod::ToList).is_sequence());
        assert!(!query.with_transformation(TransformationMethod::First).is_sequence());
    }

    #[test]
    fn test_row_limits() {
        assert_eq!(TransformationMethod::First.row_limit(), Some(1));
        assert_eq!(TransformationMethod::SingleOrDefault.row_limit(), Some(2));
        assert_eq!(TransformationMethod::ToArray.row_limit(), None);
    }
}

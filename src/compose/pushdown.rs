//! Wrapping a closed select as a derived table.

use tracing::debug;

use crate::expr::Expr;
use crate::ir::{KeyPlaceholder, Ordering, Projection, Select, Table, EMPTY_FLAG};

use super::references::{rewrite_projection, rewrite_references};

/// Wrap `select` as a derived table under `alias` and return a new, open
/// select reading every projected leaf from it.
///
/// Pending group scopes in the projection are first reduced to their keys,
/// since only the key survives as a column. Only the new outer projection
/// remembers the scopes; the derived table projects the bare keys. The ordering moves to the new
/// select when every ordering expression is projected; otherwise it stays
/// inside the derived table.
pub fn pushdown(select: &Select, alias: String) -> Select {
    debug!(alias = %alias, "pushing select down into derived table");
    let projection = inject_key_placeholders(&select.projection);
    let inner = select.update_projection(projection.map_server_bodies(&mut detach));

    let derived = Table::subquery(inner.clone(), alias.clone());
    let lifted: Option<Vec<Ordering>> = inner
        .order_by
        .iter()
        .map(|o| {
            rewrite_references(&derived, &o.expr).map(|expr| Ordering {
                expr,
                descending: o.descending,
            })
        })
        .collect();
    let (inner, order_by) = match lifted {
        Some(order_by) => (inner.without_unpaginated_ordering(), order_by),
        None => (inner, Vec::new()),
    };

    let outer_projection = rewrite_projection(&alias, &projection);
    Select::new(outer_projection, Some(Table::subquery(inner, alias))).update_order_by(order_by)
}

/// Push down for use as the nullable side of an outer join. The derived
/// table projects a constant `$empty` column next to the rows, and the new
/// projection tests it so padded rows read as null.
pub fn pushdown_nullable(select: &Select, alias: String) -> Select {
    let flagged = select.update_projection(Projection::Server(Expr::DefaultIfEmptyFlag(Box::new(
        select.projection.flatten(),
    ))));
    let pushed = pushdown(&flagged, alias.clone());
    let body = match pushed.projection.flatten() {
        Expr::DefaultIfEmptyFlag(inner) => Expr::DefaultIfEmptyTest {
            expr: inner,
            flag: Box::new(Expr::Column {
                table: alias,
                name: EMPTY_FLAG.to_string(),
            }),
        },
        other => other,
    };
    pushed.update_projection(Projection::Server(body))
}

/// Replace pending group scopes by key placeholders that remember them.
pub fn inject_key_placeholders(projection: &Projection) -> Projection {
    projection.map_server_bodies(&mut inject)
}

fn inject(expr: Expr) -> Expr {
    match expr {
        Expr::GroupByResult(group) => Expr::KeyPlaceholder(Box::new(KeyPlaceholder {
            key: group.outer_key.clone(),
            grouping: Some(Expr::GroupByResult(group)),
        })),
        Expr::Grouped(grouped) => Expr::KeyPlaceholder(Box::new(KeyPlaceholder {
            key: grouped.outer_key.clone(),
            grouping: Some(Expr::Grouped(grouped)),
        })),
        // nested queries keep their own scopes
        placeholder @ (Expr::KeyPlaceholder(_)
        | Expr::Exists(_)
        | Expr::In { .. }
        | Expr::SingleValue(_)
        | Expr::Enumerable(_)) => placeholder,
        other => other.map_children(&mut inject),
    }
}

/// Drop the pending scope from key placeholders of this select.
fn detach(expr: Expr) -> Expr {
    match expr {
        Expr::KeyPlaceholder(placeholder) => Expr::KeyPlaceholder(Box::new(KeyPlaceholder {
            key: placeholder.key,
            grouping: None,
        })),
        nested @ (Expr::Exists(_) | Expr::In { .. } | Expr::SingleValue(_) | Expr::Enumerable(_)) => {
            nested
        }
        other => other.map_children(&mut detach),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{column, constant, record};
    use crate::ir::{GroupByResult, Leaf};

    fn distinct_items() -> Select {
        Select::new(
            Projection::Server(record(vec![
                ("A", column("i", "A")),
                ("B", column("i", "B")),
            ])),
            Some(Table::Base {
                schema: None,
                name: "items".into(),
                alias: "i".into(),
            }),
        )
        .as_distinct()
    }

    #[test]
    fn test_pushdown_opens_the_select() {
        let pushed = pushdown(&distinct_items(), "t".into());
        assert!(!pushed.is_closed());
        assert!(pushed.predicate.is_none());
        assert_eq!(
            pushed.projection,
            Projection::Server(record(vec![("A", column("t", "A")), ("B", column("t", "B"))]))
        );
        match pushed.table {
            Some(Table::Subquery { select, alias }) => {
                assert_eq!(alias, "t");
                assert!(select.is_distinct);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_pushdown_keeps_leaf_names() {
        let select = distinct_items();
        let before: Vec<String> = select.projection.server_leaves().iter().map(Leaf::name).collect();
        let pushed = pushdown(&select, "t".into());
        let after: Vec<String> = pushed.projection.server_leaves().iter().map(Leaf::name).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_projected_ordering_is_lifted() {
        let select = distinct_items()
            .update_order_by(vec![Ordering {
                expr: column("i", "B"),
                descending: true,
            }]);
        let pushed = pushdown(&select, "t".into());
        assert_eq!(
            pushed.order_by,
            vec![Ordering {
                expr: column("t", "B"),
                descending: true,
            }]
        );
        match pushed.table {
            Some(Table::Subquery { select, .. }) => assert!(select.order_by.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unprojected_ordering_stays_inside() {
        let select = distinct_items().update_order_by(vec![Ordering {
            expr: column("i", "C"),
            descending: false,
        }]);
        let pushed = pushdown(&select, "t".into());
        assert!(pushed.order_by.is_empty());
        match pushed.table {
            Some(Table::Subquery { select, .. }) => assert_eq!(select.order_by.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_group_scope_becomes_key_column() {
        let base = distinct_items();
        let group = Expr::GroupByResult(Box::new(GroupByResult {
            select: base.clone(),
            outer_key: column("i", "A"),
            inner_key: column("i", "A"),
            element: column("i", "B"),
        }));
        let grouped = Select::new(Projection::Server(group), base.table.clone())
            .update_grouping(column("i", "A"));
        let pushed = pushdown(&grouped, "g".into());
        match pushed.projection.flatten() {
            Expr::KeyPlaceholder(placeholder) => {
                assert_eq!(placeholder.key, column("g", "Key"));
                match placeholder.grouping {
                    Some(Expr::GroupByResult(group)) => {
                        assert_eq!(group.outer_key, column("g", "Key"));
                        assert_eq!(group.inner_key, column("i", "A"));
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
        match pushed.table {
            Some(Table::Subquery { select, .. }) => match select.projection.flatten() {
                Expr::KeyPlaceholder(placeholder) => {
                    assert_eq!(placeholder.key, column("i", "A"));
                    assert!(placeholder.grouping.is_none());
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_nullable_pushdown_tests_the_flag() {
        let select = distinct_items().update_limit(constant(3));
        let pushed = pushdown_nullable(&select, "t".into());
        let leaves: Vec<String> = pushed.projection.server_leaves().iter().map(Leaf::name).collect();
        assert_eq!(leaves, vec!["A", "B", "$empty"]);
        assert!(matches!(
            pushed.projection.flatten(),
            Expr::DefaultIfEmptyTest { .. }
        ));
    }
}

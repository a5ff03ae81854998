//! Re-pointing expressions at a table that now wraps the rows they read.

use std::collections::HashSet;

use crate::expr::{replace_structural, Expr};
use crate::ir::{column_name, Projection, Table};

/// Rewrite `projection` to read each of its server leaves from the derived
/// table `alias`, which projects exactly those leaves.
pub fn rewrite_projection(alias: &str, projection: &Projection) -> Projection {
    projection.map_server_leaves(&mut |path, leaf| Expr::Column {
        table: alias.to_string(),
        name: column_name(path, &leaf),
    })
}

/// Rewrite `expr` against the leaf tables of `table` by structural match on
/// the leaves each derived table exposes.
///
/// Returns `None` if the result would still reference an alias that is only
/// declared inside one of those derived tables.
pub fn rewrite_references(table: &Table, expr: &Expr) -> Option<Expr> {
    let leaf_tables = table.flatten();
    let mut targets = Vec::new();
    for leaf_table in &leaf_tables {
        let Some(alias) = leaf_table.alias() else {
            continue;
        };
        for leaf in leaf_table.exposed_leaves() {
            if matches!(leaf.expr, Expr::Constant(_) | Expr::QueryParameter(_)) {
                continue;
            }
            let column = Expr::Column {
                table: alias.to_string(),
                name: leaf.name(),
            };
            targets.push((leaf.expr, column));
        }
    }
    let rewritten = replace_structural(expr.clone(), &targets);

    let visible: HashSet<&str> = leaf_tables.iter().filter_map(|t| t.alias()).collect();
    let hidden: HashSet<String> = table
        .defined_aliases()
        .into_iter()
        .filter(|alias| !visible.contains(alias.as_str()))
        .collect();
    let dangling =
        rewritten.any(&mut |e| matches!(e, Expr::Column { table, .. } if hidden.contains(table)));
    if dangling {
        None
    } else {
        Some(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{column, constant, record};
    use crate::ir::Select;

    fn derived() -> Table {
        let inner = Select::new(
            Projection::Server(record(vec![
                ("Id", column("o", "Id")),
                ("Total", column("o", "Amount").add(column("o", "Tax"))),
            ])),
            Some(Table::Base {
                schema: None,
                name: "orders".into(),
                alias: "o".into(),
            }),
        );
        Table::subquery(inner, "t".into())
    }

    #[test]
    fn test_projection_leaves_become_columns() {
        let projection = Projection::Server(record(vec![
            ("Id", column("o", "Id")),
            ("Total", column("o", "Amount").add(column("o", "Tax"))),
        ]));
        assert_eq!(
            rewrite_projection("t", &projection),
            Projection::Server(record(vec![
                ("Id", column("t", "Id")),
                ("Total", column("t", "Total")),
            ]))
        );
    }

    #[test]
    fn test_computed_leaf_is_matched_whole() {
        let expr = column("o", "Amount")
            .add(column("o", "Tax"))
            .greater_than(constant(10));
        assert_eq!(
            rewrite_references(&derived(), &expr),
            Some(column("t", "Total").greater_than(constant(10)))
        );
    }

    #[test]
    fn test_unexposed_column_does_not_resolve() {
        let expr = column("o", "CreatedAt");
        assert_eq!(rewrite_references(&derived(), &expr), None);
    }
}

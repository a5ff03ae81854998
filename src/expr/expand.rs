//! Parameter substitution and member reduction.

use super::{Expr, Lambda};

/// Replace free occurrences of the bound parameters. Lambdas that rebind a
/// name shadow it for their body.
pub fn substitute(expr: Expr, bindings: &[(String, Expr)]) -> Expr {
    if bindings.is_empty() {
        return expr;
    }
    match expr {
        Expr::Parameter(name) => match bindings.iter().find(|(bound, _)| *bound == name) {
            Some((_, value)) => value.clone(),
            None => Expr::Parameter(name),
        },
        Expr::Lambda(lambda) => {
            let remaining: Vec<(String, Expr)> = bindings
                .iter()
                .filter(|(bound, _)| !lambda.params.contains(bound))
                .cloned()
                .collect();
            let Lambda { params, body } = *lambda;
            Expr::Lambda(Box::new(Lambda {
                params,
                body: substitute(body, &remaining),
            }))
        }
        other => other.map_children(&mut |child| substitute(child, bindings)),
    }
}

/// Fold member accesses whose target is now known, bottom-up.
pub fn reduce_members(expr: Expr) -> Expr {
    match expr.map_children(&mut reduce_members) {
        Expr::Member { expr, member } => reduce_member(*expr, member),
        other => other,
    }
}

fn reduce_member(target: Expr, member: String) -> Expr {
    match target {
        Expr::Record { type_name, mut fields } => {
            match fields.iter().position(|(name, _)| *name == member) {
                Some(index) => fields.swap_remove(index).1,
                None => Expr::Member {
                    expr: Box::new(Expr::Record { type_name, fields }),
                    member,
                },
            }
        }
        Expr::Materialize(materialize) => reduce_member(materialize.expr, member),
        Expr::DefaultIfEmptyTest { expr, flag } => Expr::DefaultIfEmptyTest {
            expr: Box::new(reduce_member(*expr, member)),
            flag,
        },
        Expr::GroupByResult(group) if member == "Key" => group.outer_key,
        Expr::KeyPlaceholder(placeholder) if member == "Key" => placeholder.key,
        Expr::Grouping { key, .. } if member == "Key" => *key,
        target => Expr::Member {
            expr: Box::new(target),
            member,
        },
    }
}

/// True if `name` occurs free in `expr`.
pub fn references_parameter(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Parameter(p) => p == name,
        Expr::Lambda(lambda) if lambda.params.iter().any(|p| p == name) => false,
        other => other
            .children()
            .into_iter()
            .any(|child| references_parameter(child, name)),
    }
}

/// Replace every subtree structurally equal to a `from` side with its `to`
/// side, top-down.
pub fn replace_structural(expr: Expr, pairs: &[(Expr, Expr)]) -> Expr {
    if pairs.is_empty() {
        return expr;
    }
    if let Some((_, to)) = pairs.iter().find(|(from, _)| *from == expr) {
        return to.clone();
    }
    expr.map_children(&mut |child| replace_structural(child, pairs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::*;

    #[test]
    fn test_substitute_respects_shadowing() {
        let body = param("x").member("A").equal(constant(1)).and(
            source("orders", &["Id"]).call(
                SequenceOperator::Any,
                vec![lambda(&["x"], param("x").member("Id").equal(constant(2)))],
            ),
        );
        let out = substitute(body, &[("x".to_string(), column("c", "x"))]);
        // the inner lambda rebinds x and must keep its own parameter
        assert!(!references_parameter(&out, "x"));
        assert!(out.any(&mut |e| matches!(e, Expr::Parameter(p) if p == "x")));
    }

    #[test]
    fn test_reduce_through_group_and_placeholder_keys() {
        let placeholder = Expr::KeyPlaceholder(Box::new(crate::ir::KeyPlaceholder {
            key: column("t", "Category"),
            grouping: None,
        }));
        assert_eq!(
            reduce_members(placeholder.member("Key")),
            column("t", "Category")
        );
    }

    #[test]
    fn test_reduce_through_default_if_empty_test() {
        let test = Expr::DefaultIfEmptyTest {
            expr: Box::new(record(vec![("A", column("o", "A"))])),
            flag: Box::new(column("o", "$empty")),
        };
        assert_eq!(
            reduce_members(test.member("A")),
            Expr::DefaultIfEmptyTest {
                expr: Box::new(column("o", "A")),
                flag: Box::new(column("o", "$empty")),
            }
        );
    }

    #[test]
    fn test_unknown_member_is_kept() {
        let expr = record(vec![("A", constant(1))]).member("B");
        assert!(matches!(reduce_members(expr), Expr::Member { .. }));
    }

    #[test]
    fn test_replace_structural() {
        let expr = column("a", "X").add(column("a", "Y"));
        let out = replace_structural(expr, &[(column("a", "X"), column("t", "X"))]);
        assert_eq!(out, column("t", "X").add(column("a", "Y")));
    }
}

//! Leaf decomposition of projection bodies.
//!
//! A projection body is a tree of records, groups, markers and scalars. The
//! scalars are its leaves; each has a dotted path from the root. A select
//! renders one column per leaf, named after the path, and the reference
//! rewriter uses the same paths to find a leaf again once the select has
//! become a derived table.

use crate::expr::{replace_structural, Expr, Value};

use super::with_outer_key;

/// Column name of a non-column scalar at the root of a projection.
pub const SCALAR_LEAF: &str = "$c";
/// Column carrying the real/pad flag of an outer-joined row.
pub const EMPTY_FLAG: &str = "$empty";
const SHADOW_PREFIX: &str = "$shadow";

#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub path: String,
    pub expr: Expr,
}

impl Leaf {
    pub fn name(&self) -> String {
        column_name(&self.path, &self.expr)
    }
}

pub fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// The column name a leaf is exposed under.
pub fn column_name(path: &str, expr: &Expr) -> String {
    if !path.is_empty() {
        return path.to_string();
    }
    let mut inner = expr;
    while let Expr::DefaultIfEmptyTest { expr, .. } = inner {
        inner = expr;
    }
    match inner {
        Expr::Column { name, .. } => name.clone(),
        _ => SCALAR_LEAF.to_string(),
    }
}

pub fn gather_leaves(body: &Expr, path: &str) -> Vec<Leaf> {
    let mut leaves = Vec::new();
    gather_into(body, path, &mut leaves);
    leaves
}

fn gather_into(body: &Expr, path: &str, out: &mut Vec<Leaf>) {
    match body {
        Expr::Record { fields, .. } => {
            for (name, field) in fields {
                gather_into(field, &join_path(path, name), out);
            }
        }
        Expr::DefaultIfEmptyFlag(expr) => {
            gather_into(expr, path, out);
            out.push(Leaf {
                path: join_path(path, EMPTY_FLAG),
                expr: Expr::Constant(Value::Int(1)),
            });
        }
        Expr::DefaultIfEmptyTest { expr, flag } => {
            let mut inner = Vec::new();
            gather_into(expr, path, &mut inner);
            out.extend(inner.into_iter().map(|leaf| Leaf {
                path: leaf.path,
                expr: Expr::DefaultIfEmptyTest {
                    expr: Box::new(leaf.expr),
                    flag: flag.clone(),
                },
            }));
            out.push(Leaf {
                path: join_path(path, EMPTY_FLAG),
                expr: (**flag).clone(),
            });
        }
        Expr::Materialize(materialize) => {
            gather_into(&materialize.expr, path, out);
            for (name, shadow) in &materialize.shadow_properties {
                out.push(Leaf {
                    path: join_path(path, &format!("{}.{}", SHADOW_PREFIX, name)),
                    expr: shadow.clone(),
                });
            }
        }
        Expr::KeyPlaceholder(placeholder) => {
            gather_into(&placeholder.key, &join_path(path, "Key"), out);
        }
        Expr::Grouping { key, elements } => {
            gather_into(key, &join_path(path, "Key"), out);
            out.push(Leaf {
                path: join_path(path, "Elements"),
                expr: (**elements).clone(),
            });
        }
        other => out.push(Leaf {
            path: path.to_string(),
            expr: other.clone(),
        }),
    }
}

/// Rebuild `body` with every leaf replaced by `f(path, leaf)`, keeping the
/// structure around the leaves.
pub fn map_leaves(body: Expr, path: &str, f: &mut dyn FnMut(&str, Expr) -> Expr) -> Expr {
    match body {
        Expr::Record { type_name, fields } => Expr::Record {
            type_name,
            fields: fields
                .into_iter()
                .map(|(name, field)| {
                    let mapped = map_leaves(field, &join_path(path, &name), f);
                    (name, mapped)
                })
                .collect(),
        },
        Expr::DefaultIfEmptyFlag(expr) => {
            Expr::DefaultIfEmptyFlag(Box::new(map_leaves(*expr, path, f)))
        }
        Expr::DefaultIfEmptyTest { expr, flag } => {
            let expr = map_leaves(*expr, path, f);
            let flag = f(&join_path(path, EMPTY_FLAG), *flag);
            Expr::DefaultIfEmptyTest {
                expr: Box::new(expr),
                flag: Box::new(flag),
            }
        }
        Expr::Materialize(materialize) => {
            let mut materialize = *materialize;
            let mut replaced = Vec::new();
            materialize.expr = map_leaves(materialize.expr, path, &mut |leaf_path, leaf| {
                let mapped = f(leaf_path, leaf.clone());
                replaced.push((leaf, mapped.clone()));
                mapped
            });
            materialize.key = replace_structural(materialize.key, &replaced);
            materialize.shadow_properties = materialize
                .shadow_properties
                .into_iter()
                .map(|(name, shadow)| {
                    let shadow_path = join_path(path, &format!("{}.{}", SHADOW_PREFIX, name));
                    let mapped = f(&shadow_path, shadow);
                    (name, mapped)
                })
                .collect();
            Expr::Materialize(Box::new(materialize))
        }
        Expr::KeyPlaceholder(placeholder) => {
            let mut placeholder = *placeholder;
            placeholder.key = map_leaves(placeholder.key, &join_path(path, "Key"), f);
            let key = placeholder.key.clone();
            placeholder.grouping = placeholder.grouping.map(|g| with_outer_key(g, key));
            Expr::KeyPlaceholder(Box::new(placeholder))
        }
        Expr::Grouping { key, elements } => Expr::Grouping {
            key: Box::new(map_leaves(*key, &join_path(path, "Key"), f)),
            elements: Box::new(f(&join_path(path, "Elements"), *elements)),
        },
        other => f(path, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{column, constant, record};

    #[test]
    fn test_root_column_keeps_its_name() {
        let leaves = gather_leaves(&column("t", "Price"), "");
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].name(), "Price");
        assert_eq!(gather_leaves(&constant(1), "")[0].name(), SCALAR_LEAF);
    }

    #[test]
    fn test_nested_record_paths() {
        let body = record(vec![
            ("A", column("t", "A")),
            ("Inner", record(vec![("B", column("t", "B"))])),
        ]);
        let names: Vec<String> = gather_leaves(&body, "").iter().map(Leaf::name).collect();
        assert_eq!(names, vec!["A".to_string(), "Inner.B".to_string()]);
    }

    #[test]
    fn test_flag_adds_empty_leaf() {
        let body = Expr::DefaultIfEmptyFlag(Box::new(record(vec![("A", column("o", "A"))])));
        let names: Vec<String> = gather_leaves(&body, "").iter().map(Leaf::name).collect();
        assert_eq!(names, vec!["A".to_string(), EMPTY_FLAG.to_string()]);
    }

    #[test]
    fn test_map_leaves_keeps_structure() {
        let body = record(vec![("A", column("t", "A")), ("B", column("t", "B"))]);
        let mapped = map_leaves(body, "", &mut |path, _| column("d", path));
        assert_eq!(
            mapped,
            record(vec![("A", column("d", "A")), ("B", column("d", "B"))])
        );
    }

    #[test]
    fn test_map_leaves_rewrites_materialization_key() {
        let body = crate::ir::EntityMaterialization {
            entity_type: "Customer".into(),
            key: column("c", "Id"),
            shadow_properties: vec![("Version".into(), column("c", "Version"))],
            tracking: crate::ir::TrackingMode::Tracked,
            expr: record(vec![("Id", column("c", "Id")), ("Name", column("c", "Name"))]),
        }
        .into_expr();
        let mapped = map_leaves(body, "", &mut |path, _| column("t", path));
        match mapped {
            Expr::Materialize(m) => {
                assert_eq!(m.key, column("t", "Id"));
                assert_eq!(m.shadow_properties[0].1, column("t", "$shadow.Version"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

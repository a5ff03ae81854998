use serde::{Deserialize, Serialize};

use crate::expr::{Expr, Value};

use super::leaves::Leaf;
use super::Select;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    Left,
    Cross,
    /// Right side evaluated per left row; rows without a match are dropped.
    CrossApply,
    /// Right side evaluated per left row; rows without a match are padded.
    OuterApply,
}

impl JoinKind {
    pub fn has_predicate(self) -> bool {
        matches!(self, JoinKind::Inner | JoinKind::Left)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOperator {
    Union,
    UnionAll,
    Except,
    Intersect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinTable {
    pub kind: JoinKind,
    pub left: Table,
    pub right: Table,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetOperationTable {
    pub operator: SetOperator,
    pub left: Select,
    pub right: Select,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Base {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        name: String,
        alias: String,
    },
    Subquery {
        select: Box<Select>,
        alias: String,
    },
    Join(Box<JoinTable>),
    SetOperation(Box<SetOperationTable>),
}

impl Table {
    pub fn join(kind: JoinKind, left: Table, right: Table, predicate: Option<Expr>) -> Table {
        let predicate = if kind.has_predicate() {
            predicate.or(Some(always_true()))
        } else {
            None
        };
        Table::Join(Box::new(JoinTable {
            kind,
            left,
            right,
            predicate,
        }))
    }

    pub fn subquery(select: Select, alias: String) -> Table {
        Table::Subquery {
            select: Box::new(select),
            alias,
        }
    }

    /// The alias of a leaf table; joins have none.
    pub fn alias(&self) -> Option<&str> {
        match self {
            Table::Base { alias, .. }
            | Table::Subquery { alias, .. } => Some(alias.as_str()),
            Table::SetOperation(set) => Some(set.alias.as_str()),
            Table::Join(_) => None,
        }
    }

    /// Leaf aliased tables, depth-first, left to right.
    pub fn flatten(&self) -> Vec<&Table> {
        match self {
            Table::Join(join) => {
                let mut tables = join.left.flatten();
                tables.extend(join.right.flatten());
                tables
            }
            leaf => vec![leaf],
        }
    }

    /// Columns a leaf table exposes through a projection. Base tables expose
    /// their columns directly and report none.
    pub fn exposed_leaves(&self) -> Vec<Leaf> {
        match self {
            Table::Subquery { select, .. } => select.projection.server_leaves(),
            Table::SetOperation(set) => set.left.projection.server_leaves(),
            Table::Base { .. } | Table::Join(_) => Vec::new(),
        }
    }

    /// Every alias declared in this table tree, including inside derived tables.
    pub fn defined_aliases(&self) -> Vec<String> {
        match self {
            Table::Base { alias, .. } => vec![alias.clone()],
            Table::Subquery { select, alias } => {
                let mut aliases = vec![alias.clone()];
                aliases.extend(select.defined_aliases());
                aliases
            }
            Table::Join(join) => {
                let mut aliases = join.left.defined_aliases();
                aliases.extend(join.right.defined_aliases());
                aliases
            }
            Table::SetOperation(set) => {
                let mut aliases = vec![set.alias.clone()];
                aliases.extend(set.left.defined_aliases());
                aliases.extend(set.right.defined_aliases());
                aliases
            }
        }
    }

    /// Rename declared aliases only; column references are left to the caller.
    pub(crate) fn rename_declared(self, rename: &dyn Fn(&str) -> String) -> Table {
        match self {
            Table::Base {
                schema,
                name,
                alias,
            } => Table::Base {
                schema,
                name,
                alias: rename(&alias),
            },
            Table::Subquery { select, alias } => Table::Subquery {
                select: Box::new(select.rename_declared(rename)),
                alias: rename(&alias),
            },
            Table::Join(join) => {
                let JoinTable {
                    kind,
                    left,
                    right,
                    predicate,
                } = *join;
                Table::Join(Box::new(JoinTable {
                    kind,
                    left: left.rename_declared(rename),
                    right: right.rename_declared(rename),
                    predicate,
                }))
            }
            Table::SetOperation(set) => {
                let SetOperationTable {
                    operator,
                    left,
                    right,
                    alias,
                } = *set;
                Table::SetOperation(Box::new(SetOperationTable {
                    operator,
                    left: left.rename_declared(rename),
                    right: right.rename_declared(rename),
                    alias: rename(&alias),
                }))
            }
        }
    }

    pub fn try_map_exprs<E, F>(self, f: &mut F) -> Result<Table, E>
    where
        F: FnMut(Expr) -> Result<Expr, E>,
    {
        Ok(match self {
            base @ Table::Base { .. } => base,
            Table::Subquery { select, alias } => Table::Subquery {
                select: Box::new(select.try_map_exprs(f)?),
                alias,
            },
            Table::Join(join) => {
                let JoinTable {
                    kind,
                    left,
                    right,
                    predicate,
                } = *join;
                Table::Join(Box::new(JoinTable {
                    kind,
                    left: left.try_map_exprs(f)?,
                    right: right.try_map_exprs(f)?,
                    predicate: predicate.map(|p| f(p)).transpose()?,
                }))
            }
            Table::SetOperation(set) => {
                let SetOperationTable {
                    operator,
                    left,
                    right,
                    alias,
                } = *set;
                Table::SetOperation(Box::new(SetOperationTable {
                    operator,
                    left: left.try_map_exprs(f)?,
                    right: right.try_map_exprs(f)?,
                    alias,
                }))
            }
        })
    }

    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Table::Base { .. } => Vec::new(),
            Table::Subquery { select, .. } => select.exprs(),
            Table::Join(join) => {
                let mut exprs = join.left.exprs();
                exprs.extend(join.right.exprs());
                exprs.extend(join.predicate.iter());
                exprs
            }
            Table::SetOperation(set) => {
                let mut exprs = set.left.exprs();
                exprs.extend(set.right.exprs());
                exprs
            }
        }
    }
}

/// `1 = 1`, the predicate of a join that keeps every pair.
pub fn always_true() -> Expr {
    Expr::Binary {
        op: crate::expr::BinaryOperator::Equal,
        left: Box::new(Expr::Constant(Value::Int(1))),
        right: Box::new(Expr::Constant(Value::Int(1))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::column;
    use crate::ir::Projection;

    fn base(name: &str, alias: &str) -> Table {
        Table::Base {
            schema: None,
            name: name.into(),
            alias: alias.into(),
        }
    }

    #[test]
    fn test_flatten_is_depth_first() {
        let inner = Table::subquery(
            Select::new(Projection::Server(column("o", "Id")), Some(base("orders", "o"))),
            "t".into(),
        );
        let table = Table::join(
            JoinKind::Inner,
            Table::join(JoinKind::Cross, base("a", "a"), base("b", "b"), None),
            inner,
            Some(column("a", "Id").equal(column("t", "Id"))),
        );
        let aliases: Vec<&str> = table.flatten().iter().filter_map(|t| t.alias()).collect();
        assert_eq!(aliases, vec!["a", "b", "t"]);
        assert_eq!(table.defined_aliases(), vec!["a", "b", "t", "o"]);
    }

    #[test]
    fn test_cross_join_drops_predicate() {
        let table = Table::join(
            JoinKind::Cross,
            base("a", "a"),
            base("b", "b"),
            Some(column("a", "Id").equal(column("b", "Id"))),
        );
        match table {
            Table::Join(join) => assert!(join.predicate.is_none()),
            other => panic!("unexpected {:?}", other),
        }
    }
}

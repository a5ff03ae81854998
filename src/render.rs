//! SQL rendering of composed queries.
//!
//! The renderer writes the relational part of a [`ComposedQuery`] through a
//! [`DialectFormatter`]. Every projected leaf is written with its leaf name
//! as column alias, so derived tables expose exactly the names the composer
//! resolved references against.

use serde::Serialize;

use crate::compose::ComposedQuery;
use crate::dialect::DialectFormatter;
use crate::error::{ComposeError, Result};
use crate::expr::{AggregateFunction, BinaryOperator, Expr, UnaryOperator, Value};
use crate::ir::{gather_leaves, Select, SetOperator, Table};

/// SQL text plus the query parameters it references, in first-use order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedSql {
    pub sql: String,
    pub parameters: Vec<String>,
}

pub struct SqlRenderer<'d> {
    dialect: &'d dyn DialectFormatter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Value,
    Predicate,
}

impl<'d> SqlRenderer<'d> {
    pub fn new(dialect: &'d dyn DialectFormatter) -> Self {
        Self { dialect }
    }

    /// Render the database side of `query`. Operators left for the client
    /// are not part of the SQL.
    pub fn render(&self, query: &ComposedQuery) -> Result<RenderedSql> {
        let select = query
            .relational_select()
            .ok_or(ComposeError::NoRelationalQuery)?;
        self.render_select(select)
    }

    pub fn render_select(&self, select: &Select) -> Result<RenderedSql> {
        let mut emitter = Emitter {
            dialect: self.dialect,
            parameters: Vec::new(),
        };
        let sql = emitter.select(select, true)?;
        Ok(RenderedSql {
            sql,
            parameters: emitter.parameters,
        })
    }
}

struct Emitter<'d> {
    dialect: &'d dyn DialectFormatter,
    parameters: Vec<String>,
}

fn unrenderable(what: &str) -> ComposeError {
    ComposeError::Unrenderable(what.to_string())
}

/// Boolean-valued expressions, as opposed to values that may be boolean.
fn is_predicate(expr: &Expr) -> bool {
    match expr {
        Expr::Binary { op, .. } => op.is_comparison() || op.is_logical(),
        Expr::Unary {
            op: UnaryOperator::Not,
            ..
        } => true,
        Expr::Exists(_) | Expr::In { .. } | Expr::Constant(Value::Bool(_)) => true,
        Expr::KeyPlaceholder(placeholder) => is_predicate(&placeholder.key),
        _ => false,
    }
}

impl<'d> Emitter<'d> {
    fn quote(&self, ident: &str) -> String {
        self.dialect.quote_identifier(ident)
    }

    fn select(&mut self, select: &Select, top_level: bool) -> Result<String> {
        let mut columns = Vec::new();
        for leaf in select.projection.server_leaves() {
            let name = leaf.name();
            let sql = self.expr(&leaf.expr, Position::Value)?;
            columns.push(format!("{} AS {}", sql, self.quote(&name)));
        }
        if columns.is_empty() {
            columns.push("1".to_string());
        }

        let limit = select
            .limit
            .as_ref()
            .map(|e| self.expr(e, Position::Value))
            .transpose()?;
        let offset = select
            .offset
            .as_ref()
            .map(|e| self.expr(e, Position::Value))
            .transpose()?;
        let pagination = self
            .dialect
            .format_pagination(limit.as_deref(), offset.as_deref());

        let mut sql = String::from("SELECT ");
        if select.is_distinct {
            sql.push_str("DISTINCT ");
        }
        if let Some(prefix) = &pagination.prefix {
            sql.push_str(prefix);
            sql.push(' ');
        }
        sql.push_str(&columns.join(", "));

        if let Some(table) = &select.table {
            sql.push_str(" FROM ");
            sql.push_str(&self.table(table)?);
        }
        if let Some(predicate) = &select.predicate {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expr(predicate, Position::Predicate)?);
        }
        if let Some(grouping) = &select.grouping {
            let keys = gather_leaves(grouping, "")
                .iter()
                .map(|leaf| self.expr(&leaf.expr, Position::Value))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" GROUP BY ");
            sql.push_str(&keys.join(", "));
        }

        let paginated = select.limit.is_some() || select.offset.is_some();
        let keep_ordering =
            top_level || paginated || self.dialect.allows_unpaginated_subquery_ordering();
        if !select.order_by.is_empty() && keep_ordering {
            let keys = select
                .order_by
                .iter()
                .map(|o| {
                    let key = self.expr(&o.expr, Position::Value)?;
                    Ok(if o.descending {
                        format!("{} DESC", key)
                    } else {
                        key
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        } else if pagination.requires_order_by {
            sql.push_str(" ORDER BY (SELECT 1)");
        }
        if let Some(suffix) = &pagination.suffix {
            sql.push(' ');
            sql.push_str(suffix);
        }
        Ok(sql)
    }

    fn table(&mut self, table: &Table) -> Result<String> {
        match table {
            Table::Base {
                schema,
                name,
                alias,
            } => {
                let name = match schema {
                    Some(schema) => format!("{}.{}", self.quote(schema), self.quote(name)),
                    None => self.quote(name),
                };
                Ok(format!("{} AS {}", name, self.quote(alias)))
            }
            Table::Subquery { select, alias } => {
                let sql = self.select(select, false)?;
                Ok(format!("({}) AS {}", sql, self.quote(alias)))
            }
            Table::Join(join) => {
                let left = self.table(&join.left)?;
                let right = self.table(&join.right)?;
                let mut sql = format!(
                    "{} {} {}",
                    left,
                    self.dialect.join_keyword(join.kind),
                    right
                );
                match &join.predicate {
                    Some(predicate) => {
                        sql.push_str(" ON ");
                        sql.push_str(&self.expr(predicate, Position::Predicate)?);
                    }
                    None => {
                        if let Some(suffix) = self.dialect.join_suffix(join.kind) {
                            sql.push(' ');
                            sql.push_str(suffix);
                        }
                    }
                }
                Ok(sql)
            }
            Table::SetOperation(set) => {
                let keyword = match set.operator {
                    SetOperator::Union => "UNION",
                    SetOperator::UnionAll => "UNION ALL",
                    SetOperator::Except => "EXCEPT",
                    SetOperator::Intersect => "INTERSECT",
                };
                let left = self.select(&set.left, false)?;
                let right = self.select(&set.right, false)?;
                Ok(format!(
                    "(({}) {} ({})) AS {}",
                    left,
                    keyword,
                    right,
                    self.quote(&set.alias)
                ))
            }
        }
    }

    fn expr(&mut self, expr: &Expr, position: Position) -> Result<String> {
        if !self.dialect.native_booleans() {
            match position {
                Position::Value if is_predicate(expr) => {
                    let test = self.expr(expr, Position::Predicate)?;
                    return Ok(format!(
                        "CASE WHEN {} THEN {} ELSE {} END",
                        test,
                        self.dialect.format_boolean(true),
                        self.dialect.format_boolean(false)
                    ));
                }
                Position::Predicate if !is_predicate(expr) => {
                    let value = self.expr(expr, Position::Value)?;
                    return Ok(format!("{} = 1", value));
                }
                _ => {}
            }
        }

        match expr {
            Expr::Constant(value) => Ok(self.constant(value, position)),
            Expr::QueryParameter(name) => {
                if !self.parameters.contains(name) {
                    self.parameters.push(name.clone());
                }
                Ok(self.dialect.format_parameter_name(name))
            }
            Expr::Column { table, name } => {
                Ok(format!("{}.{}", self.quote(table), self.quote(name)))
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::Unary { op, expr } => match op {
                UnaryOperator::Not => Ok(format!(
                    "NOT ({})",
                    self.expr(expr, Position::Predicate)?
                )),
                UnaryOperator::Negate => Ok(format!("-({})", self.expr(expr, Position::Value)?)),
            },
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => Ok(format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                self.expr(test, Position::Predicate)?,
                self.expr(if_true, Position::Value)?,
                self.expr(if_false, Position::Value)?
            )),
            Expr::Aggregate { function, argument } => {
                let name = self.dialect.aggregate_name(*function);
                let argument = match argument {
                    Some(argument) => self.expr(argument, Position::Value)?,
                    None => {
                        debug_assert!(matches!(
                            function,
                            AggregateFunction::Count | AggregateFunction::LongCount
                        ));
                        "*".to_string()
                    }
                };
                Ok(format!("{}({})", name, argument))
            }
            Expr::Function { name, args } => {
                let args = args
                    .iter()
                    .map(|a| self.expr(a, Position::Value))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("{}({})", name, args.join(", ")))
            }
            Expr::Cast { expr, ty } => Ok(format!(
                "CAST({} AS {})",
                self.expr(expr, Position::Value)?,
                self.dialect.type_name(*ty)
            )),
            Expr::Exists(select) => Ok(format!("EXISTS ({})", self.select(select, false)?)),
            Expr::In { value, select } => Ok(format!(
                "{} IN ({})",
                self.expr(value, Position::Value)?,
                self.select(select, false)?
            )),
            Expr::SingleValue(select) => Ok(format!("({})", self.select(select, false)?)),
            Expr::Enumerable(query) => {
                let dialect = self.dialect;
                dialect.format_complex_type_subquery(&query.select, &mut |nested: &Select| {
                    self.select(nested, false)
                })
            }
            Expr::KeyPlaceholder(placeholder) => self.expr(&placeholder.key, position),
            Expr::DefaultIfEmptyFlag(expr) => self.expr(expr, position),
            Expr::DefaultIfEmptyTest { expr, flag } => Ok(format!(
                "CASE WHEN {} IS NULL THEN NULL ELSE {} END",
                self.expr(flag, Position::Value)?,
                self.expr(expr, Position::Value)?
            )),
            Expr::Parameter(name) => Err(unrenderable(&format!("lambda parameter {}", name))),
            Expr::ClientCall { function, .. } => {
                Err(unrenderable(&format!("client call {}", function)))
            }
            Expr::Call(call) => Err(unrenderable(&format!(
                "in-memory call {}",
                call.operator.name()
            ))),
            Expr::Member { member, .. } => Err(unrenderable(&format!("member access .{}", member))),
            Expr::Record { .. } => Err(unrenderable("record in scalar position")),
            Expr::Lambda(_) => Err(unrenderable("lambda")),
            Expr::Comparer(_) => Err(unrenderable("comparer")),
            Expr::Source(source) => Err(unrenderable(&format!("source {}", source.table))),
            Expr::Grouped(_) | Expr::GroupByResult(_) | Expr::Grouping { .. } => {
                Err(unrenderable("group scope"))
            }
            Expr::Materialize(_) => Err(unrenderable("entity in scalar position")),
        }
    }

    fn constant(&self, value: &Value, position: Position) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) if position == Position::Predicate && !self.dialect.native_booleans() => {
                if *b { "1 = 1" } else { "1 = 0" }.to_string()
            }
            Value::Bool(b) => self.dialect.format_boolean(*b),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format!("{:?}", f),
            Value::String(s) => self.dialect.quote_string(s),
        }
    }

    fn binary(&mut self, op: BinaryOperator, left: &Expr, right: &Expr) -> Result<String> {
        // records compare leaf by leaf
        if matches!(left, Expr::Record { .. }) || matches!(right, Expr::Record { .. }) {
            return self.record_comparison(op, left, right);
        }
        let symbol = match op {
            BinaryOperator::AndAlso => {
                return Ok(format!(
                    "({} AND {})",
                    self.expr(left, Position::Predicate)?,
                    self.expr(right, Position::Predicate)?
                ))
            }
            BinaryOperator::OrElse => {
                return Ok(format!(
                    "({} OR {})",
                    self.expr(left, Position::Predicate)?,
                    self.expr(right, Position::Predicate)?
                ))
            }
            BinaryOperator::Coalesce => {
                return Ok(format!(
                    "COALESCE({}, {})",
                    self.expr(left, Position::Value)?,
                    self.expr(right, Position::Value)?
                ))
            }
            BinaryOperator::Equal | BinaryOperator::NotEqual
                if left.is_null_constant() || right.is_null_constant() =>
            {
                let operand = if left.is_null_constant() { right } else { left };
                let test = if op == BinaryOperator::Equal {
                    "IS NULL"
                } else {
                    "IS NOT NULL"
                };
                return Ok(format!("{} {}", self.expr(operand, Position::Value)?, test));
            }
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
        };
        let left = self.expr(left, Position::Value)?;
        let right = self.expr(right, Position::Value)?;
        if op.is_comparison() {
            Ok(format!("{} {} {}", left, symbol, right))
        } else {
            Ok(format!("({} {} {})", left, symbol, right))
        }
    }

    fn record_comparison(&mut self, op: BinaryOperator, left: &Expr, right: &Expr) -> Result<String> {
        let joiner = match op {
            BinaryOperator::Equal => " AND ",
            BinaryOperator::NotEqual => " OR ",
            _ => return Err(unrenderable("record in arithmetic or ordering comparison")),
        };
        let left = gather_leaves(left, "");
        let right = gather_leaves(right, "");
        if left.len() != right.len() || left.iter().zip(&right).any(|(l, r)| l.path != r.path) {
            return Err(unrenderable("comparison of records with different shapes"));
        }
        let parts = left
            .iter()
            .zip(&right)
            .map(|(l, r)| {
                let pair = Expr::Binary {
                    op,
                    left: Box::new(l.expr.clone()),
                    right: Box::new(r.expr.clone()),
                };
                self.expr(&pair, Position::Predicate)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("({})", parts.join(joiner)))
    }
}

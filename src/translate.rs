//! Server translatability.
//!
//! Every composition decision asks one question of an expanded expression:
//! can the database evaluate all of it? The answer comes from a
//! [`TranslatabilityAnalyzer`], so providers can narrow or widen what their
//! database supports.

use crate::expr::Expr;
use crate::ir::{Projection, Select};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translatability {
    Translatable,
    NotTranslatable,
}

/// Classifies expressions. Must be total and depend only on the shape of the
/// expression.
pub trait TranslatabilityAnalyzer: Send + Sync {
    fn classify(&self, expr: &Expr) -> Translatability;

    fn is_translatable(&self, expr: &Expr) -> bool {
        self.classify(expr) == Translatability::Translatable
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTranslatabilityAnalyzer {
    /// Whether nested record-shaped subqueries (collections inside a row)
    /// can be rendered, e.g. as aggregated JSON.
    pub complex_type_subqueries: bool,
}

impl DefaultTranslatabilityAnalyzer {
    pub fn new(complex_type_subqueries: bool) -> Self {
        Self {
            complex_type_subqueries,
        }
    }

    fn translatable(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Constant(_) | Expr::QueryParameter(_) | Expr::Column { .. } => true,

            Expr::Parameter(_)
            | Expr::Comparer(_)
            | Expr::Lambda(_)
            | Expr::Member { .. }
            | Expr::ClientCall { .. }
            | Expr::Source(_)
            | Expr::Call(_)
            | Expr::Grouped(_) => false,

            Expr::Record { fields, .. } => fields.iter().all(|(_, e)| self.translatable(e)),
            Expr::Binary { left, right, .. } => {
                self.translatable(left) && self.translatable(right)
            }
            Expr::Unary { expr, .. } | Expr::Cast { expr, .. } => self.translatable(expr),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                self.translatable(test) && self.translatable(if_true) && self.translatable(if_false)
            }
            Expr::Aggregate { argument, .. } => {
                argument.as_ref().map_or(true, |a| self.translatable(a))
            }
            Expr::Function { args, .. } => args.iter().all(|a| self.translatable(a)),

            Expr::Exists(select) => self.select_translatable(select, false),
            Expr::In { value, select } => {
                self.translatable(value) && self.select_translatable(select, true)
            }
            Expr::SingleValue(select) => self.select_translatable(select, true),
            Expr::Enumerable(query) => {
                self.complex_type_subqueries && self.select_translatable(&query.select, true)
            }
            Expr::GroupByResult(group) => {
                self.complex_type_subqueries
                    && self.translatable(&group.outer_key)
                    && self.translatable(&group.inner_key)
                    && self.translatable(&group.element)
                    && self.select_translatable(&group.select, false)
            }
            Expr::KeyPlaceholder(placeholder) => self.translatable(&placeholder.key),
            Expr::Grouping { key, elements } => {
                self.translatable(key) && self.translatable(elements)
            }
            Expr::DefaultIfEmptyFlag(expr) => self.translatable(expr),
            Expr::DefaultIfEmptyTest { expr, flag } => {
                self.translatable(expr) && self.translatable(flag)
            }
            Expr::Materialize(materialize) => {
                self.translatable(&materialize.expr)
                    && self.translatable(&materialize.key)
                    && materialize
                        .shadow_properties
                        .iter()
                        .all(|(_, e)| self.translatable(e))
            }
        }
    }

    /// A nested select is translatable when everything the database has to
    /// evaluate in it is; the projection only counts where its values are used.
    fn select_translatable(&self, select: &Select, projection_used: bool) -> bool {
        if projection_used && !self.projection_translatable(&select.projection) {
            return false;
        }
        let clauses = select
            .predicate
            .iter()
            .chain(select.order_by.iter().map(|o| &o.expr))
            .chain(select.limit.iter())
            .chain(select.offset.iter())
            .chain(select.grouping.iter());
        for expr in clauses {
            if !self.translatable(expr) {
                return false;
            }
        }
        match &select.table {
            Some(table) => table.exprs().into_iter().all(|e| self.translatable(e)),
            None => true,
        }
    }

    fn projection_translatable(&self, projection: &Projection) -> bool {
        match projection {
            Projection::Server(body) => self.translatable(body),
            Projection::Client { .. } | Projection::Composite { .. } => false,
        }
    }
}

impl TranslatabilityAnalyzer for DefaultTranslatabilityAnalyzer {
    fn classify(&self, expr: &Expr) -> Translatability {
        if self.translatable(expr) {
            Translatability::Translatable
        } else {
            Translatability::NotTranslatable
        }
    }
}

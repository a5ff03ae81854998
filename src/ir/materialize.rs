//! Entity materialization markers.
//!
//! The composer does not build entities or keep an identity map. It only
//! marks where a projected row is an entity, so the layer that reads results
//! knows its type, key, shadow values and how to track it.

use serde::{Deserialize, Serialize};

use crate::expr::Expr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    #[default]
    Tracked,
    NoTracking,
    /// Not tracked for changes, but one instance per key within a result.
    IdentityResolution,
}

/// How rows of a source map onto an entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub type_name: String,
    pub key: Vec<String>,
    /// Columns read for the entity but not part of its visible shape.
    #[serde(default)]
    pub shadow_columns: Vec<String>,
    #[serde(default)]
    pub tracking: TrackingMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMaterialization {
    pub entity_type: String,
    pub key: Expr,
    pub shadow_properties: Vec<(String, Expr)>,
    pub tracking: TrackingMode,
    /// The visible shape of the entity.
    pub expr: Expr,
}

impl EntityMaterialization {
    pub fn into_expr(self) -> Expr {
        Expr::Materialize(Box::new(self))
    }
}

/// All materialization markers in `expr`, outermost first.
pub fn collect_materializations(expr: &Expr) -> Vec<&EntityMaterialization> {
    let mut found = Vec::new();
    collect_into(expr, &mut found);
    found
}

fn collect_into<'a>(expr: &'a Expr, found: &mut Vec<&'a EntityMaterialization>) {
    if let Expr::Materialize(materialize) = expr {
        found.push(materialize.as_ref());
    }
    for child in expr.children() {
        collect_into(child, found);
    }
}

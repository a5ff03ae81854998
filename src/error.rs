//! Error types for query composition and rendering.
//!
//! Unsupported operator shapes are not errors: they degrade to in-memory
//! evaluation. The variants here are either contract violations inside the
//! composer or failures in the surrounding plumbing (rendering, config).

use thiserror::Error;

use crate::expr::SequenceOperator;

#[derive(Debug, Error)]
pub enum ComposeError {
    /// No in-memory method matches the shape of a call being evaluated on the client.
    #[error("no in-memory equivalent for {operator:?} with argument shape [{shape}]")]
    UnresolvedFallback {
        operator: SequenceOperator,
        shape: String,
    },

    /// More than one in-memory method matches; the method tables are inconsistent.
    #[error("ambiguous in-memory equivalent for {operator:?} with argument shape [{shape}]: {candidates} candidates")]
    AmbiguousFallback {
        operator: SequenceOperator,
        shape: String,
        candidates: usize,
    },

    /// A post-expansion rewrite stage reported a failure.
    #[error("rewrite stage {stage} failed: {message}")]
    Stage { stage: String, message: String },

    /// The composed tree holds a node the SQL renderer cannot express.
    #[error("cannot render {0} as SQL")]
    Unrenderable(String),

    /// The composed query has no server-side part at all.
    #[error("query has no relational part to render")]
    NoRelationalQuery,

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ComposeError> = std::result::Result<T, E>;

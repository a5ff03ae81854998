pub mod compose;
pub mod config;
pub mod dialect;
pub mod error;
pub mod expr;
pub mod ir;
pub mod provider;
pub mod render;
pub mod translate;

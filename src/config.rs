use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::dialect::{DialectFormatter, PostgresDialect, SqlServerDialect};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    #[default]
    Postgres,
    SqlServer,
}

impl DialectKind {
    pub fn formatter(self) -> Box<dyn DialectFormatter> {
        match self {
            DialectKind::Postgres => Box::new(PostgresDialect),
            DialectKind::SqlServer => Box::new(SqlServerDialect),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub dialect: DialectKind,
    /// Overrides whether nested sequences may be projected as one value;
    /// unset means whatever the dialect supports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complex_type_subqueries: Option<bool>,
    pub split_predicates: bool,
    pub default_alias: String,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::default(),
            complex_type_subqueries: None,
            split_predicates: true,
            default_alias: "t".to_string(),
        }
    }
}

impl ComposerConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("relcompose")
            .join("config.toml")
    }

    /// Load from the default location; a missing file means defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ComposeError;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = ComposerConfig::from_toml("").unwrap();
        assert_eq!(config, ComposerConfig::default());
        assert!(config.split_predicates);
        assert_eq!(config.default_alias, "t");
    }

    #[test]
    fn test_partial_config() {
        let config = ComposerConfig::from_toml(
            r#"
dialect = "sql_server"
split_predicates = false
"#,
        )
        .unwrap();
        assert_eq!(config.dialect, DialectKind::SqlServer);
        assert!(!config.split_predicates);
        assert_eq!(config.complex_type_subqueries, None);
        assert_eq!(config.dialect.formatter().name(), "sql_server");
    }

    #[test]
    fn test_unknown_dialect_is_rejected() {
        let err = ComposerConfig::from_toml("dialect = \"oracle\"").unwrap_err();
        assert!(matches!(err, ComposeError::Config(_)));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("relcompose-missing-config-test.toml");
        let config = ComposerConfig::load_from(&path).unwrap();
        assert_eq!(config.dialect, DialectKind::Postgres);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = ComposerConfig {
            dialect: DialectKind::SqlServer,
            complex_type_subqueries: Some(false),
            split_predicates: false,
            default_alias: "q".to_string(),
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(ComposerConfig::from_toml(&text).unwrap(), config);
    }
}

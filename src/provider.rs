//! Composition providers and plugins.
//!
//! A provider bundles what composition needs to know about the target
//! database: which expressions it can evaluate and which rewrite stages run
//! after every lambda expansion. Plugins extend a provider with extra
//! stages without touching the composer.

use anyhow::Result;
use tracing::debug;

use crate::compose::{ComposedQuery, Composer, GroupingAggregationRewriter, RewriteStage};
use crate::config::ComposerConfig;
use crate::dialect::DialectFormatter;
use crate::expr::Expr;
use crate::translate::{DefaultTranslatabilityAnalyzer, TranslatabilityAnalyzer};

/// Trait that all composer plugins must implement.
///
/// # Example
///
/// ```ignore
/// struct AuditPlugin;
///
/// impl ComposerPlugin for AuditPlugin {
///     fn name(&self) -> &str { "audit" }
///     fn version(&self) -> &str { "0.1.0" }
///     fn register(&self, provider: &mut ComposerProvider) -> Result<()> {
///         provider.add_rewrite_stage(Box::new(MaskSecrets));
///         Ok(())
///     }
/// }
/// ```
pub trait ComposerPlugin: Send + Sync {
    /// Unique plugin identifier.
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Register plugin capabilities with the provider.
    fn register(&self, provider: &mut ComposerProvider) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

/// One step of the post-expansion pipeline.
pub enum PostExpansionStage {
    /// Compose operator calls found in the expanded body.
    Compose,
    Rewrite(Box<dyn RewriteStage>),
}

impl PostExpansionStage {
    pub fn name(&self) -> &str {
        match self {
            PostExpansionStage::Compose => "compose",
            PostExpansionStage::Rewrite(stage) => stage.name(),
        }
    }
}

pub struct ComposerProvider {
    analyzer: Box<dyn TranslatabilityAnalyzer>,
    stages: Vec<PostExpansionStage>,
    split_predicates: bool,
    default_alias: String,
    loaded_plugins: Vec<PluginInfo>,
}

impl Default for ComposerProvider {
    fn default() -> Self {
        Self::new(Box::new(DefaultTranslatabilityAnalyzer::default()))
    }
}

impl ComposerProvider {
    /// A provider with the standard pipeline: composition, then grouping
    /// aggregation.
    pub fn new(analyzer: Box<dyn TranslatabilityAnalyzer>) -> Self {
        Self {
            analyzer,
            stages: vec![
                PostExpansionStage::Compose,
                PostExpansionStage::Rewrite(Box::new(GroupingAggregationRewriter)),
            ],
            split_predicates: true,
            default_alias: "t".to_string(),
            loaded_plugins: Vec::new(),
        }
    }

    /// A provider whose analyzer matches what `dialect` can render.
    pub fn for_dialect(dialect: &dyn DialectFormatter) -> Self {
        Self::new(Box::new(DefaultTranslatabilityAnalyzer::new(
            dialect.supports_complex_type_subqueries(),
        )))
    }

    pub fn from_config(config: &ComposerConfig) -> Self {
        let dialect = config.dialect.formatter();
        let complex = config
            .complex_type_subqueries
            .unwrap_or_else(|| dialect.supports_complex_type_subqueries());
        let mut provider = Self::new(Box::new(DefaultTranslatabilityAnalyzer::new(complex)));
        provider.split_predicates = config.split_predicates;
        provider.default_alias = config.default_alias.clone();
        provider
    }

    pub fn with_split_predicates(mut self, split: bool) -> Self {
        self.split_predicates = split;
        self
    }

    pub fn analyzer(&self) -> &dyn TranslatabilityAnalyzer {
        self.analyzer.as_ref()
    }

    pub fn stages(&self) -> &[PostExpansionStage] {
        &self.stages
    }

    pub fn split_predicates(&self) -> bool {
        self.split_predicates
    }

    pub fn default_alias(&self) -> &str {
        &self.default_alias
    }

    /// Append a stage; it runs after the built-in ones.
    pub fn add_rewrite_stage(&mut self, stage: Box<dyn RewriteStage>) {
        self.stages.push(PostExpansionStage::Rewrite(stage));
    }

    /// Load and initialize a plugin.
    pub fn load_plugin(&mut self, plugin: Box<dyn ComposerPlugin>) -> Result<()> {
        let info = PluginInfo {
            name: plugin.name().to_string(),
            version: plugin.version().to_string(),
            description: plugin.description().to_string(),
        };

        plugin.register(self)?;
        debug!(plugin = %info.name, version = %info.version, "loaded plugin");
        self.loaded_plugins.push(info);
        Ok(())
    }

    pub fn loaded_plugins(&self) -> &[PluginInfo] {
        &self.loaded_plugins
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Compose one operator chain.
    pub fn compose(&self, expr: Expr) -> crate::error::Result<ComposedQuery> {
        Composer::new(self).compose(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqlServerDialect};
    use crate::translate::Translatability;

    struct UppercaseColumns;

    impl RewriteStage for UppercaseColumns {
        fn name(&self) -> &str {
            "uppercase_columns"
        }

        fn rewrite(&self, expr: Expr, _: &dyn TranslatabilityAnalyzer) -> Result<Expr> {
            Ok(match expr {
                Expr::Column { table, name } => Expr::Column {
                    table,
                    name: name.to_uppercase(),
                },
                other => other,
            })
        }
    }

    struct TestPlugin;

    impl ComposerPlugin for TestPlugin {
        fn name(&self) -> &str {
            "test-plugin"
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn description(&self) -> &str {
            "A test plugin"
        }

        fn register(&self, provider: &mut ComposerProvider) -> Result<()> {
            provider.add_rewrite_stage(Box::new(UppercaseColumns));
            Ok(())
        }
    }

    struct FailingPlugin;

    impl ComposerPlugin for FailingPlugin {
        fn name(&self) -> &str {
            "failing"
        }

        fn version(&self) -> &str {
            "0.0.1"
        }

        fn register(&self, _: &mut ComposerProvider) -> Result<()> {
            anyhow::bail!("refusing to register")
        }
    }

    #[test]
    fn test_default_pipeline() {
        let provider = ComposerProvider::default();
        assert_eq!(
            provider.stage_names(),
            vec!["compose", "grouping_aggregation"]
        );
        assert!(provider.split_predicates());
        assert_eq!(provider.default_alias(), "t");
    }

    #[test]
    fn test_plugin_adds_stage() {
        let mut provider = ComposerProvider::default();
        provider.load_plugin(Box::new(TestPlugin)).unwrap();
        assert_eq!(provider.loaded_plugins().len(), 1);
        assert_eq!(provider.loaded_plugins()[0].name, "test-plugin");
        assert_eq!(provider.stage_names().last(), Some(&"uppercase_columns"));
    }

    #[test]
    fn test_failing_plugin_is_not_recorded() {
        let mut provider = ComposerProvider::default();
        assert!(provider.load_plugin(Box::new(FailingPlugin)).is_err());
        assert!(provider.loaded_plugins().is_empty());
        assert_eq!(provider.stage_names().len(), 2);
    }

    #[test]
    fn test_dialect_capability_reaches_analyzer() {
        let nested = crate::ir::EnumerableQuery::new(crate::ir::Select::new(
            crate::ir::Projection::Server(crate::expr::column("o", "Id")),
            None,
        ))
        .into_expr();
        for provider in [
            ComposerProvider::for_dialect(&PostgresDialect),
            ComposerProvider::for_dialect(&SqlServerDialect),
        ] {
            assert_eq!(
                provider.analyzer().classify(&nested),
                Translatability::Translatable
            );
        }
        let mut config = ComposerConfig::default();
        config.complex_type_subqueries = Some(false);
        let provider = ComposerProvider::from_config(&config);
        assert_eq!(
            provider.analyzer().classify(&nested),
            Translatability::NotTranslatable
        );
    }
}

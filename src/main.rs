use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relcompose::config::{ComposerConfig, DialectKind};
use relcompose::expr::Expr;
use relcompose::provider::ComposerProvider;
use relcompose::render::SqlRenderer;
use tracing::Level;

/// Compose a serialized operator chain into SQL
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// JSON file holding the operator chain
    input: PathBuf,

    /// SQL dialect to render; overrides the config file
    #[arg(long, value_enum)]
    dialect: Option<DialectKind>,

    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the composed expression tree as JSON instead of SQL
    #[arg(long)]
    ir: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let mut config = match &cli.config {
        Some(path) => ComposerConfig::load_from(path),
        None => ComposerConfig::load(),
    }
    .context("failed to load config")?;
    if let Some(dialect) = cli.dialect {
        config.dialect = dialect;
    }

    let input = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    let expr: Expr = serde_json::from_str(&input)
        .with_context(|| format!("{} is not a valid operator chain", cli.input.display()))?;

    let provider = ComposerProvider::from_config(&config);
    let composed = provider.compose(expr)?;

    if cli.ir {
        println!("{}", serde_json::to_string_pretty(&composed)?);
        return Ok(());
    }

    let formatter = config.dialect.formatter();
    let rendered = SqlRenderer::new(formatter.as_ref()).render(&composed)?;
    println!("{}", rendered.sql);

    if !rendered.parameters.is_empty() {
        println!();
        println!("-- parameters: {}", rendered.parameters.join(", "));
    }

    let in_memory = composed.in_memory_operators();
    if !in_memory.is_empty() {
        let names: Vec<&str> = in_memory.iter().map(|op| op.name()).collect();
        println!("-- in memory: {}", names.join(" -> "));
    }

    Ok(())
}

//! kgfed CLI: federated queries over typed biomedical knowledge graphs
//!
//! Commands: parse, plan, query

mod config;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use kgfed_query::{
    format_result, BackendRegistry, Engine, GraphBuilder, OutputFormat, VariableContext,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use config::Config;

#[derive(Parser)]
#[command(name = "kgfed")]
#[command(version)]
#[command(about = "Federated query engine for typed biomedical knowledge graphs")]
struct Cli {
    /// Log filter (overrides the config file and RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Parse a program and print its AST as JSON
    Parse {
        /// Program file, or `-` for stdin
        file: PathBuf,
    },
    /// Plan every SELECT of a program against a schema
    Plan {
        /// Program file, or `-` for stdin
        file: PathBuf,
        /// YAML schema graph
        #[arg(long)]
        schema: PathBuf,
    },
    /// Execute a program against the configured backends
    #[command(alias = "q")]
    Query {
        /// Program file, or `-` for stdin
        file: PathBuf,
        /// TOML configuration
        #[arg(long)]
        config: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Table,
    Markdown,
    Dot,
    Mermaid,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { file } => {
            init_tracing(cli.log_level.as_deref());
            let program = kgfed_parser::parse(&read_program(&file)?)?;
            println!("{}", serde_json::to_string_pretty(&program)?);
        }
        Commands::Plan { file, schema } => {
            init_tracing(cli.log_level.as_deref());
            let schema = config::load_schema(&schema)?;
            let engine = Engine::new(Arc::new(schema), BackendRegistry::new());
            let plans = engine.plan(&read_program(&file)?)?;
            println!("{}", serde_json::to_string_pretty(&plans)?);
        }
        Commands::Query {
            file,
            config,
            format,
        } => {
            let config = Config::load(&config)?;
            init_tracing(cli.log_level.as_deref().or(config.log_level.as_deref()));
            let engine = config.build_engine()?;
            let text = read_program(&file)?;

            let mut ctx = VariableContext::new();
            let result = engine.execute(&text, &mut ctx).await?;
            info!(
                answers = result.knowledge_map.len(),
                variables = ctx.len(),
                "query complete"
            );

            let output = match format {
                Format::Json => format_result(&result, OutputFormat::Json),
                Format::Table => format_result(&result, OutputFormat::Table),
                Format::Markdown => format_result(&result, OutputFormat::Markdown),
                Format::Dot => GraphBuilder::format_dot(&GraphBuilder::from_result(&result)),
                Format::Mermaid => {
                    GraphBuilder::format_mermaid(&GraphBuilder::from_result(&result))
                }
            };
            println!("{}", output.trim_end());
        }
    }
    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(level: Option<&str>) {
    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .init();
}

fn read_program(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read program from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

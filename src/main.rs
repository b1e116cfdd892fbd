//! wikibridge CLI: graph-table ↔ knowledge-base reconciliation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;

use wikibridge::config::{BridgeConfig, FileConfig};
use wikibridge::error::ConfigError;
use wikibridge::kb::HttpKb;
use wikibridge::pipeline::{self, ImportOptions};
use wikibridge::tables;

#[derive(Parser)]
#[command(name = "wikibridge", version, about = "Reconcile graph CSV dumps with a Wikibase store")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "wikibridge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a node/edge CSV pair into the store.
    Import {
        /// Node table path. Falls back to the config file's `node_path`.
        #[arg(long)]
        nodes: Option<PathBuf>,

        /// Edge table path. Falls back to the config file's `edge_path`.
        #[arg(long)]
        edges: Option<PathBuf>,

        /// Resolve and aggregate everything without writing to the store.
        #[arg(long)]
        simulate: bool,

        /// Overwrite items whose CURIE already exists instead of skipping.
        #[arg(long)]
        force: bool,
    },

    /// Export the store into a node/edge CSV pair.
    Export {
        /// Output node table path. Falls back to the config file's `node_path`.
        #[arg(long)]
        nodes: Option<PathBuf>,

        /// Output edge table path. Falls back to the config file's `edge_path`.
        #[arg(long)]
        edges: Option<PathBuf>,
    },
}

/// Command-line path if given, otherwise the config file's.
fn table_path(
    cli: Option<PathBuf>,
    file: Option<PathBuf>,
    field: &'static str,
) -> Result<PathBuf, ConfigError> {
    cli.or(file).ok_or(ConfigError::Missing { field })
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = BridgeConfig::resolve(FileConfig::load(&cli.config)?)?;
    let kb = HttpKb::new(
        &config.api_url,
        &config.sparql_url,
        &config.user,
        &config.password,
    );

    match cli.command {
        Commands::Import {
            nodes,
            edges,
            simulate,
            force,
        } => {
            let nodes = table_path(nodes, config.node_path.take(), "node_path")?;
            let edges = table_path(edges, config.edge_path.take(), "edge_path")?;
            let node_rows = tables::read_nodes(&nodes)?;
            let edge_rows = tables::read_edges(&edges)?;
            let options = ImportOptions {
                simulate: simulate || config.simulate,
                force,
                truncate_descriptions: config.truncate_descriptions,
                retry: config.retry,
                type_property_uri: config.type_property_uri,
            };
            let report = pipeline::run_import(&kb, node_rows, edge_rows, &options)?;
            println!(
                "import: {} properties created, {} items created, {} existing, {} updated",
                report.properties_created,
                report.items_created,
                report.items_existing,
                report.items_updated,
            );
            println!(
                "statements: {} written across {} subjects ({} reference groups, {} triples dropped, {} subjects unresolved, {} writes failed)",
                report.statements_written,
                report.subjects_written,
                report.reference_groups,
                report.dropped_triples,
                report.unresolved_subjects,
                report.failed_subjects,
            );
        }

        Commands::Export { nodes, edges } => {
            let nodes = table_path(nodes, config.node_path.take(), "node_path")?;
            let edges = table_path(edges, config.edge_path.take(), "edge_path")?;
            let (node_rows, edge_rows) = pipeline::run_export(&kb, &config.type_property_uri)?;
            tables::write_nodes(&nodes, &node_rows)?;
            tables::write_edges(&edges, &edge_rows)?;
            println!(
                "export: {} nodes and {} edges written",
                node_rows.len(),
                edge_rows.len()
            );
        }
    }

    Ok(())
}

//! Quarry CLI - translate host queries into a normalized SQL AST
//!
//! Usage:
//!   quarry translate --metadata <metadata.toml> --query <query.json> [--config <quarry.toml>]
//!   quarry entities --metadata <metadata.toml>
//!
//! Examples:
//!   quarry translate --metadata demos/shop.toml --query demos/active_customers.json
//!   RUST_LOG=quarry=debug quarry translate -m demos/shop.toml -q query.json --output compact

use clap::{Parser, Subcommand, ValueEnum};
use quarry::config::Settings;
use quarry::metadata::InMemoryMetadata;
use quarry::translation::{translate, QueryExpr};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Quarry - translate host query trees into a normalized SQL AST")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a JSON host query and print the resulting AST
    Translate {
        /// Entity metadata (TOML)
        #[arg(short, long)]
        metadata: PathBuf,

        /// Host query (JSON)
        #[arg(short, long)]
        query: PathBuf,

        /// Settings file; defaults to the usual search locations
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },

    /// List the entities of a metadata file
    Entities {
        /// Entity metadata (TOML)
        #[arg(short, long)]
        metadata: PathBuf,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Indented JSON
    Pretty,
    /// Single-line JSON
    Compact,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Translate {
            metadata,
            query,
            config,
            output,
        } => cmd_translate(metadata, query, config, output),
        Commands::Entities { metadata } => cmd_entities(metadata),
    }
}

fn load_metadata(path: &PathBuf) -> Option<InMemoryMetadata> {
    match InMemoryMetadata::from_file(path) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            eprintln!("Error loading metadata '{}': {}", path.display(), e);
            None
        }
    }
}

fn cmd_translate(
    metadata: PathBuf,
    query: PathBuf,
    config: Option<PathBuf>,
    output: OutputFormat,
) -> ExitCode {
    let settings = match &config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(metadata) = load_metadata(&metadata) else {
        return ExitCode::FAILURE;
    };

    let source = match fs::read_to_string(&query) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", query.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let host: QueryExpr = match serde_json::from_str(&source) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("Invalid query '{}': {}", query.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let statement = match translate(&host, &metadata, &settings) {
        Ok(statement) => statement,
        Err(e) => {
            eprintln!("Translation error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let json = match output {
        OutputFormat::Pretty => serde_json::to_string_pretty(&statement),
        OutputFormat::Compact => serde_json::to_string(&statement),
    };
    match json {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Serialization error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_entities(metadata: PathBuf) -> ExitCode {
    let Some(metadata) = load_metadata(&metadata) else {
        return ExitCode::FAILURE;
    };

    for entity in metadata.entities() {
        let table = match &entity.schema {
            Some(schema) => format!("{}.{}", schema, entity.table),
            None => entity.table.clone(),
        };
        println!("{} -> {} ({} columns)", entity.name, table, entity.columns.len());
        for navigation in &entity.navigations {
            println!(
                "  {} -> {} ({:?})",
                navigation.member, navigation.target, navigation.kind
            );
        }
    }
    ExitCode::SUCCESS
}

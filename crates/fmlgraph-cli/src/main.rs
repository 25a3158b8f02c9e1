//! fmlgraph CLI
//!
//! Developer tool for converting StructureMaps to and from mapping graphs.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// fmlgraph - FHIR mapping language rule trees as graphs
#[derive(Parser)]
#[command(name = "fmlgraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project directory or configuration file path
    #[arg(short, long, default_value = "fmlgraph.yaml", env = "FMLGRAPH_CONFIG")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new mapping project
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Project name (defaults to directory name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Convert a StructureMap into a graph
    Parse {
        /// StructureMap JSON file
        input: String,

        /// Write the graph here instead of stdout
        #[arg(short, long)]
        output: Option<String>,

        /// Rebuild from the rule tree even when an embedded graph is current
        #[arg(long)]
        ignore_snapshot: bool,
    },

    /// Convert a graph into a StructureMap
    Compose {
        /// Graph JSON file (any payload version)
        input: String,

        /// Write the StructureMap here instead of stdout
        #[arg(short, long)]
        output: Option<String>,

        /// Map name (defaults to the input file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Parse and recompose every map in the project
    Check {
        /// Directory of maps (defaults to the project's maps_dir)
        #[arg(short, long)]
        dir: Option<String>,

        /// Treat diagnostics as failures
        #[arg(long)]
        strict: bool,
    },

    /// Show the graph structure of a StructureMap
    Inspect {
        /// StructureMap JSON file
        input: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init { path, name } => {
            commands::init::run(&path, name.as_deref()).await?;
        }
        Commands::Parse {
            input,
            output,
            ignore_snapshot,
        } => {
            commands::parse::run(&cli.config, &input, output.as_deref(), ignore_snapshot).await?;
        }
        Commands::Compose {
            input,
            output,
            name,
        } => {
            commands::compose::run(&cli.config, &input, output.as_deref(), name.as_deref())
                .await?;
        }
        Commands::Check { dir, strict } => {
            commands::check::run(&cli.config, dir.as_deref(), strict).await?;
        }
        Commands::Inspect { input } => {
            commands::inspect::run(&cli.config, &input).await?;
        }
    }

    Ok(())
}

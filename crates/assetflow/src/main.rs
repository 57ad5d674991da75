//! assetflow CLI - front-end asset build pipeline.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

use config::Project;

#[derive(Parser)]
#[command(name = "assetflow")]
#[command(about = "Build templates, styles and images into a static site")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Project root containing src/ and dist/
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// Path to config file (defaults to <root>/assetflow.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Development build of every task (the default)
    Default,

    /// Clean, then build every task minified without source maps
    Release,

    /// Build, serve dist/ and rebuild on change with live reload
    Watch {
        /// Port to listen on (defaults to config or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// Run a single task
    Run {
        /// Task name (html, templates, styles, images, scripts)
        task: String,

        /// Use the release chain
        #[arg(long)]
        release: bool,
    },

    /// Empty dist/
    Clean,

    /// Serve dist/ with live reload, without building or watching
    Serve {
        /// Port to listen on (defaults to config or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// Scaffold assetflow.toml and a sample src/ tree
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    fmt().with_env_filter(filter).with_target(false).init();

    if let Some(Commands::Init { yes }) = cli.command {
        return commands::init::run(&cli.root, yes).await;
    }

    let project = Project::load(&cli.root, cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Default) {
        Commands::Default => commands::build::workflow(&project, "default").await?,
        Commands::Release => commands::build::workflow(&project, "release").await?,
        Commands::Watch { port, no_open } => commands::watch::run(&project, port, !no_open).await?,
        Commands::Run { task, release } => commands::build::task(&project, &task, release).await?,
        Commands::Clean => commands::build::clean(&project).await?,
        Commands::Serve { port, no_open } => commands::serve::run(&project, port, !no_open).await?,
        Commands::Init { .. } => {}
    }

    Ok(())
}

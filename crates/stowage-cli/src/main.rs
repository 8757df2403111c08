mod commands;

use clap::{Parser, Subcommand};
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE};
use std::path::PathBuf;
use std::process::ExitCode;
use stowage_core::install_signal_handler;

#[derive(Debug, Parser)]
#[command(
    name = "stowage",
    version,
    about = "Packages the external node modules of bundled artifacts"
)]
struct Cli {
    /// Project directory containing package.json.
    #[arg(long, default_value = ".", global = true)]
    project_dir: PathBuf,

    /// Path to stowage.toml (defaults to <project-dir>/stowage.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve, install and stage the external modules of every artifact.
    Package {
        /// JSON list of artifacts with their output paths and external modules.
        #[arg(long)]
        artifacts: PathBuf,
        /// Treat the bundle as skipped and do nothing.
        #[arg(long, default_value_t = false)]
        skip_compile: bool,
    },
    /// Print each artifact's resolved dependencies without writing anything.
    Resolve {
        /// JSON list of artifacts with their output paths and external modules.
        #[arg(long)]
        artifacts: PathBuf,
    },
    /// Print the production dependency graph reported by the packager.
    Graph {
        /// Listing depth (defaults to include_modules.dependency_depth).
        #[arg(long)]
        depth: Option<usize>,
    },
    /// Check that the configured packager is usable.
    Doctor,
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("STOWAGE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    let project_dir = cli.project_dir.as_path();
    let config = cli.config.as_deref();
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Package {
            artifacts,
            skip_compile,
        } => commands::package::run(project_dir, config, &artifacts, skip_compile, json_output),
        Commands::Resolve { artifacts } => {
            commands::resolve::run(project_dir, config, &artifacts, json_output)
        }
        Commands::Graph { depth } => commands::graph::run(project_dir, config, depth),
        Commands::Doctor => commands::doctor::run(project_dir, config, json_output),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("config error:")
                || msg.starts_with("manifest error:")
                || msg.starts_with("artifact list error:")
                || msg.starts_with("packager error: unknown packager")
            {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

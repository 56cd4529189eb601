#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hermod::Hermod;

/// Environment variable naming the configuration file
const CONFIG_ENV: &str = "HERMOD_CONFIG";

/// Mail delivery queue daemon
#[derive(Parser, Debug)]
#[command(name = "hermod")]
#[command(about = "Queue and deliver mail", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Default)]
enum Command {
    /// Recover the spool and deliver until interrupted
    #[default]
    Serve,
    /// Show every message in the spool and the state of its recipients
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let hermod = Hermod::from_path(&find_config_file(cli.config)?)?;

    match cli.command.unwrap_or_default() {
        Command::Serve => hermod.run().await,
        Command::List => {
            print!("{}", hermod.list().await?);
            Ok(())
        }
    }
}

/// Find the configuration file using the following precedence:
/// 1. `--config`
/// 2. `HERMOD_CONFIG` environment variable
/// 3. ./hermod.config.ron (current working directory)
/// 4. /etc/hermod/hermod.config.ron (system-wide config)
fn find_config_file(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let (origin, path) = match explicit {
        Some(path) => ("--config", Some(path)),
        None => (CONFIG_ENV, std::env::var_os(CONFIG_ENV).map(PathBuf::from)),
    };

    if let Some(path) = path {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("{origin} points to non-existent file: {}", path.display());
    }

    let default_paths = [
        PathBuf::from("./hermod.config.ron"),
        PathBuf::from("/etc/hermod/hermod.config.ron"),
    ];

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

//! Roxyfs
//!
//! Command-line front end for the virtual-path file manager.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use filemanager::{
    BrowserError, Config, DownloadablePayload, FileManager, LocalFileSystem, OperationResult,
    SecurityError, StagedFile, TransferError,
};

/// Roxyfs - sandboxed file manager over a virtual path namespace.
#[derive(Parser, Debug)]
#[command(name = "roxyfs")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Real root directory (overrides the configuration)
    #[arg(short, long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print every directory of the tree with its child counts
    Tree,

    /// Create directory NAME inside PATH
    Mkdir { path: String, name: String },

    /// Delete a directory and everything in it
    Rmdir { path: String },

    /// Move a directory to a new path
    Mvdir { origin: String, destination: String },

    /// Copy a directory (not supported, always fails)
    Cpdir { origin: String, destination: String },

    /// Rename a directory in place
    Renamedir { path: String, name: String },

    /// List the files directly inside a directory
    Ls {
        directory: String,

        /// Only list files of this type ("image")
        #[arg(long = "type", value_name = "TYPE")]
        type_filter: Option<String>,
    },

    /// Copy local files into a directory of the tree
    Upload {
        directory: String,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Download a file
    Download {
        path: String,

        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Download a directory as a zip archive
    DownloadDir {
        directory: String,

        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Delete a file
    Rm { path: String },

    /// Move a file to a new path
    Mv { origin: String, destination: String },

    /// Copy a file into a directory
    Cp { origin: String, destination: String },

    /// Rename a file in place
    Rename { path: String, name: String },

    /// Render a thumbnail of an image
    Thumbnail {
        path: String,

        /// Maximum width (defaults to the configured thumbnail width)
        #[arg(long)]
        width: Option<u32>,

        /// Maximum height (defaults to the configured thumbnail height)
        #[arg(long)]
        height: Option<u32>,

        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) if is_security_error(&e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(config_path) => Config::load(config_path)?,
        None => Config::load_default()?,
    };

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(&config.general.log_level)))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    config.apply_env_overrides();

    if let Some(root) = &cli.root {
        config.filesystem.root_path = root.clone();
    }

    if let Some(config_path) = &cli.config {
        tracing::info!("Using config file: {:?}", config_path);
    }

    if let Commands::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(ExitCode::SUCCESS);
    }

    let manager = LocalFileSystem::from_config(&config)?;

    match cli.command {
        Commands::Tree => print_json(&manager.list_tree()?),
        Commands::Mkdir { path, name } => report(manager.create_directory(&path, &name)?),
        Commands::Rmdir { path } => report(manager.delete_directory(&path)?),
        Commands::Mvdir {
            origin,
            destination,
        } => report(manager.move_directory(&origin, &destination)?),
        Commands::Cpdir {
            origin,
            destination,
        } => report(manager.copy_directory(&origin, &destination)?),
        Commands::Renamedir { path, name } => report(manager.rename_directory(&path, &name)?),
        Commands::Ls {
            directory,
            type_filter,
        } => print_json(&manager.list_files(&directory, type_filter.as_deref())?),
        Commands::Upload { directory, files } => upload(&manager, &directory, &files),
        Commands::Download { path, output } => {
            save_payload(manager.download(&path)?, output.as_deref())
        }
        Commands::DownloadDir { directory, output } => {
            save_payload(manager.download_directory(&directory)?, output.as_deref())
        }
        Commands::Rm { path } => report(manager.delete_file(&path)?),
        Commands::Mv { origin, destination } => report(manager.move_file(&origin, &destination)?),
        Commands::Cp { origin, destination } => report(manager.copy_file(&origin, &destination)?),
        Commands::Rename { path, name } => report(manager.rename_file(&path, &name)?),
        Commands::Thumbnail {
            path,
            width,
            height,
            output,
        } => {
            let width = width.unwrap_or(config.thumbnail.width);
            let height = height.unwrap_or(config.thumbnail.height);
            save_payload(manager.thumbnail(&path, width, height)?, output.as_deref())
        }
        Commands::Config => Ok(ExitCode::SUCCESS),
    }
}

/// Level for the log filter, before env overrides are applied to the config.
fn log_level(configured: &str) -> String {
    match std::env::var("ROXYFS_LOG_LEVEL") {
        Ok(level) if !level.is_empty() => level,
        _ => configured.to_string(),
    }
}

/// Stage copies of the local files so the originals stay where they are.
fn upload(manager: &LocalFileSystem, directory: &str, files: &[PathBuf]) -> Result<ExitCode> {
    let staging = tempfile::tempdir().context("Failed to create staging directory")?;

    let mut staged = Vec::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let staged_path = staging.path().join(format!("upload-{index}"));
        let entry = match fs::copy(file, &staged_path) {
            Ok(_) => StagedFile::new(staged_path, name),
            Err(e) => {
                tracing::warn!(path = ?file, error = %e, "Failed to read local file");
                StagedFile::new(staged_path, name.clone())
                    .rejected(format!("The file \"{name}\" could not be read"))
            }
        };
        staged.push(entry);
    }

    report(manager.upload(directory, &mut staged)?)
}

fn save_payload(payload: DownloadablePayload, output: Option<&Path>) -> Result<ExitCode> {
    tracing::info!(
        filename = payload.filename(),
        content_type = payload.content_type(),
        "Streaming payload"
    );

    let mut stream = payload.open()?;
    match output {
        Some(path) => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            io::copy(&mut stream, &mut file)?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            io::copy(&mut stream, &mut stdout)?;
            stdout.flush()?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn report(result: OperationResult) -> Result<ExitCode> {
    print_json(&result)?;
    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(ExitCode::SUCCESS)
}

fn is_security_error(error: &anyhow::Error) -> bool {
    error.downcast_ref::<SecurityError>().is_some()
        || matches!(error.downcast_ref::<TransferError>(), Some(TransferError::Security(_)))
        || matches!(error.downcast_ref::<BrowserError>(), Some(BrowserError::Security(_)))
}

// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mcap_registry::config::load_config_with_env;
use mcap_registry::coordinator::{Coordinator, UploadOptions};
use mcap_registry::db::BackendFactory;
use mcap_registry::error::RegistryError;
use mcap_registry::secrets::EnvSecrets;

/// Recording registry - catalog MCAP recordings across storage and database
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a local recording to storage (optional: add to database)
    Upload {
        /// Path to the local recording directory
        recording_path_local: PathBuf,
        /// Add the recording to the database after the copy
        #[arg(short, long)]
        add: bool,
        /// Move instead of copy the recording
        #[arg(short, long)]
        r#move: bool,
        /// Replace an existing recording in storage
        #[arg(long)]
        overwrite: bool,
    },
    /// Add a recording to the database or update the existing record
    Add {
        recording_name: String,
        /// Reset the sidecar manual fields instead of reusing them
        #[arg(long)]
        regenerate: bool,
    },
    /// Re-extract and update the record of a synced recording
    Update { recording_name: String },
    /// Delete a recording from storage (optional: remove from database)
    Delete {
        recording_name: String,
        /// Also remove the recording from the database
        #[arg(short, long)]
        remove: bool,
    },
    /// Remove a recording from the database
    Remove { recording_name: String },
    /// Check if a recording exists in storage and database
    Exist { recording_name: String },
    /// Verify storage root and database backend are reachable
    Connection,
    /// Generate the sidecar metadata file for a recording
    Metadata {
        recording_name: String,
        /// Treat the argument as a local path instead of a storage name
        #[arg(short, long)]
        path: bool,
        /// Reset the sidecar manual fields instead of reusing them
        #[arg(long)]
        regenerate: bool,
    },
    /// Reload the database physically sorted by a column
    #[command(name = "database_sort_by")]
    DatabaseSortBy {
        /// Column to sort by; defaults to the configured database_sort_by
        column: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration from file
    let config = load_config_with_env(&args.config)?;

    // Initialize tracing with configured level
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Loaded configuration from: {:?}", args.config);
    info!("Storage root: {}", config.recordings_storage.display());
    info!("Database backend: {}", config.database_type);

    // Create database backend; credentials come from the environment
    let db = BackendFactory::create(&config, &EnvSecrets)?;
    let coordinator = Coordinator::new(config, db);

    if let Err(e) = run(&coordinator, args.command).await {
        eprintln!("{} failure: {}", e.kind(), e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(coordinator: &Coordinator, command: Command) -> std::result::Result<(), RegistryError> {
    // The connection report must work with an unreachable backend, and
    // metadata generation never touches the database.
    if !matches!(command, Command::Connection | Command::Metadata { .. }) {
        coordinator.database().initialize().await?;
    }

    match command {
        Command::Upload {
            recording_path_local,
            add,
            r#move,
            overwrite,
        } => {
            let state = coordinator
                .upload(
                    &recording_path_local,
                    UploadOptions {
                        add_to_database: add,
                        move_source: r#move,
                        overwrite,
                    },
                )
                .await?;
            println!(
                "Uploaded '{}' (state: {})",
                recording_path_local.display(),
                state
            );
        }

        Command::Add {
            recording_name,
            regenerate,
        } => {
            let state = coordinator.add(&recording_name, regenerate).await?;
            println!("Recording '{}' added to database (state: {})", recording_name, state);
        }

        Command::Update { recording_name } => {
            let state = coordinator.update(&recording_name).await?;
            println!("Recording '{}' updated (state: {})", recording_name, state);
        }

        Command::Delete {
            recording_name,
            remove,
        } => {
            let state = coordinator.delete(&recording_name, remove).await?;
            println!("Recording '{}' deleted (state: {})", recording_name, state);
        }

        Command::Remove { recording_name } => {
            let state = coordinator.remove(&recording_name).await?;
            println!(
                "Recording '{}' removed from database (state: {})",
                recording_name, state
            );
        }

        Command::Exist { recording_name } => {
            let state = coordinator.exist(&recording_name).await?;
            println!(
                "Recording exists in storage: {}",
                if matches!(
                    state,
                    mcap_registry::JointState::StorageOnly | mcap_registry::JointState::Synced
                ) {
                    "yes"
                } else {
                    "no"
                }
            );
            println!(
                "Recording exists in database: {}",
                if matches!(
                    state,
                    mcap_registry::JointState::DatabaseOnly | mcap_registry::JointState::Synced
                ) {
                    "yes"
                } else {
                    "no"
                }
            );
            println!("Joint state: {}", state);
        }

        Command::Connection => {
            let status = coordinator.connection().await;
            println!(
                "Storage reachable: {}",
                if status.storage { "yes" } else { "no" }
            );
            println!(
                "Database reachable: {}",
                if status.database { "yes" } else { "no" }
            );

            if !status.storage || !status.database {
                let mut unreachable = Vec::new();
                if !status.storage {
                    unreachable.push("storage");
                }
                if !status.database {
                    unreachable.push("database");
                }
                return Err(RegistryError::connection(
                    &unreachable.join("+"),
                    "target unreachable",
                ));
            }
        }

        Command::Metadata {
            recording_name,
            path,
            regenerate,
        } => {
            let sidecar = coordinator
                .metadata(&recording_name, path, regenerate)
                .await?;
            println!("Metadata written to '{}'", sidecar.display());
        }

        Command::DatabaseSortBy { column } => {
            let count = coordinator.sort_database(column.as_deref()).await?;
            println!("Database reloaded with {} sorted records", count);
        }
    }

    Ok(())
}

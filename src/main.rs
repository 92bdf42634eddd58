//! # labflow CLI
//!
//! ## Usage
//!
//! ```bash
//! labflow --config ./config/labflow.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `labflow init` | Create the SQLite database and run schema migrations |
//! | `labflow ingest ...` | Ingest one uploaded lab report |
//! | `labflow get <id>` | Print a report with all panels and parameters |
//! | `labflow list <patient>` | List a patient's reports, newest first |
//! | `labflow timeline <patient> <parameter>` | History of one parameter |
//! | `labflow delete <id>` | Delete a report |
//! | `labflow patient add <id>` | Register a patient |
//! | `labflow completions <shell>` | Print shell completions |
//!
//! A duplicate upload is not an error: `ingest` prints
//! `duplicate: report already exists` and exits 0.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use labflow::reports::ListOptions;
use labflow::{config, ingest, logging, migrate, patients, reports};
use labflow_core::IngestRequest;
use std::path::PathBuf;

/// labflow: lab report ingestion with content-fingerprint deduplication.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/labflow.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "labflow",
    about = "labflow: lab report ingestion with content-fingerprint deduplication",
    version,
    long_about = "labflow sends uploaded laboratory documents to a document-understanding \
    service, maps the extracted entities into reports, panels and parameters, rejects \
    re-uploads of the same results by content fingerprint, and stores each report \
    atomically in SQLite."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/labflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Ingest one uploaded lab report.
    Ingest {
        /// Patient the report belongs to.
        #[arg(long)]
        patient: String,

        /// Location of the uploaded document, passed to the extractor.
        #[arg(long)]
        uri: String,

        /// MIME type: application/pdf, image/jpeg, or image/png.
        #[arg(long)]
        mime: String,

        /// Identity of the uploading user.
        #[arg(long)]
        uploaded_by: String,

        /// Print the stored report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a report with all panels and parameters.
    Get {
        /// Report id.
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// List a patient's reports, newest report date first.
    List {
        patient: String,

        /// Print full reports instead of summaries.
        #[arg(long)]
        full: bool,

        /// Maximum number of reports (default and cap come from config).
        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        offset: Option<u32>,

        #[arg(long)]
        json: bool,
    },

    /// Show every measurement of one parameter for a patient.
    Timeline {
        patient: String,

        /// Parameter name, matched case-insensitively.
        parameter: String,

        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        offset: Option<u32>,

        #[arg(long)]
        json: bool,
    },

    /// Delete a report with all its panels and parameters.
    Delete {
        /// Report id.
        id: String,
    },

    /// Manage patients.
    Patient {
        #[command(subcommand)]
        action: PatientAction,
    },

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum PatientAction {
    /// Register a patient, or rename an existing one.
    Add {
        id: String,

        /// Display name.
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "labflow", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging.filter);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            patient,
            uri,
            mime,
            uploaded_by,
            json,
        } => {
            let request = IngestRequest {
                patient_id: patient,
                document_uri: uri,
                mime_type: mime,
                uploaded_by,
            };
            ingest::run_ingest(&cfg, request, json).await?;
        }
        Commands::Get { id, json } => {
            reports::run_get(&cfg, &id, json).await?;
        }
        Commands::List {
            patient,
            full,
            limit,
            offset,
            json,
        } => {
            let options = ListOptions {
                limit,
                offset,
                json,
            };
            reports::run_list(&cfg, &patient, full, options).await?;
        }
        Commands::Timeline {
            patient,
            parameter,
            limit,
            offset,
            json,
        } => {
            let options = ListOptions {
                limit,
                offset,
                json,
            };
            reports::run_timeline(&cfg, &patient, &parameter, options).await?;
        }
        Commands::Delete { id } => {
            reports::run_delete(&cfg, &id).await?;
        }
        Commands::Patient { action } => match action {
            PatientAction::Add { id, name } => {
                patients::run_patient_add(&cfg, &id, name.as_deref()).await?;
            }
        },
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

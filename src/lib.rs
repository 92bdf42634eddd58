//! # labflow
//!
//! Lab report ingestion: uploaded laboratory documents are sent to a
//! document-understanding service, the returned entity tree is mapped into
//! a report aggregate, a content fingerprint rejects re-uploads of the same
//! results, and the report is written atomically to SQLite.
//!
//! The domain logic lives in [`labflow_core`]; this crate supplies the
//! native pieces around it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────┐   ┌───────────┐
//! │  Extractor   │──▶│  LabPipeline (core)   │──▶│  SQLite   │
//! │  HTTP / file │   │ map → fingerprint →   │   │  reports  │
//! └──────────────┘   │ dedup → atomic write  │   └─────┬─────┘
//!                    └──────────────────────┘         │
//!                                                      ▼
//!                                               ┌──────────┐
//!                                               │   CLI    │
//!                                               │(labflow) │
//!                                               └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! labflow init
//! labflow patient add patient-1 --name "Ana Silva"
//! labflow ingest --patient patient-1 --uri gs://uploads/laudo.pdf \
//!     --mime application/pdf --uploaded-by user-1
//! labflow list patient-1
//! labflow timeline patient-1 Hemoglobina
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Transactional SQLite report store |
//! | [`extractor`] | HTTP and file extraction backends |
//! | [`ingest`] | `ingest` command and pipeline wiring |
//! | [`reports`] | `get` / `list` / `timeline` / `delete` commands |
//! | [`patients`] | `patient add` command |

pub mod config;
pub mod db;
pub mod extractor;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod patients;
pub mod reports;
pub mod sqlite_store;

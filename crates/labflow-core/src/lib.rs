//! # labflow Core
//!
//! Runtime-agnostic logic for labflow: the lab report aggregate, date/time
//! normalization, extractor entity tree mapping, content fingerprinting,
//! store abstractions, and the ingestion pipeline that composes them.
//!
//! This crate contains no sqlx, HTTP client, or filesystem I/O. The
//! application crate supplies a [`store::ReportStore`] backed by SQLite and
//! a [`extraction::DocumentExtractor`] that talks to the real extraction
//! service.
//!
//! ## Data Flow
//!
//! ```text
//! IngestRequest ──▶ validate ──▶ DocumentExtractor ──▶ mapper ──▶ fingerprint
//!                                                                    │
//!                        Report ◀── ReportStore::create_report ◀── dedup check
//! ```
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | `Report`, `LabResult`, `ResultItem` and read models |
//! | [`error`] | Typed pipeline outcomes (`IngestError`) |
//! | [`datetime`] | Locale-tolerant date and date-time parsing |
//! | [`extraction`] | Extractor entity tree and the `DocumentExtractor` trait |
//! | [`mapper`] | Entity tree → `Report` aggregate |
//! | [`fingerprint`] | Order-independent SHA-256 content signature |
//! | [`store`] | `ReportStore` / `PatientDirectory` traits, in-memory store |
//! | [`pipeline`] | Ingestion orchestrator and read-side operations |

pub mod datetime;
pub mod error;
pub mod extraction;
pub mod fingerprint;
pub mod mapper;
pub mod models;
pub mod pipeline;
pub mod store;

pub use error::IngestError;
pub use models::{LabResult, Report, ResultItem};
pub use pipeline::{IngestRequest, LabPipeline};

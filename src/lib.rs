//! OAI Harvester - Harvest metadata records from OAI-PMH providers.
//!
//! This crate implements an OAI-PMH 2.0 harvesting engine: a protocol
//! client that walks resumption-token chains, a recurring scheduler for
//! incremental harvests, and an on-disk output layer with per-set
//! splitting and zip backup rotation.
//!
//! # Example
//!
//! ```
//! use oai_harvester::config;
//!
//! // Validate a provider URL and a daily run-at time
//! assert!(config::validate_base_url("http://www.dlese.org/oai/provider").is_ok());
//! assert!(config::validate_run_at_time("23:15").is_ok());
//! ```
//!
//! # Architecture
//!
//! The harvester is organized into several modules:
//!
//! - [`config`]: Configuration constants and validation
//! - [`types`]: Core data types (HarvestedRecord, HarvestRun, etc.)
//! - [`error`]: Error types and Result alias
//! - [`datestamp`]: OAI datestamp codec and granularity
//! - [`encoding`]: File-system-safe identifier encoding
//! - [`xml`]: XML utilities
//! - [`protocol`]: OAI-PMH wire model and response parsing
//! - [`http`]: HTTP client for talking to providers
//! - [`client`]: Harvest state machine
//! - [`output`]: On-disk output, splitting and zip rotation
//! - [`notify`]: Change notification hooks
//! - [`schedule`]: Scheduled job definition and recurrence math
//! - [`scheduler`]: Recurring harvest scheduler
//! - [`store`]: YAML persistence for the job list
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod client;
pub mod config;
pub mod datestamp;
pub mod encoding;
pub mod error;
pub mod http;
pub mod notify;
pub mod output;
pub mod protocol;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod xml;

// Re-export the main entry points
pub use client::HarvestClient;
pub use scheduler::HarvestScheduler;

// Re-export commonly used items
pub use error::{HarvesterError, Result};
pub use schedule::{Recurrence, ScheduledHarvest};
pub use types::{HarvestParams, HarvestRun, HarvestedRecord, RecordSink, RunStatus};

//! folio - document ingestion pipeline and hybrid retrieval engine
//!
//! This crate provides:
//! - A processing pipeline that turns uploaded files into embedded,
//!   searchable chunks behind a durable per-job state machine
//! - Per-document hybrid (vector + lexical) chunk retrieval
//! - An in-memory document registry with atomic whole-snapshot refresh
//! - A multi-document retrieval orchestrator with tenant isolation
//! - Admission control for ingest and query work

pub mod admission;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod embed;
pub mod error;
pub mod extract;
pub mod meta;
pub mod notify;
pub mod pipeline;
pub mod query;
pub mod rank;
pub mod registry;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};

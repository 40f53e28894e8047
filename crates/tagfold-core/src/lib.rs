//! tagfold-core library.
//!
//! Consolidates support tickets and their per-rater tag maps from several
//! sources into one corpus snapshot, and projects that snapshot into the
//! flat formats downstream consumers read.
//!
//! # Conventions
//!
//! - **Errors**: typed [`error::CorpusError`] for corpus operations,
//!   `anyhow::Result` for file orchestration helpers.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod collab;
pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod lock;
pub mod normalize;
pub mod rater;
pub mod resolve;
pub mod sample;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod ticket;

pub use error::{CorpusError, ErrorCode};
pub use rater::{Rater, RaterKind, RaterRegistry};
pub use snapshot::CorpusSnapshot;
pub use store::TicketStore;
pub use ticket::{AUTOMATED_RATER_ID, IncomingRecord, TagMap, Ticket};

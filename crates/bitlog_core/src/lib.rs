//! # bitlog core
//!
//! A durable, crash-recoverable key-value engine built as an append-only
//! segmented log.
//!
//! This crate provides:
//! - The record codec and segment files ([`segment`])
//! - The in-memory key index ([`Index`])
//! - A single writer thread that serializes every put and delete
//! - Crash recovery that rebuilds the index from the segments on disk
//! - Online compaction of sealed segments
//! - The [`Engine`] facade tying them together
//!
//! ## Example
//!
//! ```rust,no_run
//! use bitlog_core::Engine;
//! use std::path::Path;
//!
//! let engine = Engine::open(Path::new("data"))?;
//! engine.put(b"greeting", b"hello")?;
//! assert_eq!(engine.get(b"greeting")?, Some(b"hello".to_vec()));
//! engine.delete(b"greeting")?;
//! assert_eq!(engine.get(b"greeting")?, None);
//! engine.close()?;
//! # Ok::<(), bitlog_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod engine;
mod error;
mod index;
mod inspect;
mod recovery;
pub mod segment;
mod stats;
mod types;
mod writer;

pub use config::{Config, DEFAULT_MAX_SEGMENT_SIZE};
pub use dir::{DirListing, EngineDir, SegmentFile, ACTIVE_SUFFIX, SEALED_SUFFIX, STAGING_FILE};
pub use engine::{Engine, SegmentInfo};
pub use error::{CoreError, CoreResult};
pub use index::{Index, IndexEntry};
pub use inspect::{inspect_directory, SegmentReport, SegmentStatus};
pub use recovery::RecoveryReport;
pub use segment::{CompactionResult, Segment, SegmentRecord};
pub use stats::{EngineStats, StatsSnapshot};
pub use types::SegmentId;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! # bitlog Testkit
//!
//! Test utilities for bitlog.
//!
//! This crate provides:
//! - Temporary engine fixtures
//! - Crash helpers that damage segment files the way an unclean shutdown
//!   or a bad disk would
//! - Stress helpers for concurrent writers
//! - Property-based generators and a reference model
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bitlog_testkit::prelude::*;
//!
//! #[test]
//! fn survives_restart() {
//!     let mut fixture = TempEngine::new();
//!     fixture.put(b"k", b"v").unwrap();
//!     fixture.reopen();
//!     assert_eq!(fixture.get(b"k").unwrap(), Some(b"v".to_vec()));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;

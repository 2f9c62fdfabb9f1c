//! # bitlog storage
//!
//! Byte-store backends underneath bitlog segments.
//!
//! A backend is an **opaque, append-only byte store**: it knows nothing about
//! records, keys or segment ids. The engine in `bitlog_core` owns every
//! format decision and addresses data purely by `(backend, offset)`.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - one OS file per segment
//! - [`InMemoryBackend`] - for unit tests and crash simulation
//!
//! ## Example
//!
//! ```rust
//! use bitlog_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;

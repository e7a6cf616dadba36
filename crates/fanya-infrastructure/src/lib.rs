//! Infrastructure adapters for Fanya.
//!
//! Provides the in-process storage/realtime backend and the file-backed
//! configuration service.

pub mod config_service;
pub mod memory_backend;
pub mod paths;

pub use config_service::ConfigService;
pub use memory_backend::InMemoryBackend;
pub use paths::{FanyaPaths, PathError};

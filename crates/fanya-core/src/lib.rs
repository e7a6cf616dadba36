//! Domain layer of the Fanya chat synchronization engine.
//!
//! Holds the data model, the total payload parser, the keyed merge shared by
//! both stores, and the ports (traits) through which the application layer
//! reaches storage, the push feed and the external agent.

pub mod agent;
pub mod config;
pub mod error;
pub mod message;
pub mod realtime;
pub mod reconcile;
pub mod session;
pub mod user;

// Re-export common error type
pub use error::{FanyaError, Result};

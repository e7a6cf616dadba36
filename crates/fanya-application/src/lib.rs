//! Application layer for Fanya.
//!
//! This crate holds the stateful side of the engine: the session and message
//! stores, the realtime subscription bridge, and the [`ChatEngine`] facade
//! that wires them to the storage, push and agent ports defined in
//! `fanya-core`.

pub mod engine;
pub mod events;
pub mod message;
pub mod realtime;
pub mod session;

pub use engine::{ChatEngine, EnginePorts};
pub use events::StoreEvent;
pub use message::{MessageSnapshot, MessageStore, SendOutcome};
pub use realtime::{ChangeSink, RealtimeBridge};
pub use session::{SessionSnapshot, SessionStore};

//! Message log state and the send pipeline.

mod log;
mod store;

pub use log::MessageLog;
pub use store::{MessageSnapshot, MessageStore, SendOutcome};

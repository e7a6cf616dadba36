//! Session list state and its mutations.

mod store;
mod updater;

pub use store::{SessionSnapshot, SessionStore};
pub use updater::SessionUpdater;

//! Session domain module.
//!
//! # Module Structure
//!
//! - `model`: Core session domain model (`Session`) and its write shapes
//! - `repository`: Port for the remote `sessions` table

mod model;
mod repository;

pub use model::{NewSession, Session, SessionPatch};
pub use repository::SessionTable;

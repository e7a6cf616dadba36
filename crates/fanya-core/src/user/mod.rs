//! Identity of the signed-in user.

mod model;

pub use model::CurrentUser;

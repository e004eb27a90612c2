//! Bound request handlers behind generated routes.

pub mod api;
pub mod eval;
pub use api::*;
pub use eval::*;

//! Collaborators behind the bound handlers: data access and (de)serialization.

pub mod postgres;
pub mod search;
pub mod serialization;
pub mod session;

pub use postgres::PgSession;
pub use search::*;
pub use serialization::*;
pub use session::*;

pub mod types;
pub mod model;
pub mod loader;
pub mod validator;

pub use types::*;
pub use model::*;
pub use loader::*;
pub use validator::*;

pub mod auth;
pub mod message;
pub mod project;
pub mod tool;

pub use auth::*;
pub use message::*;
pub use project::*;
pub use tool::*;

pub mod accounts;
pub mod anon_work;
pub mod auth_gateway;
pub mod config;
pub mod naming;
pub mod projects;
pub mod prompts;
pub mod reconcile;
pub mod session;
pub mod tool_invocation;

pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 3000;

pub use accounts::*;
pub use anon_work::*;
pub use auth_gateway::*;
pub use config::*;
pub use naming::*;
pub use projects::*;
pub use prompts::*;
pub use reconcile::*;
pub use session::*;
pub use tool_invocation::*;

pub mod bridge;
pub mod client;
pub mod coordinator;
pub mod http;
pub mod presence;
pub mod protocol;
pub mod server;

pub use server::{start, ServerConfig, ServerHandle};

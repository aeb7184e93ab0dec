//! Application layer: the session handler and the server hosting it.

pub mod server;
pub mod service;

pub use server::{BroadcastServer, ServeReport};
pub use service::BroadcastService;

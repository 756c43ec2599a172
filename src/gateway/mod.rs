//! Gateway server implementation and HTTP handling.

pub mod server;

pub use server::{AppState, GatewayServer};

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod server;

pub use config::Config;
pub use server::{build_router, start, AppState, ServerHandle};

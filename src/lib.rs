pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod services;
pub mod state;
pub mod thumbnail;
pub mod types;

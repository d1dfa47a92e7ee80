pub mod backends;
pub mod config_loader;
pub mod controller;
pub mod ear;
pub mod emotion;
pub mod engine;
pub mod error;
pub mod page;
pub mod rate_limiter;
pub mod recognizers;
pub mod responses;
pub mod server;
pub mod session;
pub mod speaker;
pub mod wyoming;

mod routes;
mod server;
mod telemetry;

pub mod annotate;
pub mod app;
pub mod config;
pub mod pipeline;

pub use app::start_app;

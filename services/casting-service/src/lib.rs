pub mod app;
pub mod config;
pub mod handlers;

pub use app::{build_router, cors_layer, AppState};
pub use config::{load_service_config, ServiceConfig};

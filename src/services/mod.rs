//! Storage backends and the services built on them.

pub mod disk_store;
pub mod file_registry;
pub mod health_service;
pub mod http_store;
pub mod metadata_store;
pub mod object_store;
pub mod sigv4;

use file_registry::FileRegistry;
use health_service::HealthService;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub files: FileRegistry,
    pub health: HealthService,
}

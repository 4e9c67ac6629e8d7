pub mod config;
pub mod errors;
pub mod models;
pub mod pipe;
pub mod routes;
pub mod services;

use services::dispatcher::Dispatcher;

/// Shared application state passed to all Axum handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub config: config::AppConfig,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, config: config::AppConfig) -> Self {
        Self { dispatcher, config }
    }

    /// Wire the real engine and oracle from configuration.
    pub fn from_config(config: config::AppConfig) -> Self {
        Self::new(Dispatcher::from_config(&config), config)
    }

    /// Load configuration from the environment and wire the real services.
    pub fn from_env() -> Result<Self, errors::AppError> {
        Ok(Self::from_config(config::AppConfig::from_env()?))
    }
}

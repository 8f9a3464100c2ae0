use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::domain::CommandSpec;
use crate::core::traits::runner::Runner;

/// Shared by all handlers. Holds no mutable state.
#[derive(Clone, Debug)]
pub struct AppState {
    pub runner: Arc<dyn Runner>,
    pub command: Arc<CommandSpec>,
    pub execution_timeout_secs: u64,
    pub accepted_extensions: Arc<[String]>,
}

impl AppState {
    pub fn new(config: &ServerConfig, runner: Arc<dyn Runner>) -> Self {
        Self {
            runner,
            command: Arc::new(config.command.clone()),
            execution_timeout_secs: config.execution_timeout_secs,
            accepted_extensions: config.accepted_extensions.clone().into(),
        }
    }

    pub fn accepts(&self, filename: &str) -> bool {
        self.accepted_extensions
            .iter()
            .any(|ext| filename.ends_with(ext.as_str()))
    }
}

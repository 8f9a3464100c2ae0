//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::http::{HeaderValue, request::Parts};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::constants::{
    DEFAULT_ACCEPTED_EXTENSIONS, DEFAULT_ALLOWED_ORIGIN, DEFAULT_EXECUTION_TIMEOUT_SECS,
    DEFAULT_MAX_BODY_BYTES, DEFAULT_PROGRAM, SCRATCH_DIR_NAME,
};
use crate::core::domain::{ArgTemplate, CommandSpec};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid listen address {addr:?}: {reason}")]
    ListenAddr { addr: String, reason: String },
    #[error("invalid CORS origin {origin:?}")]
    Origin { origin: String },
    #[error("execution timeout must be greater than zero seconds")]
    ZeroTimeout,
    #[error("at least one accepted file extension is required")]
    NoExtensions,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// The single origin allowed to call the API.
    pub allowed_origin: String,
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
            allow_credentials: true,
        }
    }
}

impl CorsConfig {
    /// Methods and headers are mirrored from the preflight, which is how
    /// "allow everything" is expressed when credentials are enabled.
    pub fn layer(&self) -> Result<CorsLayer, ConfigError> {
        let allowed =
            HeaderValue::from_str(&self.allowed_origin).map_err(|_| ConfigError::Origin {
                origin: self.allowed_origin.clone(),
            })?;

        // Other origins get no `Access-Control-Allow-Origin` header at all.
        let origin = AllowOrigin::predicate(move |origin: &HeaderValue, _: &Parts| {
            *origin == allowed
        });

        Ok(CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(self.allow_credentials))
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub command: CommandSpec,
    /// Where transient script files are written.
    pub scratch_dir: PathBuf,
    pub execution_timeout_secs: u64,
    pub accepted_extensions: Vec<String>,
    pub max_body_bytes: usize,
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            command: CommandSpec::new(DEFAULT_PROGRAM, vec![ArgTemplate::ArtifactPath]),
            scratch_dir: default_scratch_dir(),
            execution_timeout_secs: DEFAULT_EXECUTION_TIMEOUT_SECS,
            accepted_extensions: DEFAULT_ACCEPTED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            cors: CorsConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.execution_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.accepted_extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        self.cors.layer()?;
        Ok(())
    }
}

pub fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join(SCRATCH_DIR_NAME)
}

pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ConfigError> {
    addr.parse().map_err(|e: std::net::AddrParseError| ConfigError::ListenAddr {
        addr: addr.to_string(),
        reason: e.to_string(),
    })
}

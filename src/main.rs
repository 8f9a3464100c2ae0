use std::panic;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{
    ConfigError, CorsConfig, ServerConfig, default_scratch_dir, parse_listen_addr,
};
use crate::constants::{
    DEFAULT_ALLOWED_ORIGIN, DEFAULT_EXECUTION_TIMEOUT_SECS, DEFAULT_LISTEN_ADDR,
    DEFAULT_MAX_BODY_BYTES, DEFAULT_PROGRAM,
};
use crate::core::domain::{ArgTemplate, CommandSpec, ExecutionResult};
use crate::core::traits::runner::Runner;
use crate::http::AppState;
use crate::native::runner::ProcessRunner;
use crate::stubs::runner::RunnerStub;

mod config;
mod constants;
mod core;
mod http;
mod native;
mod stubs;


/// HTTP API that runs OpenSees scripts and returns their output.
#[derive(Parser, Debug)]
#[command(name = "opensees-gateway")]
#[command(version)]
struct Args {
    /// Listen address
    #[arg(short, long, env = "OPENSEES_GATEWAY_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    listen: String,

    /// Program to run scripts with
    #[arg(long, env = "OPENSEES_GATEWAY_PROGRAM", default_value = DEFAULT_PROGRAM)]
    program: PathBuf,

    /// Arguments for the program; `{input}` is replaced by the script path
    #[arg(
        long = "arg",
        env = "OPENSEES_GATEWAY_ARGS",
        value_delimiter = ',',
        allow_hyphen_values = true,
        default_value = ArgTemplate::PLACEHOLDER
    )]
    args: Vec<String>,

    /// Arguments used by the health check to query the program version
    #[arg(
        long = "version-arg",
        env = "OPENSEES_GATEWAY_VERSION_ARGS",
        value_delimiter = ',',
        default_value = "--version"
    )]
    version_args: Vec<String>,

    /// Directory for transient script files [default: <temp>/opensees-gateway]
    #[arg(long, env = "OPENSEES_GATEWAY_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Execution timeout in seconds
    #[arg(long, env = "OPENSEES_GATEWAY_TIMEOUT", default_value_t = DEFAULT_EXECUTION_TIMEOUT_SECS)]
    timeout: u64,

    /// Accepted upload file extensions
    #[arg(
        long = "extension",
        env = "OPENSEES_GATEWAY_EXTENSIONS",
        value_delimiter = ',',
        default_value = ".tcl,.txt"
    )]
    extensions: Vec<String>,

    /// Origin allowed by CORS
    #[arg(long, env = "OPENSEES_GATEWAY_ALLOWED_ORIGIN", default_value = DEFAULT_ALLOWED_ORIGIN)]
    allowed_origin: String,

    /// Maximum request body size in bytes
    #[arg(long, env = "OPENSEES_GATEWAY_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    /// Log level, overridden by RUST_LOG
    #[arg(long, env = "OPENSEES_GATEWAY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Answer every run with a canned result instead of launching the program
    #[arg(long)]
    stub_runner: bool,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let command = CommandSpec::new(
            &self.program,
            self.args.iter().map(|arg| ArgTemplate::parse(arg)).collect(),
        )
        .with_version_args(self.version_args);

        let config = ServerConfig {
            listen_addr: parse_listen_addr(&self.listen)?,
            command,
            scratch_dir: self.scratch_dir.unwrap_or_else(default_scratch_dir),
            execution_timeout_secs: self.timeout,
            accepted_extensions: self.extensions,
            max_body_bytes: self.max_body_bytes,
            cors: CorsConfig {
                allowed_origin: self.allowed_origin,
                ..CorsConfig::default()
            },
        };
        config.validate()?;

        Ok(config)
    }
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(&args.log_level, args.json_logs);
    set_panic_hook();

    let stub_runner = args.stub_runner;
    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runner: Arc<dyn Runner> = if stub_runner {
        tracing::warn!("Using stub runner, scripts will not be executed");
        Arc::new(RunnerStub::new(
            Ok(ExecutionResult {
                exit_code: Some(0),
                stdout: "Hello World\n".to_string(),
                stderr: "".to_string(),
                timed_out: false,
                execution_time_ms: 100,
            }),
            Duration::from_secs(1),
        ))
    } else {
        Arc::new(ProcessRunner::new(&config.scratch_dir))
    };

    let probe = runner.probe(&config.command).await;
    if !probe.available {
        tracing::warn!(
            program = %config.command.program.display(),
            "Program is not available, executions will fail until it is installed"
        );
    }

    let state = AppState::new(&config, runner);
    if let Err(e) = http::serve(config, state, shutdown_signal()).await {
        tracing::error!("Server error: {:#}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("script content is empty")]
    EmptyPayload,
    #[error("timeout must be greater than zero seconds")]
    ZeroTimeout,
}

/// A single script to hand to the external program.
///
/// Constructed per inbound call via [`ExecutionRequest::new`], which rejects
/// empty payloads and zero timeouts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionRequest {
    payload: Vec<u8>,
    source_label: Option<String>,
    timeout_secs: u64,
}

impl ExecutionRequest {
    pub fn new(
        payload: impl Into<Vec<u8>>,
        source_label: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ValidationError> {
        let payload = payload.into();
        if payload.is_empty() {
            return Err(ValidationError::EmptyPayload);
        }
        if timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout);
        }

        Ok(Self {
            payload,
            source_label,
            timeout_secs,
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn source_label(&self) -> Option<&str> {
        self.source_label.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    /// `None` only when the run timed out.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub execution_time_ms: u64,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgTemplate {
    Literal(String),
    ArtifactPath,
}

impl ArgTemplate {
    pub const PLACEHOLDER: &'static str = "{input}";

    pub fn parse(raw: &str) -> Self {
        if raw == Self::PLACEHOLDER {
            ArgTemplate::ArtifactPath
        } else {
            ArgTemplate::Literal(raw.to_string())
        }
    }
}

/// The external executable and how to call it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<ArgTemplate>,
    pub version_args: Vec<String>,
}

impl CommandSpec {
    pub fn new<P: AsRef<Path>>(program: P, args: Vec<ArgTemplate>) -> Self {
        Self {
            program: program.as_ref().into(),
            args,
            version_args: vec!["--version".to_string()],
        }
    }

    pub fn with_version_args(self, version_args: Vec<String>) -> Self {
        Self {
            version_args,
            ..self
        }
    }

    /// Argument vector with `artifact` substituted for every placeholder.
    /// Without a placeholder the artifact path goes last.
    pub fn arguments_for(&self, artifact: &Path) -> Vec<OsString> {
        let mut argv: Vec<OsString> = self
            .args
            .iter()
            .map(|arg| match arg {
                ArgTemplate::Literal(value) => OsString::from(value),
                ArgTemplate::ArtifactPath => artifact.as_os_str().to_owned(),
            })
            .collect();

        if !self.args.contains(&ArgTemplate::ArtifactPath) {
            argv.push(artifact.as_os_str().to_owned());
        }

        argv
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeReport {
    pub available: bool,
    pub version_text: String,
}

impl ProbeReport {
    pub const NOT_AVAILABLE: &'static str = "Not available";

    pub fn unavailable() -> Self {
        Self {
            available: false,
            version_text: Self::NOT_AVAILABLE.to_string(),
        }
    }
}

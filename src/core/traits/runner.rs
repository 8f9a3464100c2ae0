use crate::core::domain::{CommandSpec, ExecutionRequest, ExecutionResult, ProbeReport};

/// Failures that prevent an execution from producing a result.
///
/// A non-zero exit status and a timeout are both reported through
/// [`ExecutionResult`], not here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    #[error("failed to write script to {path}: {reason}")]
    ArtifactWrite { path: String, reason: String },
    #[error("failed to launch {program}: {reason}")]
    Launch { program: String, reason: String },
    #[error("{msg}")]
    Internal { msg: String },
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait Runner: std::fmt::Debug + Send + Sync {
    async fn run(
        &self,
        request: &ExecutionRequest,
        command: &CommandSpec,
    ) -> Result<ExecutionResult, RunError>;

    /// Never fails: launch failures and non-zero exits both mean unavailable.
    async fn probe(&self, command: &CommandSpec) -> ProbeReport;
}

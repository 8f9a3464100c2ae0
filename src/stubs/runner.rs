use std::time::Duration;

use crate::core::{
    domain::{CommandSpec, ExecutionRequest, ExecutionResult, ProbeReport},
    traits::runner::{RunError, Runner},
};

/// Answers every run with a canned result, for working on a frontend
/// without the external program installed.
#[derive(Debug, Clone)]
pub struct RunnerStub {
    result: Result<ExecutionResult, RunError>,
    delay: Duration,
}

impl RunnerStub {
    pub fn new(result: Result<ExecutionResult, RunError>, delay: Duration) -> Self {
        Self { result, delay }
    }
}

#[async_trait::async_trait]
impl Runner for RunnerStub {
    #[tracing::instrument(skip(request), fields(source = ?request.source_label()))]
    async fn run(
        &self,
        request: &ExecutionRequest,
        command: &CommandSpec,
    ) -> Result<ExecutionResult, RunError> {
        tracing::debug!(
            "Start execution: bytes={}, command={:?}",
            request.payload().len(),
            command
        );
        tokio::time::sleep(self.delay).await;
        tracing::debug!("Execution result: {:?}", self.result);

        self.result.clone()
    }

    async fn probe(&self, _command: &CommandSpec) -> ProbeReport {
        ProbeReport {
            available: true,
            version_text: "stub runner".to_string(),
        }
    }
}

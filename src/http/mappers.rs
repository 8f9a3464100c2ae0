use crate::core::domain::{ExecutionResult, ProbeReport};
use crate::http::models::{HealthResponse, RunResponse};

impl From<(ExecutionResult, Option<String>)> for RunResponse {
    fn from((result, filename): (ExecutionResult, Option<String>)) -> Self {
        Self {
            success: result.succeeded(),
            return_code: result.exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
            filename,
        }
    }
}

impl From<ProbeReport> for HealthResponse {
    fn from(report: ProbeReport) -> Self {
        Self {
            status: "healthy".to_string(),
            opensees_available: report.available,
            opensees_version: report.version_text,
        }
    }
}

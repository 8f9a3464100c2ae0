use axum::{
    Json,
    body::Bytes,
    extract::{
        Multipart, Query, State,
        rejection::{BytesRejection, QueryRejection},
    },
    http::{HeaderMap, header},
};

use crate::{
    core::domain::{ExecutionRequest, ExecutionResult},
    http::{
        error::ApiError,
        models::{
            HealthResponse, InlineScriptQuery, InlineScriptRequest, RootResponse, RunResponse,
        },
        state::AppState,
    },
};

const UPLOAD_FIELD: &str = "file";

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "OpenSees Web API is running!".to_string(),
        status: "success".to_string(),
    })
}

#[tracing::instrument(skip_all)]
pub async fn run_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<RunResponse>, ApiError> {
    let (filename, content) = read_upload(&mut multipart).await?;
    tracing::info!(filename = %filename, bytes = content.len(), "Received script file");

    if !state.accepts(&filename) {
        return Err(ApiError::BadRequest(format!(
            "Only {} files are allowed",
            state.accepted_extensions.join(", ")
        )));
    }

    let request = ExecutionRequest::new(
        content,
        Some(filename.clone()),
        state.execution_timeout_secs,
    )?;
    let result = execute(&state, &request).await?;

    Ok(Json((result, Some(filename)).into()))
}

#[tracing::instrument(skip_all)]
pub async fn run_script(
    State(state): State<AppState>,
    query: Result<Query<InlineScriptQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<RunResponse>, ApiError> {
    let Query(query) = query?;
    let script = script_content(query, &headers, body?)?;
    tracing::info!(bytes = script.len(), "Received inline script");

    let request = ExecutionRequest::new(script, None, state.execution_timeout_secs)?;
    let result = execute(&state, &request).await?;

    Ok(Json((result, None).into()))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = state.runner.probe(&state.command).await;
    Json(report.into())
}

/// Partial output of a timed out run is not returned to the client.
async fn execute(
    state: &AppState,
    request: &ExecutionRequest,
) -> Result<ExecutionResult, ApiError> {
    let result = state.runner.run(request, &state.command).await?;
    if result.timed_out {
        return Err(ApiError::Timeout);
    }
    Ok(result)
}

async fn read_upload(multipart: &mut Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("Uploaded file has no filename".to_string()))?;
        let content = field.bytes().await?;

        return Ok((filename, content.to_vec()));
    }

    Err(ApiError::BadRequest(format!(
        "Missing required field: '{}'",
        UPLOAD_FIELD
    )))
}

/// Query parameter first, then a JSON body, then the raw body.
fn script_content(
    query: InlineScriptQuery,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Vec<u8>, ApiError> {
    if let Some(script) = query.script_content {
        return Ok(script.into_bytes());
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    if is_json {
        let parsed: InlineScriptRequest = serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?;
        return Ok(parsed.script_content.into_bytes());
    }

    Ok(body.to_vec())
}

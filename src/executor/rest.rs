//! REST call actions.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, info, warn};

use super::{ExecutionResult, RestAction};
use crate::matcher::CaptureMap;
use crate::template;

/// Render and send a REST action. Connect, response and body read share one
/// `timeout`; a body cut short by it keeps the part already received.
pub async fn run(
    client: &reqwest::Client,
    action: &RestAction,
    captures: &CaptureMap,
    timeout: Duration,
) -> ExecutionResult {
    let json = match &action.json_template {
        Some(tmpl) => match template::render(tmpl, captures) {
            Ok(json) => json,
            Err(e) => return ExecutionResult::template_failure(&e),
        },
        None => String::new(),
    };

    let url = match template::render(&action.url_template, captures) {
        Ok(url) => url,
        Err(e) => return ExecutionResult::template_failure(&e),
    };

    info!("running action");
    let shown_json = if json.is_empty() { "<none>" } else { json.as_str() };
    debug!(method = %action.method, url = %url, json = shown_json, "request rendered");

    let parsed = match url::Url::parse(&url) {
        Ok(parsed) => parsed,
        Err(e) => return ExecutionResult::connection_failure(format!("invalid URL '{url}': {e}")),
    };

    if !json.is_empty() && serde_json::from_str::<serde_json::Value>(&json).is_err() {
        warn!("rendered body is not valid JSON, sending it unchanged");
    }

    let mut request = client
        .request(action.method.clone(), parsed)
        .header(CONTENT_TYPE, "application/json");
    if let Some(auth) = &action.basic_auth {
        request = request.header(AUTHORIZATION, auth);
    }
    if !json.is_empty() {
        request = request.body(json);
    }

    let deadline = tokio::time::Instant::now()
        .checked_add(timeout)
        .unwrap_or_else(tokio::time::Instant::now);

    let response = match tokio::time::timeout_at(deadline, request.send()).await {
        Err(_) => {
            return ExecutionResult::connection_failure(format!("request timed out after {timeout:?}"))
        }
        Ok(Err(e)) => return ExecutionResult::connection_failure(e.to_string()),
        Ok(Ok(response)) => response,
    };

    let status = response.status().as_u16();
    let body = read_body(response, deadline).await;
    ExecutionResult::http_response(status, &body)
}

/// Read the response body until it ends, fails or `deadline` passes.
/// Whatever arrived before a failure is kept.
async fn read_body(mut response: reqwest::Response, deadline: tokio::time::Instant) -> String {
    let status = response.status().as_u16();
    let mut body = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, response.chunk()).await {
            Ok(Ok(Some(chunk))) => body.extend_from_slice(&chunk),
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                debug!(status, error = %e, received = body.len(), "response body incomplete");
                break;
            }
            Err(_) => {
                debug!(status, received = body.len(), "response body timed out");
                break;
            }
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

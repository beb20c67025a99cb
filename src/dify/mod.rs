//! Dify workflow-execution API client.
//!
//! Every pipeline stage is a published Dify workflow invoked in blocking
//! mode: one POST per call, the response carries the workflow's output
//! fields. The credential is scoped to the workflow, so callers pass the
//! per-stage API key with each invocation.

mod error;

pub use error::DifyError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Output fields returned by a workflow run.
///
/// Workflows are edited by non-programmers and occasionally drop an output
/// field; a missing key reads as an empty string rather than an error.
#[derive(Debug, Clone, Default)]
pub struct WorkflowOutputs {
    values: HashMap<String, String>,
}

impl WorkflowOutputs {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// The value for `key`, or an empty string if the workflow did not
    /// produce it.
    pub fn get(&self, key: &str) -> String {
        self.values.get(key).cloned().unwrap_or_default()
    }
}

/// Transport seam for workflow invocation.
///
/// Stage processors depend on this trait rather than the concrete client so
/// tests can substitute a stub transport.
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    /// Run the workflow behind `api_key` with the given input fields and
    /// wait for its outputs. A failed attempt is terminal; the transport
    /// never retries.
    async fn run_workflow(
        &self,
        api_key: &str,
        inputs: HashMap<String, String>,
    ) -> Result<WorkflowOutputs, DifyError>;
}

/// HTTP client for the Dify API.
pub struct DifyClient {
    client: reqwest::Client,
    base_url: String,
    user: String,
    timeout: Duration,
}

impl DifyClient {
    /// Create a client. The timeout applies to the whole request; blocking
    /// workflow runs routinely take minutes.
    pub fn new(base_url: &str, user: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl WorkflowRunner for DifyClient {
    async fn run_workflow(
        &self,
        api_key: &str,
        inputs: HashMap<String, String>,
    ) -> Result<WorkflowOutputs, DifyError> {
        let url = format!("{}/workflows/run", self.base_url);
        let request = RunRequest {
            inputs,
            response_mode: "blocking",
            user: &self.user,
        };

        tracing::debug!("Running workflow: url={}", url);

        let response = match self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                if e.is_timeout() {
                    return Err(DifyError::Timeout(self.timeout));
                } else if e.is_connect() {
                    return Err(DifyError::Network(format!("Connection failed: {}", e)));
                } else {
                    return Err(DifyError::Network(format!("Request failed: {}", e)));
                }
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(DifyError::from_status(status.as_u16(), &body));
        }

        let parsed: RunResponse = serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(500).collect();
            DifyError::Malformed(format!("{}, body: {}", e, preview))
        })?;

        let outputs = parsed
            .data
            .and_then(|d| d.outputs)
            .ok_or_else(|| DifyError::Malformed("response has no outputs".to_string()))?;

        // Workflow outputs are declared as strings but the API hands back
        // arbitrary JSON; coerce rather than reject.
        let values = outputs
            .into_iter()
            .map(|(k, v)| {
                let s = match v {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                (k, s)
            })
            .collect();

        Ok(WorkflowOutputs::new(values))
    }
}

/// Request body of `POST /workflows/run`.
#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    inputs: HashMap<String, String>,
    response_mode: &'a str,
    user: &'a str,
}

/// Response body of a blocking workflow run.
#[derive(Debug, Deserialize)]
struct RunResponse {
    #[serde(default)]
    data: Option<RunData>,
}

#[derive(Debug, Deserialize)]
struct RunData {
    #[serde(default)]
    outputs: Option<HashMap<String, serde_json::Value>>,
}

//! Remote tracking backend over HTTP+JSON.
//!
//! Speaks the logical RPC contract against a tracking server:
//!
//! ```text
//! POST   /api/experiments                  create (idempotent by name)
//! GET    /api/experiments/by-name?name=    lookup, 404 -> None
//! POST   /api/runs                         allocate a running run
//! POST   /api/runs/<id>/batch              one fact kind per request
//! PUT    /api/runs/<id>/artifacts/<path>   raw bytes, checksum header
//! PATCH  /api/runs/<id>                    terminal state transition
//! ```
//!
//! Connection-level failures map to `BackendUnavailable`; an HTTP error
//! status is a `Backend` rejection (the server was reached and said no).

use super::TrackingClient;
use crate::record::{
    ExperimentId, MetricRecord, Param, RunId, RunRecord, RunState, TagRecord,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header carrying the artifact content checksum on upload.
const CHECKSUM_HEADER: &str = "x-artifact-checksum";

/// HTTP client for a remote tracking service.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct CreateExperimentRequest<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct ExperimentResponse {
    experiment_id: ExperimentId,
}

#[derive(Serialize)]
struct CreateRunRequest<'a> {
    experiment_id: &'a ExperimentId,
}

#[derive(Deserialize)]
struct RunResponse {
    run: RunRecord,
}

/// Fact batch body; exactly one kind is populated per request so a failing
/// batch is attributable to its kind.
#[derive(Serialize, Default)]
struct LogBatchRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a [Param]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<&'a [MetricRecord]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a [TagRecord]>,
}

#[derive(Serialize)]
struct UpdateRunRequest {
    state: RunState,
    ended_at: DateTime<Utc>,
}

impl HttpClient {
    /// Create a client for the service at `base_url`
    /// (e.g. `http://127.0.0.1:5000`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            client: reqwest::blocking::Client::new(),
        }
    }

    /// The service endpoint this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn transport_error(&self, e: &reqwest::Error) -> Error {
        if e.is_connect() || e.is_timeout() {
            Error::BackendUnavailable {
                uri: self.base_url.clone(),
                reason: e.to_string(),
            }
        } else {
            Error::Http(e.to_string())
        }
    }

    fn check(&self, response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(Error::Backend(format!("{status}: {body}")))
    }

    fn post_batch(&self, run_id: &RunId, batch: &LogBatchRequest<'_>) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(&format!("api/runs/{run_id}/batch")))
            .json(batch)
            .send()
            .map_err(|e| self.transport_error(&e))?;
        self.check(response)?;
        Ok(())
    }
}

impl TrackingClient for HttpClient {
    fn create_experiment(&self, name: &str) -> Result<ExperimentId> {
        let response = self
            .client
            .post(self.endpoint("api/experiments"))
            .json(&CreateExperimentRequest { name })
            .send()
            .map_err(|e| self.transport_error(&e))?;
        let body: ExperimentResponse = self
            .check(response)?
            .json()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(body.experiment_id)
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentId>> {
        let response = self
            .client
            .get(self.endpoint("api/experiments/by-name"))
            .query(&[("name", name)])
            .send()
            .map_err(|e| self.transport_error(&e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: ExperimentResponse = self
            .check(response)?
            .json()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Some(body.experiment_id))
    }

    fn create_run(&self, experiment_id: &ExperimentId) -> Result<RunRecord> {
        let response = self
            .client
            .post(self.endpoint("api/runs"))
            .json(&CreateRunRequest { experiment_id })
            .send()
            .map_err(|e| self.transport_error(&e))?;
        let body: RunResponse = self
            .check(response)?
            .json()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(body.run)
    }

    fn log_params(&self, run_id: &RunId, params: &[Param]) -> Result<()> {
        self.post_batch(
            run_id,
            &LogBatchRequest {
                params: Some(params),
                ..LogBatchRequest::default()
            },
        )
    }

    fn log_metrics(&self, run_id: &RunId, metrics: &[MetricRecord]) -> Result<()> {
        self.post_batch(
            run_id,
            &LogBatchRequest {
                metrics: Some(metrics),
                ..LogBatchRequest::default()
            },
        )
    }

    fn set_tags(&self, run_id: &RunId, tags: &[TagRecord]) -> Result<()> {
        self.post_batch(
            run_id,
            &LogBatchRequest {
                tags: Some(tags),
                ..LogBatchRequest::default()
            },
        )
    }

    fn log_artifact(
        &self,
        run_id: &RunId,
        relative_path: &str,
        bytes: &[u8],
        checksum: &str,
    ) -> Result<()> {
        let response = self
            .client
            .put(self.endpoint(&format!("api/runs/{run_id}/artifacts/{relative_path}")))
            .header(CHECKSUM_HEADER, checksum)
            .body(bytes.to_vec())
            .send()
            .map_err(|e| self.transport_error(&e))?;
        self.check(response)?;
        Ok(())
    }

    fn update_run_state(
        &self,
        run_id: &RunId,
        state: RunState,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let response = self
            .client
            .patch(self.endpoint(&format!("api/runs/{run_id}")))
            .json(&UpdateRunRequest { state, ended_at })
            .send()
            .map_err(|e| self.transport_error(&e))?;
        self.check(response)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_normalized() {
        let client = HttpClient::new("http://127.0.0.1:5000///");
        assert_eq!(client.base_url(), "http://127.0.0.1:5000");
        assert_eq!(
            client.endpoint("api/experiments"),
            "http://127.0.0.1:5000/api/experiments"
        );
    }

    #[test]
    fn test_unreachable_backend_maps_to_unavailable() {
        // Reserved port with nothing listening; connect error, not an HTTP one.
        let client = HttpClient::new("http://127.0.0.1:1");
        match client.create_experiment("Wine") {
            Err(Error::BackendUnavailable { uri, .. }) => {
                assert_eq!(uri, "http://127.0.0.1:1");
            }
            other => panic!("expected BackendUnavailable, got {other:?}"),
        }
    }
}

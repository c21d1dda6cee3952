// ABOUTME: HTTP client for communicating with the flowchart analysis service
// ABOUTME: Handles job submission, listing, detail fetches and error classification

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use super::api::JobApi;
use super::models::{CreateJobRequest, Job, JobSummary};
use crate::error::ApiError;

pub const EMPTY_CODE_MESSAGE: &str = "Please paste code or choose a file.";

pub struct RemoteClient {
    client: Client,
    api_base_url: String,
    base: Url,
}

impl RemoteClient {
    pub fn new(api_base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::Transport)?;

        let api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        let base = Url::parse(&api_base_url).map_err(|e| {
            ApiError::InvalidRequest(format!("Invalid API base URL {}: {}", api_base_url, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidRequest(format!(
                "Invalid API base URL {}",
                api_base_url
            )));
        }
        Ok(Self {
            client,
            api_base_url,
            base,
        })
    }

    /// Appends `segments` to the base URL, percent-encoding each one so an
    /// opaque job id can never change which resource is addressed.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// Liveness probe; returns the service's reported status string.
    pub async fn health(&self) -> Result<String, ApiError> {
        let url = self.endpoint(&["health"]);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ApiError::Transport)?;
        let body: serde_json::Value = decode(check(response, None).await?).await?;
        Ok(body
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("unknown")
            .to_string())
    }
}

#[async_trait]
impl JobApi for RemoteClient {
    async fn create_job(&self, code: &str) -> Result<JobSummary, ApiError> {
        if code.trim().is_empty() {
            return Err(ApiError::InvalidRequest(EMPTY_CODE_MESSAGE.to_string()));
        }

        let url = self.endpoint(&["api", "jobs"]);
        tracing::debug!(url = %url, bytes = code.len(), "Submitting job");

        let response = self
            .client
            .post(url)
            .json(&CreateJobRequest {
                code: code.to_string(),
            })
            .send()
            .await
            .map_err(ApiError::Transport)?;

        let summary: JobSummary = decode(check(response, None).await?).await?;
        tracing::info!(job_id = %summary.id, status = %summary.status, "Job submitted");
        Ok(summary)
    }

    async fn list_jobs(&self) -> Result<Vec<JobSummary>, ApiError> {
        let url = self.endpoint(&["api", "jobs"]);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ApiError::Transport)?;

        decode(check(response, None).await?).await
    }

    async fn get_job(&self, job_id: &str) -> Result<Job, ApiError> {
        let url = self.endpoint(&["api", "jobs", job_id]);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ApiError::Transport)?;

        decode(check(response, Some(job_id)).await?).await
    }
}

/// Turns non-2xx responses into [`ApiError`]s, preferring the service's
/// `detail` field over the bare status line.
async fn check(response: Response, job_id: Option<&str>) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        if let Some(job_id) = job_id {
            return Err(ApiError::NotFound {
                job_id: job_id.to_string(),
            });
        }
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Server {
        status: status.as_u16(),
        detail: error_detail(status, &body),
    })
}

fn error_detail(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("detail").cloned());

    match detail {
        Some(serde_json::Value::String(detail)) => detail,
        Some(other) => other.to_string(),
        None if !body.trim().is_empty() => format!("HTTP {}: {}", status.as_u16(), body.trim()),
        None => format!("HTTP {}", status.as_u16()),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let body = response.text().await.map_err(ApiError::Transport)?;
    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = RemoteClient::new("https://api.example.com/", Duration::from_secs(30));
        assert!(client.is_ok());
        assert_eq!(client.unwrap().api_base_url(), "https://api.example.com");
    }

    #[test]
    fn test_job_id_is_escaped_as_one_path_segment() {
        let client = RemoteClient::new("http://localhost:8000/", Duration::from_secs(30)).unwrap();
        assert_eq!(
            client.endpoint(&["api", "jobs", "a/b?c#d"]).as_str(),
            "http://localhost:8000/api/jobs/a%2Fb%3Fc%23d"
        );
        assert_eq!(
            client.endpoint(&["api", "jobs"]).as_str(),
            "http://localhost:8000/api/jobs"
        );
    }

    #[test]
    fn test_base_path_prefix_is_kept() {
        let client = RemoteClient::new("https://example.com/flow/", Duration::from_secs(30)).unwrap();
        assert_eq!(
            client.endpoint(&["health"]).as_str(),
            "https://example.com/flow/health"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let err = RemoteClient::new("not a url", Duration::from_secs(30)).err().unwrap();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[test]
    fn test_error_detail_prefers_detail_field() {
        let detail = error_detail(StatusCode::BAD_REQUEST, r#"{"detail": "Code is required"}"#);
        assert_eq!(detail, "Code is required");
    }

    #[test]
    fn test_error_detail_falls_back_to_status() {
        assert_eq!(
            error_detail(StatusCode::BAD_GATEWAY, ""),
            "HTTP 502".to_string()
        );
        assert_eq!(
            error_detail(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            "HTTP 500: boom".to_string()
        );
    }

    #[tokio::test]
    async fn test_empty_code_is_rejected_before_sending() {
        let client = RemoteClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let err = client.create_job("   \n").await.unwrap_err();
        assert_eq!(err.to_string(), EMPTY_CODE_MESSAGE);
    }
}

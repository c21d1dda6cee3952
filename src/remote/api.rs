// ABOUTME: Port describing the remote job service
// ABOUTME: Pollers and the CLI depend on this trait rather than on the HTTP client

use async_trait::async_trait;

use super::models::{Job, JobSummary};
use crate::error::ApiError;

#[async_trait]
pub trait JobApi: Send + Sync {
    /// Submit source code; the job is processed asynchronously by the service.
    async fn create_job(&self, code: &str) -> Result<JobSummary, ApiError>;

    async fn list_jobs(&self) -> Result<Vec<JobSummary>, ApiError>;

    /// Fails with [`ApiError::NotFound`] when the id is unknown to the service.
    async fn get_job(&self, job_id: &str) -> Result<Job, ApiError>;
}

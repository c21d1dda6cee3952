// ABOUTME: Remote job service module
// ABOUTME: API port, reqwest-backed client and wire models

pub mod api;
pub mod client;
pub mod models;

pub use api::JobApi;
pub use client::{RemoteClient, EMPTY_CODE_MESSAGE};
pub use models::{CreateJobRequest, FunctionResult, Job, JobStatus, JobSummary};

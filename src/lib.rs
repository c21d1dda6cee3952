// ABOUTME: Client library for the C-to-flowchart analysis service
// ABOUTME: Remote job API, job and job-list pollers, and the diagram rendering pipeline

pub mod config;
pub mod error;
pub mod logging;
pub mod poll;
pub mod remote;
pub mod render;

pub use config::{ClientConfig, EngineKind};
pub use error::{ApiError, ConfigError, RenderError};

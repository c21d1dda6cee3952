// ABOUTME: Data structures for the job service wire format
// ABOUTME: Jobs, job summaries, per-function diagrams and the status state machine

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job as reported by the service.
///
/// `Completed`/`Success`, `Processing`/`InProgress` and `Submitted`/`Queued`
/// are synonyms inherited from the service; they compare unequal but share a
/// [`stage`](JobStatus::stage) and every predicate treats them alike.
///
/// Literals this client does not know decode as `Unknown`, which is neither
/// active nor terminal: the job is shown but no longer refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    Queued,
    Processing,
    InProgress,
    GeneratingFlowchart,
    Validating,
    Completed,
    Success,
    Failed,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Every status the service is known to send.
    pub const ALL: [JobStatus; 9] = [
        JobStatus::Submitted,
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::InProgress,
        JobStatus::GeneratingFlowchart,
        JobStatus::Validating,
        JobStatus::Completed,
        JobStatus::Success,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "submitted",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::InProgress => "in_progress",
            JobStatus::GeneratingFlowchart => "generating_flowchart",
            JobStatus::Validating => "validating",
            JobStatus::Completed => "completed",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Unknown => "unknown",
        }
    }

    /// Non-terminal: the job may still change and is worth re-fetching.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobStatus::Submitted
                | JobStatus::Queued
                | JobStatus::Processing
                | JobStatus::InProgress
                | JobStatus::GeneratingFlowchart
                | JobStatus::Validating
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Success)
    }

    pub fn is_terminal(&self) -> bool {
        self.is_success() || *self == JobStatus::Failed
    }

    /// Position in the forward-only lifecycle. Synonyms share a stage and
    /// both terminal outcomes sit on the last one.
    pub fn stage(&self) -> u8 {
        match self {
            JobStatus::Submitted | JobStatus::Queued | JobStatus::Unknown => 0,
            JobStatus::Processing | JobStatus::InProgress => 1,
            JobStatus::GeneratingFlowchart => 2,
            JobStatus::Validating => 3,
            JobStatus::Completed | JobStatus::Success | JobStatus::Failed => 4,
        }
    }

    /// Whether moving from `previous` to `self` respects the lifecycle.
    /// Always true when either side is `Unknown`.
    pub fn follows(&self, previous: JobStatus) -> bool {
        if *self == JobStatus::Unknown || previous == JobStatus::Unknown {
            return true;
        }
        if previous.is_terminal() {
            return previous.is_success() == self.is_success() && self.is_terminal();
        }
        *self == JobStatus::Failed || self.stage() >= previous.stage()
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "Submitted",
            JobStatus::Queued => "Queued",
            JobStatus::Processing => "Processing",
            JobStatus::InProgress => "In Progress",
            JobStatus::GeneratingFlowchart => "Generating Flowchart",
            JobStatus::Validating => "Validating",
            JobStatus::Completed => "Completed",
            JobStatus::Success => "Success",
            JobStatus::Failed => "Failed",
            JobStatus::Unknown => "Unknown",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "Job has been submitted and queued for processing",
            JobStatus::Queued => "Job is queued for processing",
            JobStatus::Processing => "Job is being processed",
            JobStatus::InProgress => "Processing in progress",
            JobStatus::GeneratingFlowchart => "AI is generating the flowchart diagram",
            JobStatus::Validating => "Validating Mermaid syntax",
            JobStatus::Completed | JobStatus::Success => "Job completed successfully",
            JobStatus::Failed => "Job processing failed",
            JobStatus::Unknown => "Unknown status",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid job status: {}", s))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateJobRequest {
    pub code: String,
}

/// One flowchart produced for one function of the submitted source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionResult {
    pub name: String,
    #[serde(default)]
    pub mermaid: String,
    #[serde(default)]
    pub validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Row of the job list; also what job creation returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub total_functions: u32,
    #[serde(default)]
    pub processed_functions: u32,
    #[serde(default, with = "wire_time")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "wire_time")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Full job record as returned by `GET /api/jobs/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub total_functions: u32,
    #[serde(default)]
    pub processed_functions: u32,
    #[serde(default)]
    pub functions: Vec<FunctionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, with = "wire_time")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "wire_time")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Job {
    /// `(processed, total)` once the service knows how many functions there are.
    pub fn progress(&self) -> Option<(u32, u32)> {
        (self.total_functions > 0).then_some((self.processed_functions, self.total_functions))
    }

    /// The service's failure message, only meaningful for a failed job.
    pub fn failure(&self) -> Option<&str> {
        if self.status == JobStatus::Failed {
            Some(self.error.as_deref().unwrap_or("unknown error"))
        } else {
            None
        }
    }

    pub fn function(&self, name: &str) -> Option<&FunctionResult> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// The service emits naive UTC timestamps (`2024-05-01T10:00:00.123456`);
/// RFC 3339 with an offset is accepted as well.
mod wire_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(Some(ts.with_timezone(&Utc)));
        }
        raw.parse::<NaiveDateTime>()
            .map(|naive| Some(naive.and_utc()))
            .map_err(serde::de::Error::custom)
    }
}

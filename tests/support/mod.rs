#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use flowchart_client::error::{ApiError, RenderError};
use flowchart_client::poll::PollEvent;
use flowchart_client::remote::{FunctionResult, Job, JobApi, JobStatus, JobSummary};
use flowchart_client::render::{Artifact, DiagramEngine, RenderToken};

#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    NotFound,
    Server(u16),
}

#[derive(Debug, Clone)]
pub struct Step<T> {
    pub delay: Duration,
    pub reply: Reply<T>,
}

impl<T> Step<T> {
    pub fn ok(value: T) -> Self {
        Self {
            delay: Duration::ZERO,
            reply: Reply::Ok(value),
        }
    }

    pub fn not_found() -> Self {
        Self {
            delay: Duration::ZERO,
            reply: Reply::NotFound,
        }
    }

    pub fn server(status: u16) -> Self {
        Self {
            delay: Duration::ZERO,
            reply: Reply::Server(status),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Replays scripted replies in order and repeats the last one once exhausted.
struct Script<T> {
    steps: VecDeque<Step<T>>,
    last: Option<Step<T>>,
}

impl<T: Clone> Script<T> {
    fn new(steps: Vec<Step<T>>) -> Self {
        Self {
            steps: steps.into(),
            last: None,
        }
    }

    fn next(&mut self) -> Step<T> {
        if let Some(step) = self.steps.pop_front() {
            self.last = Some(step.clone());
            return step;
        }
        self.last.clone().expect("script has no steps")
    }
}

pub struct ScriptedApi {
    jobs: Mutex<Script<Job>>,
    lists: Mutex<Script<Vec<JobSummary>>>,
    created: Mutex<Option<JobSummary>>,
    pub get_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedApi {
    pub fn jobs(steps: Vec<Step<Job>>) -> Arc<Self> {
        Arc::new(Self::new(steps, Vec::new()))
    }

    pub fn lists(steps: Vec<Step<Vec<JobSummary>>>) -> Arc<Self> {
        Arc::new(Self::new(Vec::new(), steps))
    }

    fn new(jobs: Vec<Step<Job>>, lists: Vec<Step<Vec<JobSummary>>>) -> Self {
        Self {
            jobs: Mutex::new(Script::new(jobs)),
            lists: Mutex::new(Script::new(lists)),
            created: Mutex::new(None),
            get_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn on_create(&self, summary: JobSummary) {
        *self.created.lock() = Some(summary);
    }

    pub fn gets(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn list_fetches(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn play<T>(&self, step: Step<T>, job_id: &str) -> Result<T, ApiError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // Decrements even when the caller drops this future mid-sleep.
        let _guard = InFlightGuard(&self.in_flight);
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        match step.reply {
            Reply::Ok(value) => Ok(value),
            Reply::NotFound => Err(ApiError::NotFound {
                job_id: job_id.to_string(),
            }),
            Reply::Server(status) => Err(ApiError::Server {
                status,
                detail: format!("HTTP {}", status),
            }),
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobApi for ScriptedApi {
    async fn create_job(&self, code: &str) -> Result<JobSummary, ApiError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if code.trim().is_empty() {
            return Err(ApiError::InvalidRequest("empty".to_string()));
        }
        self.created
            .lock()
            .clone()
            .ok_or_else(|| ApiError::Server {
                status: 500,
                detail: "create not scripted".to_string(),
            })
    }

    async fn list_jobs(&self) -> Result<Vec<JobSummary>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.lists.lock().next();
        self.play(step, "").await
    }

    async fn get_job(&self, job_id: &str) -> Result<Job, ApiError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.jobs.lock().next();
        self.play(step, job_id).await
    }
}

pub fn job(id: &str, status: JobStatus) -> Job {
    Job {
        id: id.to_string(),
        status,
        code: "int main(void) { return 0; }".to_string(),
        total_functions: 0,
        processed_functions: 0,
        functions: Vec::new(),
        error: None,
        created_at: None,
        updated_at: None,
    }
}

pub fn completed_job(id: &str, functions: &[(&str, &str)]) -> Job {
    let mut job = job(id, JobStatus::Completed);
    job.total_functions = functions.len() as u32;
    job.processed_functions = functions.len() as u32;
    job.functions = functions
        .iter()
        .map(|(name, mermaid)| FunctionResult {
            name: name.to_string(),
            mermaid: mermaid.to_string(),
            validated: true,
            error: None,
        })
        .collect();
    job
}

pub fn summary(id: &str, status: JobStatus) -> JobSummary {
    JobSummary {
        id: id.to_string(),
        status,
        total_functions: 0,
        processed_functions: 0,
        created_at: None,
        updated_at: None,
    }
}

/// Drains everything currently queued on a poller channel.
pub fn drain<T>(rx: &mut tokio::sync::mpsc::UnboundedReceiver<PollEvent<T>>) -> Vec<PollEvent<T>> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn statuses(events: &[PollEvent<Job>]) -> Vec<JobStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            PollEvent::Snapshot(job) => Some(job.status),
            PollEvent::Error(_) => None,
        })
        .collect()
}

/// Engine whose latency and outcome depend on the description, and which
/// records every description it is asked to draw.
pub struct ScriptedEngine {
    delays: Vec<(String, Duration)>,
    pub seen: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new(delays: &[(&str, Duration)]) -> Arc<Self> {
        Arc::new(Self {
            delays: delays
                .iter()
                .map(|(d, delay)| (d.to_string(), *delay))
                .collect(),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls_for(&self, description: &str) -> usize {
        self.seen.lock().iter().filter(|d| *d == description).count()
    }
}

#[async_trait]
impl DiagramEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn render(&self, token: &RenderToken, description: &str) -> Result<Artifact, RenderError> {
        self.seen.lock().push(description.to_string());
        let delay = self
            .delays
            .iter()
            .find(|(d, _)| d == description)
            .map(|(_, delay)| *delay)
            .unwrap_or(Duration::ZERO);
        tokio::time::sleep(delay).await;

        if description.contains("bad") {
            return Err(RenderError::Syntax {
                line: 1,
                message: format!("cannot draw {}", description),
            });
        }
        Ok(Artifact {
            token: token.clone(),
            svg: format!("<svg>{}</svg>", description),
        })
    }
}

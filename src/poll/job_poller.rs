// ABOUTME: Poller that follows a single job until it reaches a terminal status
// ABOUTME: Fetches immediately, then on an interval while the last observed status is active

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use super::driver::{Fetch, PollDriver, PollPolicy, Trigger};
use super::sink::SnapshotSink;
use crate::remote::{Job, JobApi, JobStatus};

pub const DEFAULT_JOB_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Interval and active-status predicate, injectable so other transports or
/// services with a different status vocabulary can reuse the poller.
#[derive(Debug, Clone, Copy)]
pub struct JobPollSettings {
    pub interval: Duration,
    pub is_active: fn(JobStatus) -> bool,
}

impl Default for JobPollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_JOB_POLL_INTERVAL,
            is_active: |status| status.is_active(),
        }
    }
}

impl JobPollSettings {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }
}

struct ActiveStatusPolicy {
    is_active: fn(JobStatus) -> bool,
}

impl PollPolicy<Job> for ActiveStatusPolicy {
    fn keep_polling(&self, job: &Job) -> bool {
        (self.is_active)(job.status)
    }

    fn observe(&self, previous: Option<&Job>, next: &Job) {
        if next.processed_functions > next.total_functions {
            tracing::warn!(
                job_id = %next.id,
                processed = next.processed_functions,
                total = next.total_functions,
                "Job reports more processed functions than total"
            );
        }
        let Some(previous) = previous else {
            return;
        };
        if previous.status != next.status {
            tracing::info!(job_id = %next.id, from = %previous.status, to = %next.status, "Job status changed");
        }
        if !next.status.follows(previous.status) {
            // The service is authoritative; keep its answer but leave a trace.
            tracing::warn!(job_id = %next.id, from = %previous.status, to = %next.status, "Job status moved backwards");
        }
    }
}

/// Keeps the freshest known snapshot of one job.
///
/// Dropping the poller stops it.
pub struct JobPoller {
    job_id: String,
    driver: Arc<PollDriver<Job>>,
}

impl JobPoller {
    /// Begins polling `job_id` right away. Must be called inside a tokio runtime.
    pub fn start(
        api: Arc<dyn JobApi>,
        job_id: impl Into<String>,
        settings: JobPollSettings,
        sink: Arc<dyn SnapshotSink<Job>>,
    ) -> Self {
        let job_id = job_id.into();
        let fetch: Fetch<Job> = {
            let job_id = job_id.clone();
            Box::new(move || {
                let api = Arc::clone(&api);
                let job_id = job_id.clone();
                async move { api.get_job(&job_id).await }.boxed()
            })
        };
        let policy = Box::new(ActiveStatusPolicy {
            is_active: settings.is_active,
        });

        let driver = PollDriver::new("job", job_id.clone(), fetch, policy, sink);
        driver.start(settings.interval);
        Self { job_id, driver }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// User-initiated fetch outside the timer. Skipped (returns `false`) if a
    /// fetch is already in flight or the poller is stopped.
    pub fn refresh(&self) -> bool {
        self.driver.trigger(Trigger::Refresh)
    }

    pub fn stop(&self) {
        self.driver.stop()
    }

    pub fn is_stopped(&self) -> bool {
        self.driver.is_stopped()
    }

    /// `false` once stopped or once a terminal snapshot was delivered.
    pub fn is_polling(&self) -> bool {
        self.driver.is_polling()
    }

    /// The last successfully fetched snapshot; failures never clear it.
    pub fn latest(&self) -> Option<Arc<Job>> {
        self.driver.latest()
    }

    pub fn fetches_issued(&self) -> u64 {
        self.driver.fetches_issued()
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        self.driver.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    use parking_lot::Mutex;
    use tracing::Level;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    struct BufferWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> MakeWriter<'a> for SharedBuffer {
        type Writer = BufferWriter;

        fn make_writer(&'a self) -> Self::Writer {
            BufferWriter(Arc::clone(&self.0))
        }
    }

    impl io::Write for BufferWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn job(status: JobStatus, processed: u32, total: u32) -> Job {
        Job {
            id: "job-w".to_string(),
            status,
            code: String::new(),
            total_functions: total,
            processed_functions: processed,
            functions: Vec::new(),
            error: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn observe_logs(previous: Option<&Job>, next: &Job) -> String {
        let buffer = SharedBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_ansi(false)
            .with_max_level(Level::INFO)
            .finish();
        let policy = ActiveStatusPolicy {
            is_active: |status| status.is_active(),
        };
        tracing::subscriber::with_default(subscriber, || policy.observe(previous, next));
        let bytes = buffer.0.lock().clone();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[test]
    fn test_backward_status_is_logged() {
        let previous = job(JobStatus::Validating, 2, 2);
        let logs = observe_logs(Some(&previous), &job(JobStatus::Processing, 2, 2));
        assert!(logs.contains("Job status moved backwards"), "{logs}");
        assert!(logs.contains("Job status changed"), "{logs}");
    }

    #[test]
    fn test_processed_above_total_is_logged() {
        let logs = observe_logs(None, &job(JobStatus::Processing, 3, 2));
        assert!(logs.contains("more processed functions than total"), "{logs}");
    }

    #[test]
    fn test_forward_move_is_not_a_warning() {
        let previous = job(JobStatus::Processing, 1, 2);
        let logs = observe_logs(Some(&previous), &job(JobStatus::Validating, 2, 2));
        assert!(logs.contains("Job status changed"), "{logs}");
        assert!(!logs.contains("WARN"), "{logs}");
    }
}

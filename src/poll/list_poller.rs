// ABOUTME: Poller over the whole job collection
// ABOUTME: Refreshes unconditionally on a fixed interval until stopped

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use super::driver::{Fetch, PollDriver, PollPolicy, Trigger};
use super::sink::SnapshotSink;
use crate::remote::{JobApi, JobSummary};

pub const DEFAULT_LIST_POLL_INTERVAL: Duration = Duration::from_millis(4000);

/// New jobs can appear at any time, so the collection never settles.
struct Unconditional;

impl PollPolicy<Vec<JobSummary>> for Unconditional {
    fn keep_polling(&self, _jobs: &Vec<JobSummary>) -> bool {
        true
    }
}

pub struct JobListPoller {
    driver: Arc<PollDriver<Vec<JobSummary>>>,
}

impl JobListPoller {
    pub fn start(
        api: Arc<dyn JobApi>,
        interval: Duration,
        sink: Arc<dyn SnapshotSink<Vec<JobSummary>>>,
    ) -> Self {
        let fetch: Fetch<Vec<JobSummary>> = Box::new(move || {
            let api = Arc::clone(&api);
            async move { api.list_jobs().await }.boxed()
        });

        let driver = PollDriver::new(
            "job_list",
            "jobs".to_string(),
            fetch,
            Box::new(Unconditional),
            sink,
        );
        driver.start(interval);
        Self { driver }
    }

    pub fn refresh(&self) -> bool {
        self.driver.trigger(Trigger::Refresh)
    }

    pub fn stop(&self) {
        self.driver.stop()
    }

    pub fn is_stopped(&self) -> bool {
        self.driver.is_stopped()
    }

    pub fn latest(&self) -> Option<Arc<Vec<JobSummary>>> {
        self.driver.latest()
    }

    pub fn fetches_issued(&self) -> u64 {
        self.driver.fetches_issued()
    }
}

impl Drop for JobListPoller {
    fn drop(&mut self) {
        self.driver.stop();
    }
}

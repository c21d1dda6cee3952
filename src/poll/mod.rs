// ABOUTME: Pull-based observation of remote jobs
// ABOUTME: Single-job and job-list pollers built on one shared polling loop

pub mod cancel;
mod driver;
pub mod job_poller;
pub mod list_poller;
pub mod sink;

pub use cancel::CancelToken;
pub use driver::MIN_POLL_INTERVAL;
pub use job_poller::{JobPollSettings, JobPoller, DEFAULT_JOB_POLL_INTERVAL};
pub use list_poller::{JobListPoller, DEFAULT_LIST_POLL_INTERVAL};
pub use sink::{channel, sink_fn, FnSink, PollEvent, SnapshotSink};

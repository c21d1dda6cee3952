mod support;

use std::sync::Arc;
use std::time::Duration;

use flowchart_client::poll::{
    self, JobListPoller, PollEvent, DEFAULT_LIST_POLL_INTERVAL, MIN_POLL_INTERVAL,
};
use flowchart_client::remote::{JobStatus, JobSummary};

use support::{drain, summary, ScriptedApi, Step};

#[tokio::test(start_paused = true)]
async fn test_polls_unconditionally_on_interval() {
    let api = ScriptedApi::lists(vec![
        Step::ok(vec![summary("job-1", JobStatus::Completed)]),
        Step::ok(vec![
            summary("job-1", JobStatus::Completed),
            summary("job-2", JobStatus::Failed),
        ]),
    ]);
    let (tx, mut rx) = poll::channel::<Vec<JobSummary>>();
    let poller = JobListPoller::start(api.clone(), DEFAULT_LIST_POLL_INTERVAL, Arc::new(tx));

    tokio::time::sleep(Duration::from_millis(12_500)).await;
    // t = 0, 4s, 8s, 12s; terminal jobs in the list do not stop it.
    assert_eq!(api.list_fetches(), 4);
    let events = drain(&mut rx);
    assert_eq!(events.len(), 4);
    assert_eq!(poller.latest().unwrap().len(), 2);
    poller.stop();
}

#[tokio::test(start_paused = true)]
async fn test_errors_do_not_stop_list_polling() {
    let api = ScriptedApi::lists(vec![
        Step::server(500),
        Step::ok(Vec::new()),
    ]);
    let (tx, mut rx) = poll::channel::<Vec<JobSummary>>();
    let poller = JobListPoller::start(api.clone(), DEFAULT_LIST_POLL_INTERVAL, Arc::new(tx));

    tokio::time::sleep(Duration::from_millis(4_100)).await;
    let events = drain(&mut rx);
    assert_eq!(events[0], PollEvent::Error("HTTP 500".to_string()));
    assert!(matches!(&events[1], PollEvent::Snapshot(jobs) if jobs.is_empty()));
    assert!(!poller.is_stopped());
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight_list() {
    let api = ScriptedApi::lists(vec![Step::ok(vec![summary("job-1", JobStatus::Queued)])
        .after(Duration::from_millis(3000))]);
    let (tx, mut rx) = poll::channel::<Vec<JobSummary>>();
    let poller = JobListPoller::start(api.clone(), DEFAULT_LIST_POLL_INTERVAL, Arc::new(tx));

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(!poller.refresh());
    poller.stop();
    poller.stop();

    tokio::time::sleep(Duration::from_millis(20_000)).await;
    assert!(drain(&mut rx).is_empty());
    assert_eq!(api.list_fetches(), 1);
    assert_eq!(api.peak_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_between_ticks() {
    let api = ScriptedApi::lists(vec![Step::ok(Vec::new())]);
    let (tx, mut rx) = poll::channel::<Vec<JobSummary>>();
    let poller = JobListPoller::start(api.clone(), DEFAULT_LIST_POLL_INTERVAL, Arc::new(tx));

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(poller.refresh());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(api.list_fetches(), 2);
    assert_eq!(drain(&mut rx).len(), 2);
    assert_eq!(poller.fetches_issued(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_polls_at_the_minimum() {
    let api = ScriptedApi::lists(vec![Step::ok(Vec::new())]);
    let (tx, mut rx) = poll::channel::<Vec<JobSummary>>();
    let poller = JobListPoller::start(api.clone(), Duration::ZERO, Arc::new(tx));

    tokio::time::sleep(MIN_POLL_INTERVAL * 2 + Duration::from_millis(50)).await;
    assert_eq!(api.list_fetches(), 3);
    assert_eq!(drain(&mut rx).len(), 3);
    assert!(!poller.is_stopped());
}

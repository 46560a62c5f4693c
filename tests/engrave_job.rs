// Integration tests for the execution engine

use std::sync::atomic::Ordering;
use std::time::Duration;

use futures_util::StreamExt;
use laser_engraver::communication::mock::MockTransport;
use laser_engraver::engrave_job::*;
use laser_engraver::{MotionScript, Point, ScriptError};

fn fast_options(multiplier: u32) -> RunOptions {
    RunOptions {
        multiplier,
        simulated_delay: Duration::from_millis(1),
        ack_timeout: Duration::from_millis(50),
    }
}

fn simulated(script: MotionScript) -> EngraveJob {
    EngraveJob::start(script, fast_options(1), DeviceTarget::Simulated).unwrap()
}

fn with_mock(mock: MockTransport, script: MotionScript, multiplier: u32) -> EngraveJob {
    EngraveJob::start_with_transport(script, fast_options(multiplier), Box::new(mock)).unwrap()
}

fn square_script() -> MotionScript {
    MotionScript::from(["x0 y0", "x4 y0", "x4 y4", "x0 y4"])
}

#[tokio::test]
async fn test_simulated_run_reports_every_line_in_order() {
    let mut job = simulated(square_script());
    let summary = job.wait().await.unwrap();
    assert_eq!(
        summary,
        RunSummary { outcome: RunOutcome::Completed, lines_processed: 4, failures: 0 }
    );
    assert_eq!(job.state(), JobState::Completed);

    let events = job.drain_progress();
    assert_eq!(events.iter().map(|e| e.line).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert_eq!(
        events.iter().map(|e| e.percent_complete).collect::<Vec<_>>(),
        vec![25.0, 50.0, 75.0, 100.0]
    );
    assert!(events.iter().all(|e| e.ok));
    assert_eq!(events[2].point, Point::new(4, 4));
}

#[tokio::test]
async fn test_progress_points_are_unscaled() {
    let mock = MockTransport::new().acks(2);
    let written = mock.written();
    let script = MotionScript::from(["x10", "y7"]);
    let mut job = with_mock(mock, script, 3);
    job.wait().await.unwrap();

    let events = job.drain_progress();
    assert_eq!(events[0].point, Point::new(10, 0));
    assert_eq!(events[1].point, Point::new(10, 7));
    // The device itself sees scaled values: 30 = 0x01e, 21 = 0x015.
    assert_eq!(written.lock().unwrap().as_slice(), b"x01ey000x01ey015");
}

#[tokio::test]
async fn test_blank_line_ends_the_run() {
    let script = MotionScript::from(["x1 y1", "", "x2 y2"]);
    let mut job = EngraveJob::start(script, fast_options(1), DeviceTarget::Simulated).unwrap();
    let summary = job.wait().await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.lines_processed, 1);
    let events = job.drain_progress();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].point, Point::new(1, 1));
}

#[tokio::test]
async fn test_transmission_failure_does_not_stop_the_run() {
    let mock = MockTransport::new()
        .reply(b"OK\r\n")
        .reply(b"ERR\r\n")
        .silent()
        .reply(b"OK\r\n");
    let mut job = with_mock(mock, square_script(), 1);
    let summary = job.wait().await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.failures, 2);

    let events = job.drain_progress();
    assert_eq!(events.iter().map(|e| e.ok).collect::<Vec<_>>(), vec![true, false, false, true]);
    assert_eq!(events.iter().map(|e| e.line).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_cancel_stops_at_line_boundary() {
    let script = MotionScript::from(["x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8"]);
    let options = RunOptions {
        simulated_delay: Duration::from_millis(20),
        ..fast_options(1)
    };
    let mut job = EngraveJob::start(script, options, DeviceTarget::Simulated).unwrap();
    assert!(job.cancel());

    let summary = job.wait().await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::Cancelled);
    assert_eq!(job.state(), JobState::Cancelled);
    // The line in flight still completes and reports.
    assert_eq!(summary.lines_processed, 1);
    assert_eq!(job.drain_progress().len(), 1);
    assert!(!job.cancel());
}

#[tokio::test]
async fn test_connection_released_on_every_exit() {
    let completed = MockTransport::new().acks(4);
    let released = completed.released();
    let mut job = with_mock(completed, square_script(), 1);
    job.wait().await.unwrap();
    assert!(released.load(Ordering::SeqCst));

    let failing = MockTransport::new().acks(4);
    let released = failing.released();
    let script = MotionScript::from(["x1", "x99999"]);
    let mut job = with_mock(failing, script, 1);
    assert!(job.wait().await.is_err());
    assert!(released.load(Ordering::SeqCst));

    let stalled = MockTransport::new();
    let released = stalled.released();
    let options = RunOptions { ack_timeout: Duration::from_secs(5), ..fast_options(1) };
    let job =
        EngraveJob::start_with_transport(square_script(), options, Box::new(stalled)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(job);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_script_error_aborts_run() {
    let script = MotionScript::from(["x1 y1", "x2 yy", "x3 y3"]);
    let mut job = EngraveJob::start(script, fast_options(1), DeviceTarget::Simulated).unwrap();
    let err = job.wait().await.unwrap_err();
    assert!(matches!(
        err,
        JobError::Script(ScriptError::Parse { line: 2, ref token }) if token == "yy"
    ));
    assert!(matches!(job.state(), JobState::Failed(_)));
    assert_eq!(job.drain_progress().len(), 1);
}

#[tokio::test]
async fn test_connection_error_is_reported_before_running() {
    let target = DeviceTarget::serial("/dev/nonexistent-engraver-port");
    let err = EngraveJob::start(square_script(), fast_options(1), target).unwrap_err();
    assert!(matches!(
        err,
        JobError::Connection { ref port, .. } if port == "/dev/nonexistent-engraver-port"
    ));
}

#[tokio::test]
async fn test_zero_multiplier_rejected() {
    let err =
        EngraveJob::start(square_script(), fast_options(0), DeviceTarget::Simulated).unwrap_err();
    assert!(matches!(err, JobError::InvalidMultiplier));
}

#[tokio::test]
async fn test_empty_script_completes_without_events() {
    let mut job = simulated(MotionScript::new());
    let summary = job.wait().await.unwrap();
    assert_eq!(summary.lines_processed, 0);
    assert!(job.next_progress().await.is_none());
}

#[tokio::test]
async fn test_progress_stream_and_bounded_wait() {
    let mut job = simulated(square_script());
    let first = job.next_progress_timeout(Duration::from_secs(1)).await.unwrap();
    assert_eq!(first.line, 1);
    let rest: Vec<ProgressEvent> = job.progress_stream().collect().await;
    assert_eq!(rest.iter().map(|e| e.line).collect::<Vec<_>>(), vec![2, 3, 4]);
    assert!(job.next_progress_timeout(Duration::from_millis(10)).await.is_none());
    assert!(job.try_next_progress().is_none());
}

#[tokio::test]
async fn test_controller_allows_one_job() {
    let mut controller = JobController::new();
    assert_eq!(controller.state(), JobState::Idle);
    assert!(matches!(controller.cancel_current(), Err(JobError::NoJob)));

    let options = RunOptions { simulated_delay: Duration::from_millis(50), ..fast_options(1) };
    controller.start(square_script(), options.clone(), DeviceTarget::Simulated).unwrap();
    assert_eq!(controller.state(), JobState::Running);
    assert!(matches!(
        controller.start(square_script(), options.clone(), DeviceTarget::Simulated),
        Err(JobError::AlreadyRunning)
    ));

    controller.cancel_current().unwrap();
    let summary = controller.current_mut().unwrap().wait().await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::Cancelled);
    assert!(matches!(controller.cancel_current(), Err(JobError::InvalidTransition(_))));

    // A finished job can be replaced.
    let mock = MockTransport::new().acks(4);
    controller.start_with_transport(square_script(), fast_options(1), Box::new(mock)).unwrap();
    let summary = controller.current_mut().unwrap().wait().await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert!(controller.take().is_some());
    assert_eq!(controller.state(), JobState::Idle);
}

#[test]
fn test_port_id_zero_means_simulated() {
    assert_eq!(DeviceTarget::from_port_id("0", 9600), DeviceTarget::Simulated);
    assert_eq!(
        DeviceTarget::from_port_id("/dev/ttyUSB0", 9600),
        DeviceTarget::Serial { port: "/dev/ttyUSB0".to_string(), baud: 9600 }
    );
}

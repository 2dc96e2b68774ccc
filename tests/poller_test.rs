use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fleetmon::channel::HostChannel;
use fleetmon::host::HostSpec;
use fleetmon::poller::{
    wait_command, wait_until, wait_until_or_quit, CheckReport, CommandExpect, PollOptions,
    WaitOutcome,
};

#[tokio::test]
async fn succeeds_as_soon_as_the_check_passes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let outcome = wait_until(
        move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 >= 3 {
                    CheckReport::ok("ready")
                } else {
                    CheckReport::pending(1)
                }
            }
        },
        PollOptions::default().interval(Duration::from_millis(10)),
    )
    .await;

    assert!(outcome.is_satisfied());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.status(), 0);
}

#[tokio::test]
async fn quit_function_short_circuits_the_wait() {
    let started = Instant::now();
    let checks = Arc::new(AtomicUsize::new(0));
    let check_counter = Arc::clone(&checks);
    let quit_counter = Arc::clone(&checks);

    // The check never succeeds; the quit function fires after 3 attempts.
    let outcome: WaitOutcome<()> = wait_until_or_quit(
        move || {
            let counter = Arc::clone(&check_counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                CheckReport::pending(5)
            }
        },
        move || {
            let counter = Arc::clone(&quit_counter);
            async move {
                if counter.load(Ordering::SeqCst) >= 3 {
                    1
                } else {
                    0
                }
            }
        },
        PollOptions::default()
            .timeout(Some(Duration::from_secs(60)))
            .interval(Duration::from_millis(20)),
    )
    .await;

    match &outcome {
        WaitOutcome::QuitRequested(report) => assert_eq!(report.status, 5),
        other => panic!("expected QuitRequested, got {other:?}"),
    }
    // Returned promptly instead of burning the 60s budget.
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_ne!(outcome.status(), 0);
}

#[tokio::test]
async fn timeout_is_reported_as_such() {
    let outcome: WaitOutcome<()> = wait_until(
        || async { CheckReport::pending(2) },
        PollOptions::default()
            .timeout(Some(Duration::from_millis(50)))
            .interval(Duration::from_millis(10)),
    )
    .await;
    assert!(matches!(outcome, WaitOutcome::TimedOut(Some(_))));
    assert_eq!(outcome.status(), 2);
}

#[tokio::test]
async fn zero_interval_busy_polls() {
    let started = Instant::now();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let outcome = wait_until(
        move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 >= 50 {
                    CheckReport::ok(())
                } else {
                    CheckReport::pending(1)
                }
            }
        },
        PollOptions::default().interval(Duration::ZERO),
    )
    .await;

    assert!(outcome.is_satisfied());
    assert_eq!(calls.load(Ordering::SeqCst), 50);
    // 50 iterations without sleeping take nowhere near a second.
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn wait_command_polls_until_the_condition_holds() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("collector-ready");

    let channel = HostChannel::new(HostSpec::parse("localhost", None).unwrap(), true);

    let marker_for_writer = marker.clone();
    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        tokio::fs::write(&marker_for_writer, b"ok").await.unwrap();
    });

    let command = format!("test -f {}", marker.display());
    let outcome = wait_command(
        &channel,
        &command,
        &CommandExpect::success(),
        PollOptions::default()
            .timeout(Some(Duration::from_secs(30)))
            .interval(Duration::from_millis(50)),
    )
    .await;

    writer.await.unwrap();
    assert!(outcome.is_satisfied());
    let report = outcome.last_report().unwrap();
    assert_eq!(
        report.payload.as_ref().and_then(|r| r.exit_status),
        Some(0)
    );
}

#[tokio::test]
async fn wait_command_times_out_when_the_condition_never_holds() {
    let channel = HostChannel::new(HostSpec::parse("localhost", None).unwrap(), true);
    let outcome = wait_command(
        &channel,
        "false",
        &CommandExpect::success(),
        PollOptions::default()
            .timeout(Some(Duration::from_millis(300)))
            .interval(Duration::from_millis(50)),
    )
    .await;
    assert!(!outcome.is_satisfied());
    assert!(matches!(outcome, WaitOutcome::TimedOut(Some(_))));
}

use std::time::{Duration, Instant};

use fleetmon::runner::{run, RunRequest};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn captures_stdout_round_trip() {
    let result = run(RunRequest::new("printf 'hello fleet'")).await;
    assert_eq!(result.exit_status, Some(0));
    assert_eq!(result.stdout, "hello fleet");
    assert!(result.stderr.is_empty());
    assert!(!result.timed_out);
}

#[tokio::test]
async fn stdout_and_stderr_are_captured_separately() {
    let result = run(RunRequest::new("echo out; echo err >&2")).await;
    assert_eq!(result.exit_status, Some(0));
    assert_eq!(result.stdout, "out\n");
    assert_eq!(result.stderr, "err\n");
}

#[tokio::test]
async fn large_output_is_gapless() {
    // Two pipe buffers' worth, so the capture spans many read iterations.
    let result = run(RunRequest::new("seq 1 20000")).await;
    assert_eq!(result.exit_status, Some(0));
    let lines: Vec<&str> = result.stdout.lines().collect();
    assert_eq!(lines.len(), 20000);
    assert_eq!(lines[0], "1");
    assert_eq!(lines[19999], "20000");
}

#[tokio::test]
async fn reports_nonzero_exit() {
    let result = run(RunRequest::new("exit 3")).await;
    assert_eq!(result.exit_status, Some(3));
    assert!(!result.timed_out);
}

#[tokio::test]
async fn missing_binary_is_a_result_not_a_panic() {
    let result = run(RunRequest::new("/no/such/binary-anywhere")).await;
    assert_ne!(result.exit_status, Some(0));
    assert!(!result.timed_out);
}

#[tokio::test]
async fn timeout_kills_the_command() {
    let started = Instant::now();
    let result = run(RunRequest::new("sleep 30").timeout(Duration::from_millis(200))).await;
    assert!(result.timed_out);
    assert_ne!(result.exit_status, Some(0));
    // Well under the sleep's 30s; the command did not run to completion.
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn timeout_escalates_past_a_term_ignoring_command() {
    let started = Instant::now();
    let result = run(
        RunRequest::new("trap '' TERM; sleep 30").timeout(Duration::from_millis(200)),
    )
    .await;
    assert!(result.timed_out);
    // SIGTERM is ignored, so only the SIGKILL escalation can end this.
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn quit_token_stops_early_without_the_timeout_flag() {
    let token = CancellationToken::new();
    let handle = tokio::spawn(run(RunRequest::new("sleep 30").quit(token.clone())));

    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    let result = handle.await.unwrap();
    assert!(!result.timed_out);
    assert_ne!(result.exit_status, Some(0));
    assert!(result.duration < Duration::from_secs(10));
}

#[tokio::test]
async fn stdin_reaches_the_command() {
    let result = run(RunRequest::new("wc -c").stdin(vec![b'x'; 2048])).await;
    assert_eq!(result.exit_status, Some(0));
    assert_eq!(result.stdout.trim(), "2048");
}

#[tokio::test]
async fn sink_receives_streamed_output() {
    let (writer, mut reader) = tokio::io::duplex(64 * 1024);
    let result = run(
        RunRequest::new("printf 'streamed'")
            .stdout_sink(Box::new(writer))
            .capture(false, true),
    )
    .await;
    assert_eq!(result.exit_status, Some(0));
    // Capture was disabled for stdout; the bytes went to the sink instead.
    assert!(result.stdout.is_empty());

    let mut collected = Vec::new();
    reader.read_to_end(&mut collected).await.unwrap();
    assert_eq!(collected, b"streamed");
}

#[tokio::test]
async fn duration_is_recorded() {
    let result = run(RunRequest::new("sleep 0.2")).await;
    assert_eq!(result.exit_status, Some(0));
    assert!(result.duration >= Duration::from_millis(150));
}

use fleetmon::channel::{escape_remote, ChannelRunOptions, HostChannel};
use fleetmon::host::HostSpec;
use fleetmon::runner::{run, RunRequest};

#[tokio::test]
async fn escaped_command_survives_a_shell_round_trip() {
    let original = r#"tricky "quoted" $VAR \back\slash `tick`"#;
    let escaped = escape_remote(original);
    // The remote side sees the escaped text inside double quotes; a local
    // shell applying the same quoting rules must recover the original bytes.
    let result = run(RunRequest::new(format!("printf %s \"{escaped}\""))).await;
    assert_eq!(result.exit_status, Some(0));
    assert_eq!(result.stdout, original);
}

#[tokio::test]
async fn escaped_dollar_is_not_expanded() {
    let escaped = escape_remote("$HOME");
    let result = run(RunRequest::new(format!("printf %s \"{escaped}\""))).await;
    assert_eq!(result.stdout, "$HOME");
}

#[tokio::test]
async fn local_fast_path_round_trip() {
    let host = HostSpec::parse("localhost", None).unwrap();
    let channel = HostChannel::new(host, true);
    let result = channel
        .run("printf 'from the local path'", ChannelRunOptions::new())
        .await;
    assert_eq!(result.exit_status, Some(0));
    assert_eq!(result.stdout, "from the local path");
    assert!(!result.timed_out);
}

#[tokio::test]
async fn local_fast_path_reports_failures_like_the_wrapped_path() {
    let host = HostSpec::parse("localhost", None).unwrap();
    let channel = HostChannel::new(host, true);
    let result = channel
        .run("echo oops >&2; exit 7", ChannelRunOptions::new())
        .await;
    assert_eq!(result.exit_status, Some(7));
    assert_eq!(result.stderr, "oops\n");
}

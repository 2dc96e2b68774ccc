// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Generic bounded-retry polling: repeat a check until it reports success,
//! a quit function fires, or a timeout elapses.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::channel::{ChannelRunOptions, HostChannel};
use crate::runner::CommandResult;

/// One observation from a check function. Status `0` means the condition
/// holds; any other value means "not yet". The payload carries whatever the
/// check produced alongside the status.
#[derive(Debug, Clone)]
pub struct CheckReport<T> {
    pub status: i32,
    pub payload: Option<T>,
}

impl<T> CheckReport<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            status: 0,
            payload: Some(payload),
        }
    }

    pub fn pending(status: i32) -> Self {
        Self {
            status,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: T) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn satisfied(&self) -> bool {
        self.status == 0
    }
}

/// Why a wait returned. Every variant carries the last observed report so
/// callers can inspect what the final check saw.
#[derive(Debug)]
pub enum WaitOutcome<T> {
    Satisfied(CheckReport<T>),
    QuitRequested(CheckReport<T>),
    TimedOut(Option<CheckReport<T>>),
}

impl<T> WaitOutcome<T> {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, WaitOutcome::Satisfied(_))
    }

    pub fn last_report(&self) -> Option<&CheckReport<T>> {
        match self {
            WaitOutcome::Satisfied(report) | WaitOutcome::QuitRequested(report) => Some(report),
            WaitOutcome::TimedOut(report) => report.as_ref(),
        }
    }

    /// Collapse to a plain status: `0` on success, the last observed status
    /// otherwise, `-1` when nothing was ever observed.
    pub fn status(&self) -> i32 {
        match self {
            WaitOutcome::Satisfied(_) => 0,
            WaitOutcome::QuitRequested(report) => report.status,
            WaitOutcome::TimedOut(report) => report.as_ref().map(|r| r.status).unwrap_or(-1),
        }
    }
}

/// Retry bounds for one wait.
#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    /// `None` waits forever.
    pub timeout: Option<Duration>,
    /// Pause between checks. Zero busy-polls; it is never substituted.
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(90)),
            interval: Duration::from_secs(1),
        }
    }
}

impl PollOptions {
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Poll `check` until it reports status `0` or the timeout elapses.
pub async fn wait_until<T, C, Fut>(check: C, opts: PollOptions) -> WaitOutcome<T>
where
    C: FnMut() -> Fut,
    Fut: Future<Output = CheckReport<T>>,
{
    wait_inner(check, None::<fn() -> std::future::Ready<i32>>, opts).await
}

/// Like [`wait_until`], but additionally invokes `quit` after every failed
/// check; a nonzero return aborts the wait immediately. This is the escape
/// hatch for conditions that can no longer come true (e.g. the service being
/// waited on has died).
pub async fn wait_until_or_quit<T, C, Fut, Q, QFut>(
    check: C,
    quit: Q,
    opts: PollOptions,
) -> WaitOutcome<T>
where
    C: FnMut() -> Fut,
    Fut: Future<Output = CheckReport<T>>,
    Q: FnMut() -> QFut,
    QFut: Future<Output = i32>,
{
    wait_inner(check, Some(quit), opts).await
}

async fn wait_inner<T, C, Fut, Q, QFut>(
    mut check: C,
    mut quit: Option<Q>,
    opts: PollOptions,
) -> WaitOutcome<T>
where
    C: FnMut() -> Fut,
    Fut: Future<Output = CheckReport<T>>,
    Q: FnMut() -> QFut,
    QFut: Future<Output = i32>,
{
    let started = Instant::now();
    let mut last: Option<CheckReport<T>> = None;

    loop {
        let report = check().await;
        if report.satisfied() {
            return WaitOutcome::Satisfied(report);
        }
        if let Some(quit) = quit.as_mut() {
            if quit().await != 0 {
                return WaitOutcome::QuitRequested(report);
            }
        }
        last = Some(report);

        if let Some(limit) = opts.timeout {
            if started.elapsed() >= limit {
                tracing::debug!(
                    waited_secs = started.elapsed().as_secs(),
                    "condition did not hold before the deadline"
                );
                return WaitOutcome::TimedOut(last);
            }
        }
        if !opts.interval.is_zero() {
            tokio::time::sleep(opts.interval).await;
        }
    }
}

/// Declarative conditions over a [`CommandResult`], combined with AND
/// semantics: every field that is set must hold.
#[derive(Debug, Clone, Default)]
pub struct CommandExpect {
    pub exit_status_is: Option<i32>,
    pub exit_status_is_not: Option<i32>,
    pub stdout_is: Option<String>,
    pub stdout_contains: Option<String>,
    pub stdout_lacks: Option<String>,
    pub stderr_is: Option<String>,
    pub stderr_contains: Option<String>,
    pub stderr_lacks: Option<String>,
}

impl CommandExpect {
    /// Expect a clean zero exit.
    pub fn success() -> Self {
        Self {
            exit_status_is: Some(0),
            ..Default::default()
        }
    }

    pub fn exit_status(mut self, status: i32) -> Self {
        self.exit_status_is = Some(status);
        self
    }

    pub fn stdout_contains(mut self, needle: impl Into<String>) -> Self {
        self.stdout_contains = Some(needle.into());
        self
    }

    pub fn matches(&self, result: &CommandResult) -> bool {
        if let Some(expected) = self.exit_status_is {
            if result.exit_status != Some(expected) {
                return false;
            }
        }
        if let Some(differs) = self.exit_status_is_not {
            if result.exit_status == Some(differs) {
                return false;
            }
        }
        if let Some(expected) = &self.stdout_is {
            if &result.stdout != expected {
                return false;
            }
        }
        if let Some(needle) = &self.stdout_contains {
            if !result.stdout.contains(needle) {
                return false;
            }
        }
        if let Some(needle) = &self.stdout_lacks {
            if result.stdout.contains(needle) {
                return false;
            }
        }
        if let Some(expected) = &self.stderr_is {
            if &result.stderr != expected {
                return false;
            }
        }
        if let Some(needle) = &self.stderr_contains {
            if !result.stderr.contains(needle) {
                return false;
            }
        }
        if let Some(needle) = &self.stderr_lacks {
            if result.stderr.contains(needle) {
                return false;
            }
        }
        true
    }
}

/// Repeatedly run one channel command until its result matches `expect`.
/// The last [`CommandResult`] rides along in the outcome's payload.
pub async fn wait_command(
    channel: &HostChannel,
    command: &str,
    expect: &CommandExpect,
    opts: PollOptions,
) -> WaitOutcome<CommandResult> {
    wait_until(
        move || async move {
            let result = channel.run(command, ChannelRunOptions::new()).await;
            if expect.matches(&result) {
                CheckReport::ok(result)
            } else {
                let status = match result.exit_status {
                    Some(0) | None => 1,
                    Some(code) => code,
                };
                CheckReport::pending(status).with_payload(result)
            }
        },
        opts,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result_with(exit: Option<i32>, stdout: &str, stderr: &str) -> CommandResult {
        CommandResult {
            exit_status: exit,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration: Duration::from_millis(5),
            timed_out: false,
        }
    }

    #[test]
    fn expect_success_matches_zero_exit_only() {
        let expect = CommandExpect::success();
        assert!(expect.matches(&result_with(Some(0), "", "")));
        assert!(!expect.matches(&result_with(Some(2), "", "")));
        assert!(!expect.matches(&result_with(None, "", "")));
    }

    #[test]
    fn expect_combines_conditions_with_and() {
        let expect = CommandExpect::success().stdout_contains("active");
        assert!(expect.matches(&result_with(Some(0), "active (running)", "")));
        assert!(!expect.matches(&result_with(Some(0), "inactive", "")));
        assert!(!expect.matches(&result_with(Some(3), "active (running)", "")));
    }

    #[test]
    fn expect_negative_conditions() {
        let expect = CommandExpect {
            exit_status_is_not: Some(0),
            stderr_lacks: Some("permission denied".to_string()),
            ..Default::default()
        };
        assert!(expect.matches(&result_with(Some(1), "", "no such unit")));
        assert!(!expect.matches(&result_with(Some(0), "", "")));
        assert!(!expect.matches(&result_with(Some(1), "", "permission denied")));
    }

    #[tokio::test]
    async fn satisfied_returns_immediately_with_payload() {
        let outcome = wait_until(
            || async { CheckReport::ok(42u32) },
            PollOptions::default(),
        )
        .await;
        assert!(outcome.is_satisfied());
        assert_eq!(outcome.last_report().and_then(|r| r.payload), Some(42));
        assert_eq!(outcome.status(), 0);
    }

    #[tokio::test]
    async fn timeout_carries_the_last_report() {
        let outcome: WaitOutcome<u32> = wait_until(
            || async { CheckReport::pending(7) },
            PollOptions::default()
                .timeout(Some(Duration::from_millis(30)))
                .interval(Duration::from_millis(10)),
        )
        .await;
        match &outcome {
            WaitOutcome::TimedOut(Some(report)) => assert_eq!(report.status, 7),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(outcome.status(), 7);
    }
}

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

//! Command execution on a managed host, over `ssh` or directly on the local
//! machine, plus rsync-based file transfer reusing the same identity and
//! escaping rules.

use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use crate::host::HostSpec;
use crate::runner::{self, CommandResult, RunRequest};

/// Default ceiling for a simple fleet command when the caller does not set
/// one. Long-lived invocations must opt out via [`TimeoutPolicy::Unlimited`].
pub const LONGEST_SIMPLE_COMMAND: Duration = Duration::from_secs(600);

/// Inactivity ceiling passed to rsync itself.
const RSYNC_TIMEOUT_SECS: u64 = 1800;

/// How a channel invocation bounds its runtime.
#[derive(Debug, Clone, Copy, Default)]
pub enum TimeoutPolicy {
    /// Apply [`LONGEST_SIMPLE_COMMAND`].
    #[default]
    Default,
    /// No ceiling; the command may run indefinitely.
    Unlimited,
    After(Duration),
}

impl TimeoutPolicy {
    fn resolve(self) -> Option<Duration> {
        match self {
            TimeoutPolicy::Default => Some(LONGEST_SIMPLE_COMMAND),
            TimeoutPolicy::Unlimited => None,
            TimeoutPolicy::After(limit) => Some(limit),
        }
    }
}

/// Per-invocation options; mirrors [`RunRequest`] minus the command text.
#[derive(Default)]
pub struct ChannelRunOptions {
    pub timeout: TimeoutPolicy,
    pub stdin: Option<Vec<u8>>,
    pub stdout_sink: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    pub stderr_sink: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    pub capture_stdout: bool,
    pub capture_stderr: bool,
    pub quit: Option<CancellationToken>,
    pub flush_each_chunk: bool,
}

impl ChannelRunOptions {
    pub fn new() -> Self {
        Self {
            capture_stdout: true,
            capture_stderr: true,
            ..Default::default()
        }
    }

    pub fn timeout(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout = policy;
        self
    }

    pub fn quit(mut self, token: CancellationToken) -> Self {
        self.quit = Some(token);
        self
    }
}

/// File-transfer switches shared by `send_file` and `get_file`.
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    /// Delete extraneous files on the receiving side.
    pub delete: bool,
    /// Preserve symlinks instead of following them.
    pub preserve_symlinks: bool,
    /// Run the rsync invocation on the local machine; otherwise it is issued
    /// through this channel and the caller is responsible for path
    /// addressing on the remote side.
    pub from_local: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            delete: false,
            preserve_symlinks: false,
            from_local: true,
        }
    }
}

/// Escape a command for embedding inside the double-quoted remote-shell
/// argument: backslash, dollar, double quote, and backtick each get a
/// backslash prefix.
pub fn escape_remote(command: &str) -> String {
    let mut escaped = String::with_capacity(command.len());
    for ch in command.chars() {
        if matches!(ch, '\\' | '$' | '"' | '`') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Command channel to one managed host.
#[derive(Debug, Clone)]
pub struct HostChannel {
    pub host: HostSpec,
    /// When the target is the local machine, skip the ssh wrapping entirely.
    pub ssh_free_local: bool,
}

impl HostChannel {
    pub fn new(host: HostSpec, ssh_free_local: bool) -> Self {
        Self {
            host,
            ssh_free_local,
        }
    }

    fn local_fast_path(&self) -> bool {
        self.host.is_local && self.ssh_free_local
    }

    /// The ssh transport prefix shared by command execution and rsync's
    /// `--rsh` option.
    fn ssh_transport(&self) -> String {
        let mut line = format!(
            "ssh -a -x -l {} -o StrictHostKeyChecking=no -o BatchMode=yes",
            self.host.login
        );
        if let Some(identity) = &self.host.identity_file {
            line.push_str(&format!(" -i {}", identity.display()));
        }
        if self.host.port != 22 {
            line.push_str(&format!(" -p {}", self.host.port));
        }
        line
    }

    /// Full ssh invocation for one command. `LANG=en_US` keeps remote output
    /// encoding predictable.
    pub fn remote_invocation(&self, command: &str) -> String {
        format!(
            "{} {} \"LANG=en_US {}\"",
            self.ssh_transport(),
            self.host.hostname,
            escape_remote(command)
        )
    }

    /// Run a command on this host. The result shape is identical whether the
    /// local fast path or the ssh wrapping was taken.
    pub async fn run(&self, command: &str, opts: ChannelRunOptions) -> CommandResult {
        let local = self.local_fast_path();
        let invocation = if local {
            command.to_string()
        } else {
            self.remote_invocation(command)
        };

        tracing::debug!(host = %self.host, local, command, "running fleet command");

        let request = RunRequest {
            command: invocation,
            timeout: opts.timeout.resolve(),
            stdin: opts.stdin,
            stdout_sink: opts.stdout_sink,
            stderr_sink: opts.stderr_sink,
            capture_stdout: opts.capture_stdout,
            capture_stderr: opts.capture_stderr,
            quit: opts.quit,
            flush_each_chunk: opts.flush_each_chunk,
        };
        let result = runner::run(request).await;

        tracing::debug!(
            host = %self.host,
            exit_status = ?result.exit_status,
            timed_out = result.timed_out,
            duration_ms = result.duration.as_millis() as u64,
            "fleet command finished"
        );
        result
    }

    fn remote_path(&self, path: &str) -> String {
        if self.local_fast_path() {
            path.to_string()
        } else {
            format!(
                "{}@{}:\"{}\"",
                self.host.login,
                self.host.hostname,
                escape_remote(path)
            )
        }
    }

    fn rsync_invocation(
        &self,
        sources: &[String],
        destination: &str,
        to_remote: bool,
        opts: &TransferOptions,
    ) -> String {
        let mut line = format!("rsync --timeout={RSYNC_TIMEOUT_SECS} -az");
        if !opts.preserve_symlinks {
            line.push_str(" -L");
        }
        if opts.delete {
            line.push_str(" --delete");
        }
        if !self.local_fast_path() {
            line.push_str(&format!(" --rsh='{}'", self.ssh_transport()));
        }
        if to_remote {
            for source in sources {
                line.push_str(&format!(" {source}"));
            }
            line.push_str(&format!(" {}", self.remote_path(destination)));
        } else {
            for source in sources {
                line.push_str(&format!(" {}", self.remote_path(source)));
            }
            line.push_str(&format!(" {destination}"));
        }
        line
    }

    /// Copy local files to this host. Returns the rsync exit code; `0` means
    /// the transfer completed.
    pub async fn send_file(
        &self,
        sources: &[String],
        destination: &str,
        opts: &TransferOptions,
    ) -> i32 {
        let invocation = self.rsync_invocation(sources, destination, true, opts);
        self.transfer(invocation, opts).await
    }

    /// Copy files from this host to a local destination. Returns the rsync
    /// exit code; `0` means the transfer completed.
    pub async fn get_file(
        &self,
        sources: &[String],
        destination: &str,
        opts: &TransferOptions,
    ) -> i32 {
        let invocation = self.rsync_invocation(sources, destination, false, opts);
        self.transfer(invocation, opts).await
    }

    async fn transfer(&self, invocation: String, opts: &TransferOptions) -> i32 {
        tracing::debug!(host = %self.host, invocation, "starting file transfer");
        let result = if opts.from_local {
            // rsync enforces its own inactivity ceiling.
            runner::run(RunRequest::new(invocation)).await
        } else {
            self.run(
                &invocation,
                ChannelRunOptions::new().timeout(TimeoutPolicy::Unlimited),
            )
            .await
        };
        if !result.success() {
            tracing::warn!(
                host = %self.host,
                exit_status = ?result.exit_status,
                stderr = %result.stderr,
                "file transfer failed"
            );
        }
        result.exit_status.unwrap_or(-1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn channel(spec: &str) -> HostChannel {
        HostChannel::new(HostSpec::parse(spec, None).unwrap(), false)
    }

    #[test]
    fn escape_covers_all_special_characters() {
        assert_eq!(escape_remote(r#"echo "$HOME" \ `id`"#), r#"echo \"\$HOME\" \\ \`id\`"#);
        assert_eq!(escape_remote("plain text"), "plain text");
    }

    #[test]
    fn remote_invocation_shape() {
        let ch = channel("oss03");
        assert_eq!(
            ch.remote_invocation("uptime"),
            "ssh -a -x -l root -o StrictHostKeyChecking=no -o BatchMode=yes \
             oss03 \"LANG=en_US uptime\""
        );
    }

    #[test]
    fn remote_invocation_with_identity_and_port() {
        let host = HostSpec::parse("admin@oss03:2222", None)
            .unwrap()
            .with_identity_file(Some(PathBuf::from("/etc/fleet/id_ed25519")));
        let ch = HostChannel::new(host, false);
        assert_eq!(
            ch.remote_invocation("uptime"),
            "ssh -a -x -l admin -o StrictHostKeyChecking=no -o BatchMode=yes \
             -i /etc/fleet/id_ed25519 -p 2222 oss03 \"LANG=en_US uptime\""
        );
    }

    #[test]
    fn remote_invocation_escapes_the_command() {
        let ch = channel("oss03");
        let line = ch.remote_invocation(r#"echo "$PATH""#);
        assert!(line.ends_with(r#""LANG=en_US echo \"\$PATH\"""#));
    }

    #[test]
    fn rsync_line_to_remote() {
        let ch = channel("oss03");
        let line = ch.rsync_invocation(
            &["/tmp/collector.conf".to_string()],
            "/etc/collector/collector.conf",
            true,
            &TransferOptions::default(),
        );
        assert_eq!(
            line,
            "rsync --timeout=1800 -az -L \
             --rsh='ssh -a -x -l root -o StrictHostKeyChecking=no -o BatchMode=yes' \
             /tmp/collector.conf root@oss03:\"/etc/collector/collector.conf\""
        );
    }

    #[test]
    fn rsync_line_with_delete_and_symlinks() {
        let ch = channel("oss03");
        let opts = TransferOptions {
            delete: true,
            preserve_symlinks: true,
            from_local: true,
        };
        let line = ch.rsync_invocation(&["/srv/dashboards/".to_string()], "/srv/dashboards/", true, &opts);
        assert!(line.starts_with("rsync --timeout=1800 -az --delete"));
        assert!(!line.contains(" -L"));
    }

    #[test]
    fn rsync_line_local_mode_skips_rsh_and_host_prefix() {
        let host = HostSpec::parse("localhost", None).unwrap();
        let ch = HostChannel::new(host, true);
        let line = ch.rsync_invocation(
            &["/tmp/a".to_string()],
            "/tmp/b",
            true,
            &TransferOptions::default(),
        );
        assert_eq!(line, "rsync --timeout=1800 -az -L /tmp/a /tmp/b");
    }

    #[test]
    fn get_file_reverses_path_roles() {
        let ch = channel("oss03");
        let line = ch.rsync_invocation(
            &["/var/log/collector.log".to_string()],
            "/tmp/logs/",
            false,
            &TransferOptions::default(),
        );
        assert!(line.ends_with("root@oss03:\"/var/log/collector.log\" /tmp/logs/"));
    }
}

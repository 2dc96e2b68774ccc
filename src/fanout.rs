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

//! Bounded-parallelism fan-out: the same operation across many targets,
//! each isolated from its siblings, results collected through the task
//! handles rather than shared mutable state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::sync::Semaphore;

use crate::channel::{ChannelRunOptions, HostChannel, TimeoutPolicy, TransferOptions};
use crate::host::HostSpec;
use crate::poller::{wait_command, CommandExpect, PollOptions, WaitOutcome};
use crate::runner::CommandResult;

/// Per-item result of a fan-out. The item rides along so callers can map
/// outcomes back to their inputs regardless of completion order.
#[derive(Debug)]
pub struct ItemOutcome<I, T> {
    pub item: I,
    pub result: anyhow::Result<T>,
}

impl<I, T> ItemOutcome<I, T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

pub type HostOutcome = ItemOutcome<HostSpec, CommandResult>;

impl HostOutcome {
    /// The operation ran and exited zero.
    pub fn is_success(&self) -> bool {
        matches!(&self.result, Ok(result) if result.success())
    }
}

/// Run `per_item` once per element with at most `parallelism` invocations
/// in flight. A failing or panicking item never aborts its siblings; each
/// worker sends its outcome back through its own task handle.
pub async fn run_many<I, T, F, Fut>(
    label: &str,
    items: Vec<I>,
    parallelism: usize,
    per_item: F,
) -> Vec<ItemOutcome<I, T>>
where
    I: Clone + Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    tracing::debug!(label, parallelism, "starting fan-out");

    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let per_item = Arc::new(per_item);

    let tasks: Vec<_> = items
        .into_iter()
        .map(|item| {
            let semaphore = Arc::clone(&semaphore);
            let per_item = Arc::clone(&per_item);
            tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return ItemOutcome {
                            item,
                            result: Err(anyhow::anyhow!("semaphore closed: {e}")),
                        }
                    }
                };
                let result = per_item(item.clone()).await;
                ItemOutcome { item, result }
            })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(tasks.len());
    for joined in join_all(tasks).await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => tracing::error!(label, "fan-out task panicked: {e}"),
        }
    }
    outcomes
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{prefix:.bold} {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷ ")
}

const SPINNER_TICK: Duration = Duration::from_millis(80);

/// Broadcast executor over a set of hosts.
pub struct Fleet {
    hosts: Vec<HostSpec>,
    parallelism: usize,
    ssh_free_local: bool,
    timeout: TimeoutPolicy,
}

impl Fleet {
    pub fn new(hosts: Vec<HostSpec>, parallelism: usize) -> Self {
        Self {
            hosts,
            parallelism,
            ssh_free_local: false,
            timeout: TimeoutPolicy::Default,
        }
    }

    pub fn with_ssh_free_local(mut self, ssh_free_local: bool) -> Self {
        self.ssh_free_local = ssh_free_local;
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutPolicy) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn hosts(&self) -> &[HostSpec] {
        &self.hosts
    }

    /// Run one command on every host.
    pub async fn execute(&self, command: &str) -> Vec<HostOutcome> {
        let progress = MultiProgress::new();
        let style = spinner_style();
        let command = command.to_string();
        let ssh_free_local = self.ssh_free_local;
        let timeout = self.timeout;

        run_many("exec", self.hosts.clone(), self.parallelism, move |host| {
            let progress = progress.clone();
            let style = style.clone();
            let command = command.clone();
            async move {
                let bar = progress.add(ProgressBar::new_spinner());
                bar.set_style(style);
                bar.set_prefix(format!("[{host}]"));
                bar.set_message("running".to_string());
                bar.enable_steady_tick(SPINNER_TICK);

                let channel = HostChannel::new(host, ssh_free_local);
                let result = channel
                    .run(&command, ChannelRunOptions::new().timeout(timeout))
                    .await;

                if result.success() {
                    bar.finish_with_message(format!("{}", "done".green()));
                } else if result.timed_out {
                    bar.finish_with_message(format!("{}", "timed out".red()));
                } else {
                    bar.finish_with_message(format!(
                        "{}",
                        format!("exit {}", result.exit_status.unwrap_or(-1)).red()
                    ));
                }
                Ok(result)
            }
        })
        .await
    }

    /// Connectivity probe: the cheapest possible remote command.
    pub async fn ping(&self) -> Vec<HostOutcome> {
        self.execute("true").await
    }

    /// Poll `command` on every host until its result matches `expect` or
    /// the wait times out; each host's wait runs independently.
    pub async fn wait_all(
        &self,
        command: &str,
        expect: CommandExpect,
        poll: PollOptions,
    ) -> Vec<ItemOutcome<HostSpec, WaitOutcome<CommandResult>>> {
        let ssh_free_local = self.ssh_free_local;
        let command = command.to_string();
        run_many("wait", self.hosts.clone(), self.parallelism, move |host| {
            let command = command.clone();
            let expect = expect.clone();
            async move {
                let channel = HostChannel::new(host, ssh_free_local);
                Ok(wait_command(&channel, &command, &expect, poll).await)
            }
        })
        .await
    }

    /// Push local files to every host. An item fails when rsync exits
    /// nonzero.
    pub async fn send_file(
        &self,
        sources: Vec<String>,
        destination: String,
        opts: TransferOptions,
    ) -> Vec<ItemOutcome<HostSpec, i32>> {
        let ssh_free_local = self.ssh_free_local;
        run_many("push", self.hosts.clone(), self.parallelism, move |host| {
            let sources = sources.clone();
            let destination = destination.clone();
            async move {
                let channel = HostChannel::new(host, ssh_free_local);
                let code = channel.send_file(&sources, &destination, &opts).await;
                if code == 0 {
                    Ok(code)
                } else {
                    Err(anyhow::anyhow!("rsync exited {code}"))
                }
            }
        })
        .await
    }

    /// Fetch files from every host into `destination/<hostname>/` so
    /// concurrent pulls cannot clobber each other. The per-host directory
    /// must already exist.
    pub async fn get_file(
        &self,
        sources: Vec<String>,
        destination: String,
        opts: TransferOptions,
    ) -> Vec<ItemOutcome<HostSpec, i32>> {
        let ssh_free_local = self.ssh_free_local;
        run_many("fetch", self.hosts.clone(), self.parallelism, move |host| {
            let sources = sources.clone();
            let target = format!("{}/{}/", destination.trim_end_matches('/'), host.hostname);
            async move {
                let channel = HostChannel::new(host, ssh_free_local);
                let code = channel.get_file(&sources, &target, &opts).await;
                if code == 0 {
                    Ok(code)
                } else {
                    Err(anyhow::anyhow!("rsync exited {code}"))
                }
            }
        })
        .await
    }
}

/// Aggregate pass/fail over a fan-out; per-item detail stays in the
/// outcomes themselves.
pub fn all_ok<I, T>(outcomes: &[ItemOutcome<I, T>]) -> bool {
    outcomes.iter().all(|outcome| outcome.is_ok())
}

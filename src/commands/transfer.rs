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

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;

use crate::channel::TransferOptions;
use crate::fanout::{Fleet, ItemOutcome};
use crate::host::HostSpec;
use crate::utils::OutputFormatter;

pub async fn push_files(
    fleet: &Fleet,
    source: &str,
    destination: &str,
    delete: bool,
    links: bool,
) -> Result<i32> {
    println!(
        "{}",
        OutputFormatter::format_command_header(
            &format!("push {source} -> {destination}"),
            fleet.hosts().len()
        )
    );

    let opts = TransferOptions {
        delete,
        preserve_symlinks: links,
        from_local: true,
    };
    let outcomes = fleet
        .send_file(vec![source.to_string()], destination.to_string(), opts)
        .await;

    print_transfer_results(&outcomes, "distributed")
}

pub async fn fetch_files(
    fleet: &Fleet,
    source: &str,
    destination: &str,
    links: bool,
) -> Result<i32> {
    println!(
        "{}",
        OutputFormatter::format_command_header(
            &format!("fetch {source} -> {destination}"),
            fleet.hosts().len()
        )
    );

    // One directory per host, created up front so rsync has a target.
    for host in fleet.hosts() {
        let host_dir = Path::new(destination).join(&host.hostname);
        tokio::fs::create_dir_all(&host_dir)
            .await
            .with_context(|| format!("failed to create {host_dir:?}"))?;
    }

    let opts = TransferOptions {
        delete: false,
        preserve_symlinks: links,
        from_local: true,
    };
    let outcomes = fleet
        .get_file(vec![source.to_string()], destination.to_string(), opts)
        .await;

    print_transfer_results(&outcomes, "collected")
}

fn print_transfer_results(outcomes: &[ItemOutcome<HostSpec, i32>], verb: &str) -> Result<i32> {
    let mut failed = 0;
    for outcome in outcomes {
        match &outcome.result {
            Ok(_) => println!(
                "  {} {} - {}",
                "●".green(),
                outcome.item.to_string().bold(),
                verb.green()
            ),
            Err(e) => {
                failed += 1;
                println!(
                    "  {} {} - {}",
                    "●".red(),
                    outcome.item.to_string().bold(),
                    e.to_string().red()
                );
            }
        }
    }

    println!(
        "{}",
        OutputFormatter::format_summary(outcomes.len(), outcomes.len() - failed, failed)
    );

    Ok(if failed > 0 { 1 } else { 0 })
}

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

use anyhow::Result;
use owo_colors::OwoColorize;

use crate::fanout::Fleet;
use crate::poller::{CommandExpect, PollOptions, WaitOutcome};
use crate::utils::OutputFormatter;

pub async fn wait_fleet(
    fleet: &Fleet,
    command: &str,
    expect: CommandExpect,
    poll: PollOptions,
) -> Result<i32> {
    println!(
        "{}",
        OutputFormatter::format_command_header(&format!("wait: {command}"), fleet.hosts().len())
    );

    let outcomes = fleet.wait_all(command, expect, poll).await;

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(WaitOutcome::Satisfied(_)) => println!(
                "  {} {} - {}",
                "●".green(),
                outcome.item.to_string().bold(),
                "condition met".green()
            ),
            Ok(wait) => {
                failed += 1;
                println!(
                    "  {} {} - {} (last status {})",
                    "●".red(),
                    outcome.item.to_string().bold(),
                    "gave up".red(),
                    wait.status()
                );
            }
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

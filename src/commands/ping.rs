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
use crate::utils::OutputFormatter;

pub async fn ping_hosts(fleet: &Fleet) -> Result<i32> {
    println!(
        "{}",
        OutputFormatter::format_command_header("ping", fleet.hosts().len())
    );

    let outcomes = fleet.ping().await;

    println!("\n{} {}\n", "▶".cyan(), "Connection Test Results".bold());

    let mut failed = 0;
    for outcome in &outcomes {
        if outcome.is_success() {
            println!(
                "  {} {} - {}",
                "●".green(),
                outcome.item.to_string().bold(),
                "Connected".green()
            );
        } else {
            failed += 1;
            println!(
                "  {} {} - {}",
                "●".red(),
                outcome.item.to_string().bold(),
                "Failed".red()
            );
            if let Ok(result) = &outcome.result {
                for line in result.stderr.lines() {
                    println!("    {}", line.dimmed());
                }
            }
        }
    }

    println!(
        "{}",
        OutputFormatter::format_summary(outcomes.len(), outcomes.len() - failed, failed)
    );

    Ok(if failed > 0 { 1 } else { 0 })
}

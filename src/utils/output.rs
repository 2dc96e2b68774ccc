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

//! Terminal formatting for per-host results and run summaries.

use owo_colors::OwoColorize;

use crate::fanout::HostOutcome;

pub struct OutputFormatter;

impl OutputFormatter {
    pub fn format_command_header(operation: &str, host_count: usize) -> String {
        format!(
            "{} {} on {} host{}",
            "▶".cyan(),
            operation.bold(),
            host_count,
            if host_count == 1 { "" } else { "s" }
        )
    }

    /// One host's block: status line, then captured output. Stderr is shown
    /// only when non-empty or in verbose mode.
    pub fn format_host_result(outcome: &HostOutcome, verbose: bool) -> String {
        let mut block = String::new();
        match &outcome.result {
            Ok(result) => {
                let status = if result.success() {
                    format!("{}", "ok".green())
                } else if result.timed_out {
                    format!("{}", "timed out".red())
                } else {
                    format!("{}", format!("exit {}", result.exit_status.unwrap_or(-1)).red())
                };
                block.push_str(&format!(
                    "{} {} ({status}, {:.2}s)\n",
                    "●".cyan(),
                    outcome.item.to_string().bold(),
                    result.duration.as_secs_f64()
                ));
                if !result.stdout.is_empty() {
                    for line in result.stdout.lines() {
                        block.push_str(&format!("  {line}\n"));
                    }
                }
                if !result.stderr.is_empty() || verbose {
                    for line in result.stderr.lines() {
                        block.push_str(&format!("  {}\n", line.dimmed()));
                    }
                }
            }
            Err(e) => {
                block.push_str(&format!(
                    "{} {} - {}\n",
                    "●".red(),
                    outcome.item.to_string().bold(),
                    e.to_string().red()
                ));
            }
        }
        block
    }

    pub fn format_summary(total: usize, succeeded: usize, failed: usize) -> String {
        let tally = format!("{succeeded}/{total} succeeded");
        if failed == 0 {
            format!("\n{} {}", "✓".green(), tally.green())
        } else {
            format!("\n{} {} ({} failed)", "✗".red(), tally, failed.to_string().red())
        }
    }
}

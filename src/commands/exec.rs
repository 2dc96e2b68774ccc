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

use crate::fanout::Fleet;
use crate::utils::OutputFormatter;

pub async fn execute_command(fleet: &Fleet, command: &str, verbose: bool) -> Result<i32> {
    println!(
        "{}",
        OutputFormatter::format_command_header(command, fleet.hosts().len())
    );

    let outcomes = fleet.execute(command).await;

    for outcome in &outcomes {
        print!("{}", OutputFormatter::format_host_result(outcome, verbose));
    }

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    let failed = outcomes.len() - succeeded;
    println!(
        "{}",
        OutputFormatter::format_summary(outcomes.len(), succeeded, failed)
    );

    Ok(if failed > 0 { 1 } else { 0 })
}

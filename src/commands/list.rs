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

use owo_colors::OwoColorize;

use crate::config::Config;

pub fn list_fleets(config: &Config) {
    if config.fleets.is_empty() {
        println!("No fleets defined.");
        println!("Add a 'fleets' section to ~/.config/fleetmon/config.yaml to get started.");
        return;
    }

    let mut names: Vec<_> = config.fleets.keys().collect();
    names.sort();

    println!("{}", "Configured fleets:".bold());
    for name in names {
        if let Some(fleet) = config.fleets.get(name) {
            println!(
                "\n  {} ({} host{})",
                name.cyan().bold(),
                fleet.hosts.len(),
                if fleet.hosts.len() == 1 { "" } else { "s" }
            );
            for host in &fleet.hosts {
                println!("    - {host}");
            }
        }
    }

    if let Some(metrics) = &config.metrics {
        println!(
            "\n{} {} (db {})",
            "metrics:".bold(),
            metrics.query_url,
            metrics.database
        );
    }
}

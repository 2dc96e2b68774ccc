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
use std::time::Duration;

use crate::config::Config;
use crate::poller::PollOptions;
use crate::verify::{MetricStore, WriteVerifier};

pub struct VerifyParams {
    pub measurement: String,
    pub tags: Vec<String>,
    pub wait_timeout: u64,
    pub interval: u64,
    pub query_url: Option<String>,
    pub database: Option<String>,
}

pub async fn verify_measurement(config: &Config, params: VerifyParams) -> Result<i32> {
    let query_url = params
        .query_url
        .or_else(|| config.metrics.as_ref().map(|m| m.query_url.clone()));
    let database = params
        .database
        .or_else(|| config.metrics.as_ref().map(|m| m.database.clone()));
    let (query_url, database) = match (query_url, database) {
        (Some(url), Some(db)) => (url, db),
        _ => anyhow::bail!(
            "no metrics endpoint configured; add a 'metrics' section to the \
             configuration or pass --query-url and --database"
        ),
    };

    let mut tags = Vec::with_capacity(params.tags.len());
    for tag in &params.tags {
        match tag.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                tags.push((key.to_string(), value.to_string()))
            }
            _ => anyhow::bail!("invalid tag filter '{tag}' (expected key=value)"),
        }
    }

    let poll = PollOptions {
        timeout: match params.wait_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        },
        interval: Duration::from_secs(params.interval),
    };

    println!(
        "{} watching \"{}\" at {} (db {})",
        "▶".cyan(),
        params.measurement.bold(),
        query_url,
        database
    );

    let store = MetricStore::new(query_url, database);
    let mut verifier = WriteVerifier::new(store, params.measurement, tags);

    match verifier.confirm_effect(poll).await {
        Ok(()) => {
            println!("{} {}", "✓".green(), "fresh data confirmed".green());
            Ok(0)
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e.to_string().red());
            Ok(1)
        }
    }
}

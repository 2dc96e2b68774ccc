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

//! Confirmation that a configuration change is producing live data: poll
//! the time-series store for the newest point of a measurement and require
//! a strictly increasing timestamp before declaring success.
//!
//! A stale pre-existing point for the same tags would otherwise pass for
//! confirmation; only a timestamp advance proves a new write landed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;

use crate::poller::{wait_until, CheckReport, PollOptions, WaitOutcome};

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("no fresh data point for \"{measurement}\" after {waited:?}")]
    Timeout {
        measurement: String,
        waited: Duration,
    },
}

/// Query client for the time-series store's HTTP endpoint.
#[derive(Debug, Clone)]
pub struct MetricStore {
    base_url: String,
    database: String,
    http: reqwest::Client,
}

impl MetricStore {
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Timestamp of the newest point for `measurement` under `tags`, or
    /// `None` when the store is unreachable, rejects the query, or returns
    /// a shape without a usable `columns`/`values` pairing. All of those are
    /// "not yet" from the caller's point of view.
    pub async fn latest_timestamp(
        &self,
        measurement: &str,
        tags: &[(String, String)],
    ) -> Option<i64> {
        let query = select_latest(measurement, tags);
        let url = format!("{}/query", self.base_url.trim_end_matches('/'));

        let response = match self
            .http
            .get(&url)
            .query(&[("db", self.database.as_str()), ("q", query.as_str())])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, %query, "metrics query failed to send");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), %query, "metrics query rejected");
            return None;
        }
        let body: serde_json::Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(error = %e, %query, "metrics response was not JSON");
                return None;
            }
        };
        extract_latest_timestamp(&body)
    }
}

fn select_latest(measurement: &str, tags: &[(String, String)]) -> String {
    let mut query = format!("SELECT * FROM \"{measurement}\"");
    if !tags.is_empty() {
        let clauses: Vec<String> = tags
            .iter()
            .map(|(key, value)| format!("{key}='{value}'"))
            .collect();
        query.push_str(&format!(" WHERE {}", clauses.join(" AND ")));
    }
    query.push_str(" ORDER BY time DESC LIMIT 1;");
    query
}

/// Find the object carrying `columns`/`values`, either at the top level or
/// nested under `results[0].series[0]`.
fn series_object(body: &serde_json::Value) -> Option<&serde_json::Value> {
    if body.get("columns").is_some() && body.get("values").is_some() {
        return Some(body);
    }
    body.get("results")?.get(0)?.get("series")?.get(0)
}

fn extract_latest_timestamp(body: &serde_json::Value) -> Option<i64> {
    let series = series_object(body)?;
    let columns = series.get("columns")?.as_array()?;
    let time_index = columns.iter().position(|c| c.as_str() == Some("time"))?;
    let row = series.get("values")?.as_array()?.first()?.as_array()?;
    row.get(time_index)?.as_i64()
}

/// Ratchet step: the timestamp may only move forward, and only a strict
/// advance counts as evidence of a fresh write.
fn advance(previous: Option<i64>, observed: i64) -> (Option<i64>, bool) {
    match previous {
        Some(prev) if observed > prev => (Some(observed), true),
        Some(prev) => (Some(prev), false),
        None => (Some(observed), false),
    }
}

/// Confirms that a configuration change took effect by watching one
/// measurement's newest timestamp. The recorded timestamp persists for the
/// verifier's lifetime; recreate the verifier to reset it.
#[derive(Debug, Clone)]
pub struct WriteVerifier {
    store: MetricStore,
    measurement: String,
    tags: Vec<(String, String)>,
    last_seen: Option<i64>,
}

impl WriteVerifier {
    pub fn new(store: MetricStore, measurement: impl Into<String>, tags: Vec<(String, String)>) -> Self {
        Self {
            store,
            measurement: measurement.into(),
            tags,
            last_seen: None,
        }
    }

    /// Feed one observed timestamp through the ratchet. Returns `true`
    /// exactly when the observation strictly exceeds the recorded one.
    pub fn observe(&mut self, timestamp: i64) -> bool {
        let (next, fresh) = advance(self.last_seen, timestamp);
        self.last_seen = next;
        fresh
    }

    /// Poll the store until a fresh write is observed. Parse failures and
    /// unreachable stores count as "not yet"; there is no early abort — a
    /// collector may need one or more full intervals before its first point
    /// appears, so only the timeout ends the wait.
    pub async fn confirm_effect(&mut self, opts: PollOptions) -> Result<(), VerifyError> {
        let started = Instant::now();
        let store = self.store.clone();
        let measurement = self.measurement.clone();
        let tags = self.tags.clone();
        let ratchet = Arc::new(Mutex::new(self.last_seen));
        let shared = Arc::clone(&ratchet);

        let outcome = wait_until(
            move || {
                let store = store.clone();
                let measurement = measurement.clone();
                let tags = tags.clone();
                let ratchet = Arc::clone(&shared);
                async move {
                    match store.latest_timestamp(&measurement, &tags).await {
                        Some(timestamp) => {
                            let fresh = {
                                let mut guard = ratchet.lock().await;
                                let (next, fresh) = advance(*guard, timestamp);
                                *guard = next;
                                fresh
                            };
                            if fresh {
                                CheckReport::ok(timestamp)
                            } else {
                                CheckReport::pending(1)
                            }
                        }
                        None => CheckReport::pending(1),
                    }
                }
            },
            opts,
        )
        .await;

        self.last_seen = *ratchet.lock().await;

        match outcome {
            WaitOutcome::Satisfied(report) => {
                tracing::info!(
                    measurement = %self.measurement,
                    timestamp = ?report.payload,
                    "fresh data point confirmed"
                );
                Ok(())
            }
            WaitOutcome::QuitRequested(_) | WaitOutcome::TimedOut(_) => Err(VerifyError::Timeout {
                measurement: self.measurement.clone(),
                waited: started.elapsed(),
            }),
        }
    }
}

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

//! Configuration type definitions and fleet resolution.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use super::utils::expand_tilde;
use crate::host::HostSpec;

/// Main configuration structure.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub fleets: HashMap<String, FleetConfig>,

    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

/// Global default settings, overridable per fleet.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Defaults {
    pub login: Option<String>,
    pub port: Option<u16>,
    pub identity: Option<String>,
    pub parallel: Option<usize>,
    /// Command timeout in seconds; 0 means unlimited.
    pub timeout: Option<u64>,
}

/// One named group of managed hosts.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct FleetConfig {
    #[serde(default)]
    pub hosts: Vec<String>,
    pub login: Option<String>,
    pub port: Option<u16>,
    pub identity: Option<String>,
    pub parallel: Option<usize>,
    pub timeout: Option<u64>,
}

/// Where the `verify` command queries for live data.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetricsConfig {
    /// Base URL of the time-series store's HTTP API.
    pub query_url: String,
    pub database: String,
}

impl Config {
    pub fn fleet(&self, name: &str) -> Option<&FleetConfig> {
        self.fleets.get(name)
    }

    pub fn get_timeout(&self, fleet: Option<&str>) -> Option<u64> {
        fleet
            .and_then(|name| self.fleets.get(name))
            .and_then(|fleet| fleet.timeout)
            .or(self.defaults.timeout)
    }

    pub fn get_parallel(&self, fleet: Option<&str>) -> Option<usize> {
        fleet
            .and_then(|name| self.fleets.get(name))
            .and_then(|fleet| fleet.parallel)
            .or(self.defaults.parallel)
    }

    pub fn get_login(&self, fleet: Option<&str>) -> Option<String> {
        fleet
            .and_then(|name| self.fleets.get(name))
            .and_then(|fleet| fleet.login.clone())
            .or_else(|| self.defaults.login.clone())
    }

    pub fn get_identity(&self, fleet: Option<&str>) -> Option<PathBuf> {
        fleet
            .and_then(|name| self.fleets.get(name))
            .and_then(|fleet| fleet.identity.clone())
            .or_else(|| self.defaults.identity.clone())
            .map(|identity| expand_tilde(&PathBuf::from(identity)))
    }

    /// Materialize the host list of a named fleet, applying login, port,
    /// and identity defaults to entries that do not carry their own.
    pub fn resolve_hosts(&self, fleet_name: &str) -> Result<Vec<HostSpec>> {
        let fleet = self
            .fleets
            .get(fleet_name)
            .with_context(|| format!("fleet '{fleet_name}' is not defined in the configuration"))?;
        if fleet.hosts.is_empty() {
            anyhow::bail!("fleet '{fleet_name}' has no hosts");
        }

        let login = self.get_login(Some(fleet_name));
        let port = fleet.port.or(self.defaults.port);
        let identity = self.get_identity(Some(fleet_name));

        let mut hosts = Vec::with_capacity(fleet.hosts.len());
        for spec in &fleet.hosts {
            let mut host = HostSpec::parse(spec, login.as_deref())
                .with_context(|| format!("invalid host entry in fleet '{fleet_name}'"))?;
            if !spec.contains(':') {
                if let Some(port) = port {
                    host.port = port;
                }
            }
            hosts.push(host.with_identity_file(identity.clone()));
        }
        Ok(hosts)
    }
}

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

//! Configuration loading and priority management.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::types::Config;
use super::utils::expand_tilde;

impl Config {
    /// Load configuration from a file. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_tilde(path);

        if !expanded_path.exists() {
            tracing::debug!(
                "config file not found at {:?}, using defaults",
                expanded_path
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&expanded_path).await.with_context(|| {
            format!(
                "Failed to read configuration file at {}. Please check file permissions.",
                expanded_path.display()
            )
        })?;

        let config: Config = serde_yaml::from_str(&content).with_context(|| {
            format!(
                "Failed to parse YAML configuration file at {}. Please check the syntax is valid.",
                expanded_path.display()
            )
        })?;

        Ok(config)
    }

    /// Load configuration with priority order:
    /// 1. Explicit `--config` path
    /// 2. Current directory (`./fleetmon.yaml`)
    /// 3. XDG config directory (`~/.config/fleetmon/config.yaml`)
    pub async fn load_with_priority(explicit: &Path) -> Result<Self> {
        let expanded = expand_tilde(explicit);
        if expanded.exists() {
            tracing::debug!("loading config from {:?}", expanded);
            return Self::load(&expanded).await;
        }

        let cwd_config = PathBuf::from("fleetmon.yaml");
        if cwd_config.exists() {
            tracing::debug!("loading config from current directory");
            return Self::load(&cwd_config).await;
        }

        if let Some(dirs) = ProjectDirs::from("", "", "fleetmon") {
            let user_config = dirs.config_dir().join("config.yaml");
            if user_config.exists() {
                tracing::debug!("loading config from {:?}", user_config);
                return Self::load(&user_config).await;
            }
        }

        tracing::debug!("no configuration file found, using defaults");
        Ok(Self::default())
    }
}

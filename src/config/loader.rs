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

//! Configuration loading.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::types::Config;
use super::utils::expand_tilde;

impl Config {
    /// Load configuration from a file.
    ///
    /// A missing file is not an error: the built-in defaults apply.
    pub async fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_tilde(path);

        if !expanded_path.exists() {
            tracing::debug!(
                "Config file not found at {:?}, using defaults",
                expanded_path
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&expanded_path)
            .await
            .with_context(|| format!("Failed to read configuration file at {}. Please check file permissions and ensure the file is accessible.", expanded_path.display()))?;

        Self::from_yaml(&content).with_context(|| {
            format!(
                "Failed to parse YAML configuration file at {}",
                expanded_path.display()
            )
        })
    }

    /// Parse configuration from YAML text. An empty document yields defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config =
            serde_yaml::from_str(content).context("Invalid configuration document")?;
        Ok(config)
    }

    /// Default location of the configuration file.
    ///
    /// `$XDG_CONFIG_HOME/tunneller/config.yaml` when set, otherwise the
    /// platform config directory.
    pub fn default_path() -> PathBuf {
        if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg_config_home)
                .join("tunneller")
                .join("config.yaml");
        }
        if let Some(proj_dirs) = ProjectDirs::from("", "", "tunneller") {
            return proj_dirs.config_dir().join("config.yaml");
        }
        PathBuf::from("~/.config/tunneller/config.yaml")
    }
}

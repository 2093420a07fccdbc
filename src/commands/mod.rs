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

//! Subcommand implementations of the `tunneller` binary.

pub mod connect;
pub mod inventory;
pub mod profiles;
pub mod resolve;

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::{credentials_path, Config};
use crate::profile::ProfileStore;

/// Profile used when neither the command line nor the config names one
pub const DEFAULT_PROFILE: &str = "default";

/// Load the profile graph from the effective credentials file.
pub async fn load_store(explicit: Option<&Path>, config: &Config) -> Result<ProfileStore> {
    let path = credentials_path(explicit, config.credentials_file());
    ProfileStore::load(&path)
        .await
        .with_context(|| format!("Failed to load profiles from {}", path.display()))
}

/// Pick the profile and region: command line, then config.
pub fn select_profile_and_region(
    profile: Option<&str>,
    region: Option<&str>,
    config: &Config,
) -> Result<(String, String)> {
    let profile = profile
        .or(config.profile.as_deref())
        .unwrap_or(DEFAULT_PROFILE)
        .to_string();
    let region = region
        .or(config.region.as_deref())
        .map(str::to_string)
        .context("No region given; pass --region or set 'region' in the config file")?;
    Ok((profile, region))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_precedence() {
        let config = Config {
            profile: Some("ops".to_string()),
            region: Some("eu-west-1".to_string()),
            ..Config::default()
        };

        let (profile, region) = select_profile_and_region(None, None, &config).unwrap();
        assert_eq!((profile.as_str(), region.as_str()), ("ops", "eu-west-1"));

        let (profile, region) =
            select_profile_and_region(Some("dev"), Some("us-east-1"), &config).unwrap();
        assert_eq!((profile.as_str(), region.as_str()), ("dev", "us-east-1"));
    }

    #[test]
    fn test_region_required() {
        let config = Config::default();
        assert!(select_profile_and_region(None, None, &config).is_err());

        let (profile, _) = select_profile_and_region(None, Some("us-east-1"), &config).unwrap();
        assert_eq!(profile, DEFAULT_PROFILE);
    }
}

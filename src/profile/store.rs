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

//! Immutable profile graph loaded from a shared credentials file.

use super::error::ConfigError;
use super::ini;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use zeroize::Zeroizing;

const KEY_ACCESS_KEY_ID: &str = "aws_access_key_id";
const KEY_SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
const KEY_ROLE_ARN: &str = "role_arn";
const KEY_SOURCE_PROFILE: &str = "source_profile";

/// Long-lived access key pair stored for a direct profile.
#[derive(Clone)]
pub struct StaticKeys {
    pub access_key_id: String,
    pub secret_access_key: Zeroizing<String>,
}

impl StaticKeys {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: Zeroizing::new(secret_access_key.into()),
        }
    }
}

impl fmt::Debug for StaticKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeys")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// How a profile obtains its credentials
#[derive(Debug, Clone)]
pub enum ProfileKind {
    /// Holds a static key pair
    Direct(StaticKeys),
    /// Assumes `role_arn` using the session of `source_profile`
    Assumed {
        role_arn: String,
        source_profile: String,
    },
}

/// A named credential configuration
#[derive(Debug, Clone)]
pub struct Profile {
    name: String,
    kind: ProfileKind,
}

impl Profile {
    pub fn direct(
        name: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ProfileKind::Direct(StaticKeys::new(access_key_id, secret_access_key)),
        }
    }

    pub fn assumed(
        name: impl Into<String>,
        role_arn: impl Into<String>,
        source_profile: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ProfileKind::Assumed {
                role_arn: role_arn.into(),
                source_profile: source_profile.into(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ProfileKind {
        &self.kind
    }

    /// Name of the profile this one delegates from, if any.
    pub fn parent(&self) -> Option<&str> {
        match &self.kind {
            ProfileKind::Direct(_) => None,
            ProfileKind::Assumed { source_profile, .. } => Some(source_profile),
        }
    }
}

/// The set of profiles known for this run.
///
/// Built once and never mutated. Parent references are kept by name and
/// looked up when a profile is resolved; a reference to a missing profile is
/// tolerated here and reported by the resolver. Reference loops are rejected
/// when the store is built.
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    profiles: BTreeMap<String, Profile>,
}

impl ProfileStore {
    /// Read and parse a credentials file.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let store = Self::parse(&content, &path.display().to_string())?;
        tracing::debug!(
            "Loaded {} profile(s) from {}",
            store.len(),
            path.display()
        );
        Ok(store)
    }

    /// Parse credentials file content.
    ///
    /// Sections carrying both `aws_access_key_id` and `aws_secret_access_key`
    /// become direct profiles; sections carrying `role_arn` and
    /// `source_profile` become assumed profiles. Anything else is skipped.
    pub fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let mut profiles = Vec::new();

        for section in ini::parse(content, origin)? {
            if let (Some(key_id), Some(secret)) = (
                section.get(KEY_ACCESS_KEY_ID),
                section.get(KEY_SECRET_ACCESS_KEY),
            ) {
                profiles.push(Profile::direct(&section.name, key_id, secret));
            } else if let (Some(role), Some(source)) = (
                section.get(KEY_ROLE_ARN),
                section.get(KEY_SOURCE_PROFILE),
            ) {
                profiles.push(Profile::assumed(&section.name, role, source));
            } else {
                tracing::debug!(
                    "Skipping section [{}] at {}:{}: neither static keys nor role_arn/source_profile",
                    section.name,
                    origin,
                    section.line
                );
            }
        }

        Self::from_profiles(profiles)
    }

    /// Build a store from already constructed profiles.
    ///
    /// A later profile with the same name replaces an earlier one.
    pub fn from_profiles(profiles: impl IntoIterator<Item = Profile>) -> Result<Self, ConfigError> {
        let profiles: BTreeMap<String, Profile> = profiles
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        let store = Self { profiles };
        store.check_for_loops()?;
        Ok(store)
    }

    fn check_for_loops(&self) -> Result<(), ConfigError> {
        for start in self.profiles.keys() {
            let mut chain: Vec<String> = vec![start.clone()];
            let mut current = start.as_str();

            while let Some(parent) = self.profiles.get(current).and_then(Profile::parent) {
                if chain.iter().any(|seen| seen == parent) {
                    return Err(ConfigError::CredentialLoop {
                        chain,
                        next: parent.to_string(),
                    });
                }
                if !self.profiles.contains_key(parent) {
                    break;
                }
                chain.push(parent.to_string());
                current = parent;
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Profile names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// The delegation path starting at `name`, ending at a direct profile or
    /// at the first reference that is not defined.
    pub fn chain(&self, name: &str) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut current = self.profiles.get_key_value(name);
        while let Some((key, profile)) = current {
            chain.push(key.as_str());
            current = match profile.parent() {
                Some(parent) => match self.profiles.get_key_value(parent) {
                    Some(entry) => Some(entry),
                    None => {
                        chain.push(parent);
                        None
                    }
                },
                None => None,
            };
        }
        chain
    }
}

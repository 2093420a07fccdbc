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

//! Profile resolution with role-assumption chaining
//!
//! A [`ProfileResolver`] turns a profile name and a region into a live
//! [`Session`]. Direct profiles are bound locally; assumed profiles first
//! resolve their parent for the same region and then ask a [`RoleAssumer`]
//! to exchange the parent's session for temporary credentials.
//!
//! # Caching
//!
//! Each profile owns one cache cell guarded by its own `tokio::sync::Mutex`.
//! The cell holds the last session built for that profile. It is reused while
//! the requested region matches and the session is not about to expire;
//! otherwise it is rebuilt. A resolution holds the cell lock of every profile
//! on its chain (child before parent), so concurrent callers asking for the
//! same profile wait for one another instead of issuing duplicate
//! role assumptions. Chains are acyclic (checked when the store is built), so
//! this lock order cannot deadlock.

use super::error::{AssumeRoleError, ResolutionError};
use super::session::{AssumedCredentials, Session};
use super::store::{ProfileKind, ProfileStore};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Prefix of generated role session names
pub const SESSION_NAME_PREFIX: &str = "tunneller";

/// Refresh cached delegated sessions this long before they expire
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Identity-delegation capability.
///
/// Implementations exchange the credentials of `parent` for temporary
/// credentials of `role_arn`, tagging the new session with `session_name`.
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(
        &self,
        parent: &Session,
        role_arn: &str,
        session_name: &str,
    ) -> Result<AssumedCredentials, AssumeRoleError>;
}

type ResolveFuture<'a> = Pin<Box<dyn Future<Output = Result<Session, ResolutionError>> + Send + 'a>>;

/// Resolves profile names into sessions, caching one session per profile.
pub struct ProfileResolver {
    store: Arc<ProfileStore>,
    assumer: Arc<dyn RoleAssumer>,
    cells: HashMap<String, Mutex<Option<Session>>>,
    refresh_margin: Duration,
}

impl ProfileResolver {
    pub fn new(store: Arc<ProfileStore>, assumer: Arc<dyn RoleAssumer>) -> Self {
        let cells = store
            .names()
            .map(|name| (name.to_string(), Mutex::new(None)))
            .collect();
        Self {
            store,
            assumer,
            cells,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
        }
    }

    /// Rebuild delegated sessions once they are within `margin` of expiring.
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    /// Resolve `profile` into a session for `region`.
    ///
    /// A second call for the same profile and region returns the cached
    /// session without contacting the identity service.
    pub async fn resolve(&self, profile: &str, region: &str) -> Result<Session, ResolutionError> {
        self.resolve_profile(profile, region).await
    }

    fn resolve_profile<'a>(&'a self, name: &'a str, region: &'a str) -> ResolveFuture<'a> {
        Box::pin(async move {
            let (Some(profile), Some(cell)) = (self.store.get(name), self.cells.get(name)) else {
                return Err(ResolutionError::UnknownProfile {
                    profile: name.to_string(),
                });
            };

            let mut cached = cell.lock().await;
            if let Some(session) = cached.as_ref() {
                if session.region() == region
                    && !session.expires_within(self.refresh_margin, Utc::now())
                {
                    debug!("Reusing cached session for {} in {}", name, region);
                    return Ok(session.clone());
                }
            }

            let session = match profile.kind() {
                ProfileKind::Direct(keys) => Session::from_static(name, region, keys).map_err(
                    |source| ResolutionError::InvalidCredentials {
                        profile: name.to_string(),
                        source,
                    },
                )?,
                ProfileKind::Assumed {
                    role_arn,
                    source_profile,
                } => {
                    self.assume(name, region, role_arn, source_profile)
                        .await?
                }
            };

            *cached = Some(session.clone());
            Ok(session)
        })
    }

    async fn assume(
        &self,
        name: &str,
        region: &str,
        role_arn: &str,
        parent: &str,
    ) -> Result<Session, ResolutionError> {
        if !self.store.contains(parent) {
            return Err(ResolutionError::ParentUnresolved {
                profile: name.to_string(),
                parent: parent.to_string(),
            });
        }

        let parent_session = self.resolve_profile(parent, region).await.map_err(|source| {
            ResolutionError::UpstreamConnect {
                profile: name.to_string(),
                parent: parent.to_string(),
                source: Box::new(source),
            }
        })?;

        let session_name = generate_session_name();
        debug!(
            "Assuming {} for profile {} as {} (parent {}, region {})",
            role_arn, name, session_name, parent, region
        );

        let assumed = self
            .assumer
            .assume_role(&parent_session, role_arn, &session_name)
            .await
            .map_err(|source| ResolutionError::AssumeRoleRejected {
                profile: name.to_string(),
                role: role_arn.to_string(),
                source,
            })?;

        let session = Session::from_assumed(name, region, assumed).map_err(|reason| {
            ResolutionError::SessionConstruction {
                profile: name.to_string(),
                role: role_arn.to_string(),
                reason,
            }
        })?;

        info!("Assumed {} for profile {} in {}", role_arn, name, region);
        Ok(session)
    }
}

/// Session name with a random suffix so concurrent assumptions of the same
/// role do not collide.
pub fn generate_session_name() -> String {
    let suffix: u64 = rand::thread_rng().gen();
    format!("{SESSION_NAME_PREFIX}-{suffix:016x}")
}

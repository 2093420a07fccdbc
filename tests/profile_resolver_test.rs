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

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tunneller::profile::{
    AssumeRoleError, AssumedCredentials, Profile, ProfileResolver, ProfileStore, ResolutionError,
    RoleAssumer, Session,
};
use zeroize::Zeroizing;

const ROLE: &str = "arn:aws:iam::111:role/X";

#[derive(Clone, Copy)]
enum Behavior {
    Grant { lifetime_secs: i64 },
    Reject,
    EmptyToken,
}

/// Records every assume-role call and answers according to `behavior`
struct FakeAssumer {
    behavior: Behavior,
    delay: Duration,
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, String, String, String)>>,
}

impl FakeAssumer {
    fn new(behavior: Behavior) -> Arc<Self> {
        Self::with_delay(behavior, Duration::ZERO)
    }

    fn with_delay(behavior: Behavior, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            delay,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// (parent profile, parent region, role, session name) per call
    fn seen(&self) -> Vec<(String, String, String, String)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoleAssumer for FakeAssumer {
    async fn assume_role(
        &self,
        parent: &Session,
        role_arn: &str,
        session_name: &str,
    ) -> Result<AssumedCredentials, AssumeRoleError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push((
            parent.profile().to_string(),
            parent.region().to_string(),
            role_arn.to_string(),
            session_name.to_string(),
        ));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.behavior {
            Behavior::Grant { lifetime_secs } => Ok(AssumedCredentials {
                access_key_id: format!("ASIATEMP{n:04}"),
                secret_access_key: Zeroizing::new(format!("temp-secret-{n}")),
                session_token: Zeroizing::new(format!("temp-token-{n}")),
                expiration: Some(Utc::now() + ChronoDuration::seconds(lifetime_secs)),
            }),
            Behavior::Reject => Err(AssumeRoleError::Rejected(
                "AccessDenied: not authorized to perform sts:AssumeRole".to_string(),
            )),
            Behavior::EmptyToken => Ok(AssumedCredentials {
                access_key_id: "ASIATEMP".to_string(),
                secret_access_key: Zeroizing::new("temp-secret".to_string()),
                session_token: Zeroizing::new(String::new()),
                expiration: None,
            }),
        }
    }
}

fn grant_for_an_hour() -> Behavior {
    Behavior::Grant {
        lifetime_secs: 3600,
    }
}

fn base_and_ops() -> ProfileStore {
    ProfileStore::from_profiles([
        Profile::direct("base", "AAA", "BBB"),
        Profile::assumed("ops", ROLE, "base"),
    ])
    .unwrap()
}

fn build_resolver(store: ProfileStore, assumer: &Arc<FakeAssumer>) -> ProfileResolver {
    ProfileResolver::new(Arc::new(store), assumer.clone())
}

#[tokio::test]
async fn test_assumed_profile_scenario() {
    let assumer = FakeAssumer::new(grant_for_an_hour());
    let resolver = build_resolver(base_and_ops(), &assumer);

    let session = resolver.resolve("ops", "us-east-1").await.unwrap();

    assert_eq!(session.profile(), "ops");
    assert_eq!(session.region(), "us-east-1");
    assert!(session.is_delegated());
    assert_eq!(session.credentials().access_key_id(), "ASIATEMP0001");
    assert_eq!(session.credentials().session_token(), Some("temp-token-1"));

    let seen = assumer.seen();
    assert_eq!(seen.len(), 1);
    let (parent, parent_region, role, session_name) = &seen[0];
    assert_eq!(parent, "base");
    assert_eq!(parent_region, "us-east-1");
    assert_eq!(role, ROLE);
    assert!(session_name.starts_with("tunneller-"));
}

#[tokio::test]
async fn test_direct_profile_needs_no_identity_service() {
    let assumer = FakeAssumer::new(grant_for_an_hour());
    let resolver = build_resolver(base_and_ops(), &assumer);

    let first = resolver.resolve("base", "us-east-1").await.unwrap();
    let second = resolver.resolve("base", "us-east-1").await.unwrap();

    assert_eq!(assumer.calls(), 0);
    assert!(!first.is_delegated());
    assert_eq!(first.credentials().access_key_id(), "AAA");
    assert_eq!(first.credentials().secret_access_key(), "BBB");
    assert_eq!(
        first.credentials().access_key_id(),
        second.credentials().access_key_id()
    );
    assert_eq!(first.credentials().session_token(), None);
}

#[tokio::test]
async fn test_missing_parent_fails_before_any_call() {
    let store = ProfileStore::from_profiles([Profile::assumed("ops", ROLE, "base")]).unwrap();
    let assumer = FakeAssumer::new(grant_for_an_hour());
    let resolver = build_resolver(store, &assumer);

    let err = resolver.resolve("ops", "us-east-1").await.unwrap_err();

    assert!(matches!(
        &err,
        ResolutionError::ParentUnresolved { profile, parent } if profile == "ops" && parent == "base"
    ));
    assert_eq!(assumer.calls(), 0);
}

#[tokio::test]
async fn test_malformed_parent_fails_before_any_call() {
    let store = ProfileStore::from_profiles([
        Profile::direct("base", "AAA", ""),
        Profile::assumed("ops", ROLE, "base"),
    ])
    .unwrap();
    let assumer = FakeAssumer::new(grant_for_an_hour());
    let resolver = build_resolver(store, &assumer);

    let err = resolver.resolve("ops", "us-east-1").await.unwrap_err();

    match &err {
        ResolutionError::UpstreamConnect {
            profile,
            parent,
            source,
        } => {
            assert_eq!(profile, "ops");
            assert_eq!(parent, "base");
            assert!(matches!(
                **source,
                ResolutionError::InvalidCredentials { .. }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(assumer.calls(), 0);
    assert!(err
        .to_string()
        .starts_with("resolving ops: resolving parent base:"));
}

#[tokio::test]
async fn test_same_region_is_cached() {
    let assumer = FakeAssumer::new(grant_for_an_hour());
    let resolver = build_resolver(base_and_ops(), &assumer);

    let first = resolver.resolve("ops", "us-east-1").await.unwrap();
    let second = resolver.resolve("ops", "us-east-1").await.unwrap();

    assert_eq!(assumer.calls(), 1);
    assert_eq!(
        first.credentials().access_key_id(),
        second.credentials().access_key_id()
    );
}

#[tokio::test]
async fn test_region_change_re_derives() {
    let assumer = FakeAssumer::new(grant_for_an_hour());
    let resolver = build_resolver(base_and_ops(), &assumer);

    let east = resolver.resolve("ops", "us-east-1").await.unwrap();
    let west = resolver.resolve("ops", "eu-west-1").await.unwrap();

    assert_eq!(assumer.calls(), 2);
    assert_eq!(east.region(), "us-east-1");
    assert_eq!(west.region(), "eu-west-1");
    assert_ne!(
        east.credentials().access_key_id(),
        west.credentials().access_key_id()
    );

    // The parent was resolved for the new region too
    let seen = assumer.seen();
    assert_eq!(seen[1].1, "eu-west-1");
    // Each call used its own session name
    assert_ne!(seen[0].3, seen[1].3);
}

#[tokio::test]
async fn test_rejected_assumption() {
    let assumer = FakeAssumer::new(Behavior::Reject);
    let resolver = build_resolver(base_and_ops(), &assumer);

    let err = resolver.resolve("ops", "us-east-1").await.unwrap_err();

    assert!(matches!(
        &err,
        ResolutionError::AssumeRoleRejected { profile, role, .. } if profile == "ops" && role == ROLE
    ));
    assert!(err.to_string().contains("AccessDenied"));

    // Failures are not cached
    let _ = resolver.resolve("ops", "us-east-1").await.unwrap_err();
    assert_eq!(assumer.calls(), 2);
}

#[tokio::test]
async fn test_unusable_assumed_credentials() {
    let assumer = FakeAssumer::new(Behavior::EmptyToken);
    let resolver = build_resolver(base_and_ops(), &assumer);

    let err = resolver.resolve("ops", "us-east-1").await.unwrap_err();

    match err {
        ResolutionError::SessionConstruction { profile, reason, .. } => {
            assert_eq!(profile, "ops");
            assert!(reason.contains("session token"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unknown_profile() {
    let assumer = FakeAssumer::new(grant_for_an_hour());
    let resolver = build_resolver(base_and_ops(), &assumer);

    let err = resolver.resolve("nope", "us-east-1").await.unwrap_err();
    assert!(matches!(err, ResolutionError::UnknownProfile { .. }));
    assert_eq!(assumer.calls(), 0);
}

#[tokio::test]
async fn test_three_level_chain() {
    let store = ProfileStore::from_profiles([
        Profile::direct("root", "AAA", "BBB"),
        Profile::assumed("mid", "arn:aws:iam::222:role/Mid", "root"),
        Profile::assumed("leaf", "arn:aws:iam::333:role/Leaf", "mid"),
    ])
    .unwrap();
    let assumer = FakeAssumer::new(grant_for_an_hour());
    let resolver = build_resolver(store, &assumer);

    let leaf = resolver.resolve("leaf", "us-east-1").await.unwrap();
    assert_eq!(leaf.profile(), "leaf");

    let seen = assumer.seen();
    assert_eq!(seen.len(), 2);
    // Innermost role first, assumed with the direct profile's keys
    assert_eq!(seen[0].0, "root");
    assert_eq!(seen[0].2, "arn:aws:iam::222:role/Mid");
    assert_eq!(seen[1].0, "mid");
    assert_eq!(seen[1].2, "arn:aws:iam::333:role/Leaf");

    // The intermediate session is cached as a side effect
    resolver.resolve("mid", "us-east-1").await.unwrap();
    assert_eq!(assumer.calls(), 2);
}

#[tokio::test]
async fn test_error_chain_through_three_levels() {
    let store = ProfileStore::from_profiles([
        Profile::assumed("mid", "arn:aws:iam::222:role/Mid", "root"),
        Profile::assumed("leaf", "arn:aws:iam::333:role/Leaf", "mid"),
    ])
    .unwrap();
    let assumer = FakeAssumer::new(grant_for_an_hour());
    let resolver = build_resolver(store, &assumer);

    let err = resolver.resolve("leaf", "us-east-1").await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "resolving leaf: resolving parent mid: parent profile root is not defined"
    );
    assert_eq!(err.chain(), vec!["leaf", "mid"]);
    assert!(matches!(
        err.root_cause(),
        ResolutionError::ParentUnresolved { .. }
    ));
    assert_eq!(assumer.calls(), 0);
}

#[tokio::test]
async fn test_expiring_session_is_refreshed() {
    // Granted sessions last one minute, inside the default five-minute margin
    let assumer = FakeAssumer::new(Behavior::Grant { lifetime_secs: 60 });
    let resolver = build_resolver(base_and_ops(), &assumer);

    resolver.resolve("ops", "us-east-1").await.unwrap();
    resolver.resolve("ops", "us-east-1").await.unwrap();
    assert_eq!(assumer.calls(), 2);

    let assumer = FakeAssumer::new(Behavior::Grant { lifetime_secs: 60 });
    let resolver =
        build_resolver(base_and_ops(), &assumer).with_refresh_margin(Duration::from_secs(10));

    resolver.resolve("ops", "us-east-1").await.unwrap();
    resolver.resolve("ops", "us-east-1").await.unwrap();
    assert_eq!(assumer.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_resolution_assumes_once() {
    let assumer = FakeAssumer::with_delay(grant_for_an_hour(), Duration::from_millis(50));
    let resolver = Arc::new(build_resolver(base_and_ops(), &assumer));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move { resolver.resolve("ops", "us-east-1").await })
        })
        .collect();

    for task in tasks {
        let session = task.await.unwrap().unwrap();
        assert_eq!(session.credentials().access_key_id(), "ASIATEMP0001");
    }
    assert_eq!(assumer.calls(), 1);
}

#[tokio::test]
async fn test_store_parsed_from_credentials_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials");
    std::fs::write(
        &path,
        "[base]\naws_access_key_id = AAA\naws_secret_access_key = BBB\n\n\
         [profile ops]\nrole_arn = arn:aws:iam::111:role/X\nsource_profile = base\n\n\
         [sso-only]\nsso_start_url = https://example.awsapps.com/start\n",
    )
    .unwrap();

    let store = ProfileStore::load(&path).await.unwrap();
    assert_eq!(store.len(), 2);
    assert!(!store.contains("sso-only"));

    let assumer = FakeAssumer::new(grant_for_an_hour());
    let resolver = build_resolver(store, &assumer);
    let session = resolver.resolve("ops", "us-east-1").await.unwrap();
    assert_eq!(session.profile(), "ops");
    assert_eq!(assumer.seen()[0].2, ROLE);
}

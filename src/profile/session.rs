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

//! Region-scoped credential sessions.

use super::error::ConfigError;
use super::store::StaticKeys;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

/// Temporary credentials returned by a role assumption.
#[derive(Clone)]
pub struct AssumedCredentials {
    pub access_key_id: String,
    pub secret_access_key: Zeroizing<String>,
    pub session_token: Zeroizing<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl fmt::Debug for AssumedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumedCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

/// Key material bound into a [`Session`].
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: Zeroizing<String>,
    session_token: Option<Zeroizing<String>>,
    expiration: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    /// Present only for delegated (assumed-role) credentials.
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_ref().map(|t| t.as_str())
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

/// Live credentials of one profile, valid for a single region.
///
/// Cloning is cheap; the key material is shared.
#[derive(Debug, Clone)]
pub struct Session {
    profile: String,
    region: String,
    credentials: Arc<Credentials>,
}

impl Session {
    /// Bind a static key pair to `region`. Performs no I/O.
    pub fn from_static(
        profile: &str,
        region: &str,
        keys: &StaticKeys,
    ) -> Result<Self, ConfigError> {
        validate_secret(profile, "aws_access_key_id", &keys.access_key_id)?;
        validate_secret(profile, "aws_secret_access_key", &keys.secret_access_key)?;

        Ok(Self {
            profile: profile.to_string(),
            region: region.to_string(),
            credentials: Arc::new(Credentials {
                access_key_id: keys.access_key_id.clone(),
                secret_access_key: keys.secret_access_key.clone(),
                session_token: None,
                expiration: None,
            }),
        })
    }

    /// Wrap credentials returned by a role assumption.
    ///
    /// Fails with a description of the problem when any part of the returned
    /// material is empty or not printable.
    pub fn from_assumed(
        profile: &str,
        region: &str,
        assumed: AssumedCredentials,
    ) -> Result<Self, String> {
        for (field, value) in [
            ("access key id", assumed.access_key_id.as_str()),
            ("secret access key", assumed.secret_access_key.as_str()),
            ("session token", assumed.session_token.as_str()),
        ] {
            if let Some(problem) = secret_problem(value) {
                return Err(format!("{field} {problem}"));
            }
        }

        Ok(Self {
            profile: profile.to_string(),
            region: region.to_string(),
            credentials: Arc::new(Credentials {
                access_key_id: assumed.access_key_id,
                secret_access_key: assumed.secret_access_key,
                session_token: Some(assumed.session_token),
                expiration: assumed.expiration,
            }),
        })
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Whether these credentials came from a role assumption.
    pub fn is_delegated(&self) -> bool {
        self.credentials.session_token.is_some()
    }

    /// True when the session expires before `now + margin`.
    ///
    /// Sessions without an expiry never expire.
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        let Some(expiration) = self.credentials.expiration else {
            return false;
        };
        let Ok(margin) = chrono::Duration::from_std(margin) else {
            return true;
        };
        match now.checked_add_signed(margin) {
            Some(deadline) => expiration <= deadline,
            None => true,
        }
    }

    /// Access key id with all but the last four characters masked.
    pub fn masked_access_key(&self) -> String {
        crate::utils::mask_key(&self.credentials.access_key_id)
    }
}

fn validate_secret(profile: &str, field: &'static str, value: &str) -> Result<(), ConfigError> {
    match secret_problem(value) {
        Some(reason) => Err(ConfigError::MalformedSecret {
            profile: profile.to_string(),
            field,
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn secret_problem(value: &str) -> Option<&'static str> {
    if value.is_empty() {
        Some("is empty")
    } else if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Some("contains whitespace or control characters")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assumed(token: &str, expiration: Option<DateTime<Utc>>) -> AssumedCredentials {
        AssumedCredentials {
            access_key_id: "ASIATEMP".to_string(),
            secret_access_key: Zeroizing::new("tmp-secret".to_string()),
            session_token: Zeroizing::new(token.to_string()),
            expiration,
        }
    }

    #[test]
    fn test_static_session_is_region_bound() {
        let session =
            Session::from_static("base", "us-east-1", &StaticKeys::new("AAA", "BBB")).unwrap();
        assert_eq!(session.region(), "us-east-1");
        assert_eq!(session.profile(), "base");
        assert!(!session.is_delegated());
        assert_eq!(session.credentials().secret_access_key(), "BBB");
    }

    #[test]
    fn test_static_session_rejects_empty_secret() {
        let err = Session::from_static("base", "us-east-1", &StaticKeys::new("AAA", ""))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MalformedSecret {
                field: "aws_secret_access_key",
                ..
            }
        ));
    }

    #[test]
    fn test_static_session_rejects_whitespace_in_key_id() {
        assert!(Session::from_static("base", "r", &StaticKeys::new("AA A", "BBB")).is_err());
    }

    #[test]
    fn test_assumed_session_requires_token() {
        let err = Session::from_assumed("ops", "us-east-1", assumed("", None)).unwrap_err();
        assert_eq!(err, "session token is empty");

        let session = Session::from_assumed("ops", "us-east-1", assumed("tok", None)).unwrap();
        assert!(session.is_delegated());
        assert_eq!(session.credentials().session_token(), Some("tok"));
    }

    #[test]
    fn test_expiry_window() {
        let now = Utc::now();
        let session = Session::from_assumed(
            "ops",
            "us-east-1",
            assumed("tok", Some(now + chrono::Duration::minutes(10))),
        )
        .unwrap();

        assert!(!session.expires_within(Duration::from_secs(60), now));
        assert!(session.expires_within(Duration::from_secs(900), now));

        let forever = Session::from_assumed("ops", "us-east-1", assumed("tok", None)).unwrap();
        assert!(!forever.expires_within(Duration::from_secs(u64::MAX), now));
    }

    #[test]
    fn test_masked_access_key() {
        let session =
            Session::from_static("base", "eu-west-1", &StaticKeys::new("AKIAABCDWXYZ", "s"))
                .unwrap();
        assert_eq!(session.masked_access_key(), "********WXYZ");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let session = Session::from_assumed("ops", "r", assumed("very-secret-token", None)).unwrap();
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("very-secret-token"));
        assert!(!rendered.contains("tmp-secret"));
    }
}

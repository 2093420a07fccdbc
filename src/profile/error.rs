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

//! Error types for loading and resolving credential profiles.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading the profile definitions or validating the
/// secret material they hold.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The credentials file could not be read
    #[error("failed to read credentials file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line of the credentials file is not valid INI syntax
    #[error("{origin}:{line}: {message}")]
    Syntax {
        origin: String,
        line: usize,
        message: String,
    },

    /// Following `source_profile` references leads back to a profile already visited
    #[error("credential loop detected: {} -> {next}", chain.join(" -> "))]
    CredentialLoop { chain: Vec<String>, next: String },

    /// Stored key material cannot be used to build a session
    #[error("profile {profile} has a malformed {field}: {reason}")]
    MalformedSecret {
        profile: String,
        field: &'static str,
        reason: String,
    },
}

/// Failure reported by a [`RoleAssumer`](super::RoleAssumer) implementation.
#[derive(Debug, Error)]
pub enum AssumeRoleError {
    /// The identity service refused the request (trust policy, permissions, ...)
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The identity service could not be reached or answered with garbage
    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

/// Errors produced while turning a profile name into a live session.
///
/// Every variant names the profile being resolved; chained failures nest the
/// parent's error so the rendered message reads
/// `resolving ops: resolving parent base: ...`.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("resolving {profile}: profile is not defined")]
    UnknownProfile { profile: String },

    #[error("resolving {profile}: {source}")]
    InvalidCredentials {
        profile: String,
        #[source]
        source: ConfigError,
    },

    #[error("resolving {profile}: parent profile {parent} is not defined")]
    ParentUnresolved { profile: String, parent: String },

    #[error("resolving {profile}: resolving parent {parent}: {}", strip_prefix(.source, .parent))]
    UpstreamConnect {
        profile: String,
        parent: String,
        #[source]
        source: Box<ResolutionError>,
    },

    #[error("resolving {profile}: assuming role {role} failed: {source}")]
    AssumeRoleRejected {
        profile: String,
        role: String,
        #[source]
        source: AssumeRoleError,
    },

    #[error("resolving {profile}: role {role} returned an unusable session: {reason}")]
    SessionConstruction {
        profile: String,
        role: String,
        reason: String,
    },
}

impl ResolutionError {
    /// Name of the profile this error was raised for.
    pub fn profile(&self) -> &str {
        match self {
            Self::UnknownProfile { profile }
            | Self::InvalidCredentials { profile, .. }
            | Self::ParentUnresolved { profile, .. }
            | Self::UpstreamConnect { profile, .. }
            | Self::AssumeRoleRejected { profile, .. }
            | Self::SessionConstruction { profile, .. } => profile,
        }
    }

    /// Profiles attempted, outermost first.
    pub fn chain(&self) -> Vec<&str> {
        let mut chain = vec![self.profile()];
        let mut current = self;
        while let Self::UpstreamConnect { source, .. } = current {
            chain.push(source.profile());
            current = source;
        }
        chain
    }

    /// The innermost error of a parent chain.
    pub fn root_cause(&self) -> &ResolutionError {
        let mut current = self;
        while let Self::UpstreamConnect { source, .. } = current {
            current = source;
        }
        current
    }
}

/// The nested error already starts with `resolving <parent>: `; drop it so the
/// parent name is not printed twice.
fn strip_prefix(source: &ResolutionError, parent: &str) -> String {
    let rendered = source.to_string();
    let prefix = format!("resolving {parent}: ");
    match rendered.strip_prefix(&prefix) {
        Some(rest) => rest.to_string(),
        None => rendered,
    }
}

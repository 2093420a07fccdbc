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

//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::endpoint::{DEFAULT_KEY_TTL, DEFAULT_OS_USER};
use crate::profile::resolver::DEFAULT_REFRESH_MARGIN;
use crate::ssh::known_hosts::StrictHostKeyChecking;
use crate::tunnel::{
    DEFAULT_ACCEPT_POLL_INTERVAL, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DRAIN_TIMEOUT, DEFAULT_RELAY_LINGER,
};

/// Default local port the tunnel listens on
pub const DEFAULT_LOCAL_PORT: u16 = 8888;

/// Default program used to reach the cloud provider
pub const DEFAULT_AWS_CLI: &str = "aws";

/// Main configuration structure.
///
/// Every field is optional in the file; accessors fall back to the built-in
/// defaults. Command line flags override whatever is returned here.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Profile definitions file. `~` is expanded.
    pub credentials_file: Option<String>,
    pub profile: Option<String>,
    pub region: Option<String>,
    /// Bastion instance identifier
    pub bastion: Option<String>,
    /// Database instance identifier
    pub database: Option<String>,
    pub local_port: Option<u16>,
    pub os_user: Option<String>,
    pub key_ttl_secs: Option<u64>,
    pub accept_poll_ms: Option<u64>,
    pub relay_linger_secs: Option<u64>,
    pub drain_timeout_secs: Option<u64>,
    pub session_refresh_margin_secs: Option<u64>,
    pub strict_host_key_checking: Option<StrictHostKeyChecking>,
    pub connect_timeout_secs: Option<u64>,
    pub aws_cli: Option<String>,
}

impl Config {
    pub fn local_port(&self) -> u16 {
        self.local_port.unwrap_or(DEFAULT_LOCAL_PORT)
    }

    pub fn os_user(&self) -> &str {
        self.os_user.as_deref().unwrap_or(DEFAULT_OS_USER)
    }

    pub fn key_ttl(&self) -> Duration {
        self.key_ttl_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_KEY_TTL)
    }

    /// Poll interval of the accept loop. Zero is raised to one millisecond.
    pub fn accept_poll_interval(&self) -> Duration {
        match self.accept_poll_ms {
            Some(ms) => Duration::from_millis(ms.max(1)),
            None => DEFAULT_ACCEPT_POLL_INTERVAL,
        }
    }

    pub fn relay_linger(&self) -> Duration {
        self.relay_linger_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RELAY_LINGER)
    }

    /// How long `connect` waits for open relays after Ctrl-C
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_DRAIN_TIMEOUT)
    }

    pub fn session_refresh_margin(&self) -> Duration {
        self.session_refresh_margin_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REFRESH_MARGIN)
    }

    pub fn strict_host_key_checking(&self) -> StrictHostKeyChecking {
        self.strict_host_key_checking.unwrap_or_default()
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn aws_cli(&self) -> &str {
        self.aws_cli.as_deref().unwrap_or(DEFAULT_AWS_CLI)
    }

    /// Credentials file named in the config, with `~` expanded.
    pub fn credentials_file(&self) -> Option<PathBuf> {
        self.credentials_file
            .as_deref()
            .map(|path| super::utils::expand_tilde(std::path::Path::new(path)))
    }
}

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

//! Endpoints of the double hop and the capabilities that produce them
//!
//! The target endpoint is a plain `host:port` reached from inside the bastion.
//! The bastion endpoint additionally carries the SSH credentials used for
//! every hop through it: a freshly generated Ed25519 key whose public half has
//! been pushed to the instance for a bounded time.

pub mod error;

pub use error::{DiscoveryError, EndpointError, ProvisioningError};

use async_trait::async_trait;
use russh::keys::{Algorithm, HashAlg, PrivateKey};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_OS_USER: &str = "ec2-user";
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(60);

/// Network address of a compute instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceAddress {
    pub address: String,
}

/// Network address of a managed database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseAddress {
    pub address: String,
    pub port: u16,
}

/// Read-only inventory lookups.
#[async_trait]
pub trait InstanceDiscovery: Send + Sync {
    async fn discover_instance(&self, instance_id: &str) -> Result<InstanceAddress, DiscoveryError>;

    async fn discover_database(&self, database_id: &str) -> Result<DatabaseAddress, DiscoveryError>;
}

/// Authorizes a public key for `os_user` on an instance for `ttl`.
#[async_trait]
pub trait KeyProvisioner: Send + Sync {
    /// Returns how long the key is actually authorized for, which backends
    /// with a fixed grant may report as different from `ttl`.
    async fn push_key(
        &self,
        instance_id: &str,
        os_user: &str,
        public_key: &str,
        ttl: Duration,
    ) -> Result<Duration, ProvisioningError>;
}

/// Plain TCP destination reached through the bastion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEndpoint {
    pub host: String,
    pub port: u16,
}

impl TargetEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for TargetEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl std::str::FromStr for TargetEndpoint {
    type Err = String;

    /// Parses `host:port`; IPv6 literals must be bracketed (`[::1]:5432`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got '{s}'"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(format!("missing host in '{s}'"));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| format!("invalid port '{port}' in '{s}'"))?;
        if port == 0 {
            return Err(format!("port must be non-zero in '{s}'"));
        }
        Ok(Self::new(host, port))
    }
}

/// SSH login material for a bastion
#[derive(Clone)]
pub struct SshAuth {
    pub user: String,
    pub key: Arc<PrivateKey>,
}

impl SshAuth {
    pub fn fingerprint(&self) -> String {
        self.key.public_key().fingerprint(HashAlg::Sha256).to_string()
    }
}

impl fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshAuth")
            .field("user", &self.user)
            .field("key", &self.fingerprint())
            .finish()
    }
}

/// SSH-reachable intermediary host with its login material
#[derive(Debug, Clone)]
pub struct BastionEndpoint {
    pub instance_id: String,
    pub host: String,
    pub port: u16,
    pub auth: SshAuth,
    /// Lifetime granted to the key by its push
    pub key_lifetime: Duration,
}

impl fmt::Display for BastionEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.auth.user, self.host, self.port)
    }
}

/// Options for [`bastion_endpoint`]
#[derive(Debug, Clone)]
pub struct BastionOptions {
    pub os_user: String,
    pub key_ttl: Duration,
    pub ssh_port: u16,
}

impl Default for BastionOptions {
    fn default() -> Self {
        Self {
            os_user: DEFAULT_OS_USER.to_string(),
            key_ttl: DEFAULT_KEY_TTL,
            ssh_port: DEFAULT_SSH_PORT,
        }
    }
}

/// Build a dial-able bastion endpoint.
///
/// Looks up the instance address, generates a fresh Ed25519 key, and pushes
/// its public half for `options.os_user`. Any failure aborts immediately; no
/// endpoint is produced and nothing is retried.
pub async fn bastion_endpoint(
    instance_id: &str,
    discovery: &dyn InstanceDiscovery,
    provisioner: &dyn KeyProvisioner,
    options: &BastionOptions,
) -> Result<BastionEndpoint, EndpointError> {
    let address = discovery.discover_instance(instance_id).await?;
    debug!("Bastion {} resolved to {}", instance_id, address.address);

    let key = generate_ephemeral_key()?;
    let public_key = key
        .public_key()
        .to_openssh()
        .map_err(|e| EndpointError::KeyGeneration(e.to_string()))?;

    let key_lifetime = provisioner
        .push_key(instance_id, &options.os_user, &public_key, options.key_ttl)
        .await?;

    let auth = SshAuth {
        user: options.os_user.clone(),
        key: Arc::new(key),
    };
    info!(
        "Authorized ephemeral key {} for {}@{} ({}s)",
        auth.fingerprint(),
        options.os_user,
        instance_id,
        key_lifetime.as_secs()
    );

    Ok(BastionEndpoint {
        instance_id: instance_id.to_string(),
        host: address.address,
        port: options.ssh_port,
        auth,
        key_lifetime,
    })
}

/// Look up the database endpoint to forward to.
pub async fn target_endpoint(
    database_id: &str,
    discovery: &dyn InstanceDiscovery,
) -> Result<TargetEndpoint, DiscoveryError> {
    let db = discovery.discover_database(database_id).await?;
    debug!("Database {} resolved to {}:{}", database_id, db.address, db.port);
    Ok(TargetEndpoint::new(db.address, db.port))
}

fn generate_ephemeral_key() -> Result<PrivateKey, EndpointError> {
    PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
        .map_err(|e| EndpointError::KeyGeneration(e.to_string()))
}

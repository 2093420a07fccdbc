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

//! SSH client connection to a bastion host.
//!
//! This module handles address resolution, the transport handshake, host key
//! verification, public key authentication, and opening `direct-tcpip`
//! channels through the established session.

use russh::client::{Config, Handle, Handler, Msg};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg, PublicKey};
use russh::Channel;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::SshError;

/// Originator reported for forwarded channels when the caller has none
const DEFAULT_ORIGINATOR: (&str, u32) = ("127.0.0.1", 0);

/// How to verify the server's host key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ServerCheckMethod {
    NoCheck,
    /// Check against a known_hosts file (`None` means `~/.ssh/known_hosts`),
    /// optionally recording hosts seen for the first time.
    KnownHosts {
        path: Option<PathBuf>,
        learn_new: bool,
    },
}

/// An authenticated SSH session to a remote server.
#[derive(Clone)]
pub struct Client {
    connection_handle: Arc<Handle<ClientHandler>>,
    username: String,
    address: SocketAddr,
}

impl Client {
    /// Open a ssh connection to `host:port` and authenticate with `key`.
    ///
    /// If the host resolves to multiple addresses, each is tried in turn until
    /// one completes the handshake. Authentication is attempted once on that
    /// connection and the whole process aborts if it fails.
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        key: Arc<PrivateKey>,
        server_check: ServerCheckMethod,
        config: Arc<Config>,
    ) -> Result<Self, SshError> {
        let socket_addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|source| SshError::AddressInvalid {
                host: host.to_string(),
                source,
            })?;

        let mut connect_res = Err(SshError::NoAddress {
            host: host.to_string(),
        });
        for socket_addr in socket_addrs {
            let handler = ClientHandler::new(host.to_string(), socket_addr, server_check.clone());
            match russh::client::connect(config.clone(), socket_addr, handler).await {
                Ok(h) => {
                    connect_res = Ok((socket_addr, h));
                    break;
                }
                Err(e) => {
                    debug!("SSH connect to {} failed: {}", socket_addr, e);
                    connect_res = Err(e);
                }
            }
        }
        let (address, mut handle) = connect_res?;

        authenticate(&mut handle, username, key).await?;

        Ok(Self {
            connection_handle: Arc::new(handle),
            username: username.to_string(),
            address,
        })
    }

    /// Open a TCP/IP forwarding channel.
    ///
    /// `host` is resolved by the server, so names that only exist inside the
    /// remote network are fine.
    pub async fn open_direct_tcpip_channel(
        &self,
        host: &str,
        port: u16,
        originator: Option<SocketAddr>,
    ) -> Result<Channel<Msg>, SshError> {
        let (orig_host, orig_port) = originator
            .map(|src| (src.ip().to_string(), u32::from(src.port())))
            .unwrap_or_else(|| (DEFAULT_ORIGINATOR.0.to_string(), DEFAULT_ORIGINATOR.1));

        self.connection_handle
            .channel_open_direct_tcpip(host, u32::from(port), orig_host, orig_port)
            .await
            .map_err(|source| SshError::ChannelOpen {
                target: format!("{host}:{port}"),
                source,
            })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn address(&self) -> &SocketAddr {
        &self.address
    }

    /// Disconnect from the remote host.
    pub async fn disconnect(&self) -> Result<(), SshError> {
        self.connection_handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
            .map_err(SshError::Ssh)
    }
}

impl Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("username", &self.username)
            .field("address", &self.address)
            .field("connection_handle", &"Handle<ClientHandler>")
            .finish()
    }
}

async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    username: &str,
    key: Arc<PrivateKey>,
) -> Result<(), SshError> {
    let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
    let result = handle
        .authenticate_publickey(username, PrivateKeyWithHashAlg::new(key, hash_alg))
        .await?;
    if !result.success() {
        return Err(SshError::KeyAuthFailed {
            user: username.to_string(),
        });
    }
    debug!("Authenticated as {}", username);
    Ok(())
}

/// SSH client handler for managing server key verification.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    host: SocketAddr,
    server_check: ServerCheckMethod,
}

impl ClientHandler {
    pub fn new(hostname: String, host: SocketAddr, server_check: ServerCheckMethod) -> Self {
        Self {
            hostname,
            host,
            server_check,
        }
    }

    fn verify_known_host(
        &self,
        server_public_key: &PublicKey,
        path: Option<&PathBuf>,
        learn_new: bool,
    ) -> bool {
        let port = self.host.port();
        let verdict = match path {
            Some(path) => {
                russh::keys::check_known_hosts_path(&self.hostname, port, server_public_key, path)
            }
            None => russh::keys::check_known_hosts(&self.hostname, port, server_public_key),
        };

        match verdict {
            Ok(true) => true,
            Ok(false) if learn_new => {
                let learned = match path {
                    Some(path) => russh::keys::known_hosts::learn_known_hosts_path(
                        &self.hostname,
                        port,
                        server_public_key,
                        path,
                    ),
                    None => russh::keys::known_hosts::learn_known_hosts(
                        &self.hostname,
                        port,
                        server_public_key,
                    ),
                };
                match learned {
                    Ok(()) => info!("Added host key for {} to known hosts", self.hostname),
                    Err(e) => warn!("Could not record host key for {}: {}", self.hostname, e),
                }
                true
            }
            Ok(false) => {
                warn!("Host key for {} is not in known hosts", self.hostname);
                false
            }
            Err(e) => {
                warn!("Host key verification failed for {}: {}", self.hostname, e);
                false
            }
        }
    }
}

impl Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        match &self.server_check {
            ServerCheckMethod::NoCheck => Ok(true),
            ServerCheckMethod::KnownHosts { path, learn_new } => {
                Ok(self.verify_known_host(server_public_key, path.as_ref(), *learn_new))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh::keys::Algorithm;

    fn random_public_key() -> PublicKey {
        PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
            .unwrap()
            .public_key()
            .clone()
    }

    #[tokio::test]
    async fn test_no_check_accepts_any_key() {
        let mut handler = ClientHandler::new(
            "bastion".to_string(),
            "127.0.0.1:22".parse().unwrap(),
            ServerCheckMethod::NoCheck,
        );
        assert!(handler.check_server_key(&random_public_key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_known_hosts_learns_then_pins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");
        std::fs::write(&path, "").unwrap();
        let key = random_public_key();

        let mut strict = ClientHandler::new(
            "bastion.example".to_string(),
            "10.0.0.1:22".parse().unwrap(),
            ServerCheckMethod::KnownHosts {
                path: Some(path.clone()),
                learn_new: false,
            },
        );
        assert!(!strict.check_server_key(&key).await.unwrap());

        let mut learning = ClientHandler::new(
            "bastion.example".to_string(),
            "10.0.0.1:22".parse().unwrap(),
            ServerCheckMethod::KnownHosts {
                path: Some(path.clone()),
                learn_new: true,
            },
        );
        assert!(learning.check_server_key(&key).await.unwrap());

        // Now recorded, so strict mode accepts it and rejects a different key
        assert!(strict.check_server_key(&key).await.unwrap());
        assert!(!strict.check_server_key(&random_public_key()).await.unwrap());
    }
}

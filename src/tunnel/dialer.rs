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

//! Building the per-connection path to the target
//!
//! A [`HopDialer`] produces a byte stream that ends at the target endpoint.
//! [`SshHopDialer`] does this with a double hop: a fresh SSH session to the
//! bastion, then a `direct-tcpip` channel from the bastion to the target.
//! Sessions are not pooled; every relay pays its own handshake.
//!
//! Pushed keys are short-lived. With [`SshHopDialer::with_key_refresh`] the
//! dialer pushes the same public key again before a dial once the previous
//! authorization is about to lapse, so the bastion credentials stay the same
//! for the whole run. The lapse is judged by the lifetime the provisioner
//! reports it granted, not the one requested.

use super::error::DialError;
use crate::endpoint::{BastionEndpoint, EndpointError, KeyProvisioner, TargetEndpoint};
use crate::ssh::{Client, ServerCheckMethod};
use async_trait::async_trait;
use russh::client::{Config, Msg};
use russh::ChannelStream;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Default time allowed for the bastion handshake and authentication
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Interval of SSH keepalive messages on bastion sessions
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// A key authorization this close to lapsing is pushed again before dialing
const KEY_REFRESH_SLACK: Duration = Duration::from_secs(10);

/// A bidirectional byte stream ending at the target
pub trait HopStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> HopStream for T {}

pub type BoxedHop = Box<dyn HopStream>;

/// Opens the path from this host to the target for one relay.
#[async_trait]
pub trait HopDialer: Send + Sync + 'static {
    /// `peer` is the local client the path is built for.
    async fn dial(&self, target: &TargetEndpoint, peer: SocketAddr) -> Result<BoxedHop, DialError>;
}

/// Re-pushes the bastion key when its authorization runs out
struct KeyRefresher {
    provisioner: Arc<dyn KeyProvisioner>,
    public_key: String,
    ttl: Duration,
    grant: Mutex<KeyGrant>,
}

/// The authorization currently in force
struct KeyGrant {
    pushed_at: Instant,
    lifetime: Duration,
}

impl KeyGrant {
    fn lapses_within(&self, slack: Duration) -> bool {
        self.pushed_at.elapsed() + slack >= self.lifetime
    }
}

/// Double-hop dialer through an SSH bastion
pub struct SshHopDialer {
    bastion: BastionEndpoint,
    server_check: ServerCheckMethod,
    connect_timeout: Duration,
    config: Arc<Config>,
    key_refresh: Option<KeyRefresher>,
}

impl SshHopDialer {
    pub fn new(bastion: BastionEndpoint, server_check: ServerCheckMethod) -> Self {
        let config = Config {
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            ..Default::default()
        };
        Self {
            bastion,
            server_check,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            config: Arc::new(config),
            key_refresh: None,
        }
    }

    /// Push the bastion's public key again through `provisioner`, asking for
    /// `ttl`, whenever the current authorization is about to lapse.
    ///
    /// Assumes the key was pushed just before this call and was granted
    /// [`BastionEndpoint::key_lifetime`].
    pub fn with_key_refresh(
        mut self,
        provisioner: Arc<dyn KeyProvisioner>,
        ttl: Duration,
    ) -> Result<Self, EndpointError> {
        let public_key = self
            .bastion
            .auth
            .key
            .public_key()
            .to_openssh()
            .map_err(|e| EndpointError::KeyGeneration(e.to_string()))?;
        self.key_refresh = Some(KeyRefresher {
            provisioner,
            public_key,
            ttl,
            grant: Mutex::new(KeyGrant {
                pushed_at: Instant::now(),
                lifetime: self.bastion.key_lifetime,
            }),
        });
        Ok(self)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn bastion(&self) -> &BastionEndpoint {
        &self.bastion
    }

    async fn ensure_key_authorized(&self) -> Result<(), DialError> {
        let Some(refresher) = &self.key_refresh else {
            return Ok(());
        };

        // Held across the push so concurrent dials push at most once
        let mut grant = refresher.grant.lock().await;
        if !grant.lapses_within(KEY_REFRESH_SLACK) {
            return Ok(());
        }

        let bastion = &self.bastion;
        let lifetime = refresher
            .provisioner
            .push_key(
                &bastion.instance_id,
                &bastion.auth.user,
                &refresher.public_key,
                refresher.ttl,
            )
            .await
            .map_err(|source| DialError::KeyRefresh {
                bastion: bastion.to_string(),
                source,
            })?;
        *grant = KeyGrant {
            pushed_at: Instant::now(),
            lifetime,
        };
        debug!(
            "Re-authorized ephemeral key on {} for {}s",
            bastion,
            lifetime.as_secs()
        );
        Ok(())
    }

    async fn connect_bastion(&self) -> Result<Client, DialError> {
        self.ensure_key_authorized().await?;

        let bastion = &self.bastion;
        let connect = Client::connect(
            &bastion.host,
            bastion.port,
            &bastion.auth.user,
            Arc::clone(&bastion.auth.key),
            self.server_check.clone(),
            Arc::clone(&self.config),
        );

        let source = match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(client)) => return Ok(client),
            Ok(Err(e)) => e,
            Err(_) => crate::ssh::SshError::Timeout {
                host: bastion.host.clone(),
                secs: self.connect_timeout.as_secs(),
            },
        };
        Err(DialError::Bastion {
            bastion: bastion.to_string(),
            source,
        })
    }

    /// Connect and authenticate once, then hang up.
    ///
    /// Lets the caller fail before a listener exists when the bastion is
    /// unreachable or rejects the pushed key.
    pub async fn preflight(&self) -> Result<(), DialError> {
        let client = self.connect_bastion().await?;
        debug!("Preflight connection to {} succeeded", self.bastion);
        if let Err(e) = client.disconnect().await {
            debug!("Error closing preflight connection: {}", e);
        }
        Ok(())
    }
}

#[async_trait]
impl HopDialer for SshHopDialer {
    async fn dial(&self, target: &TargetEndpoint, peer: SocketAddr) -> Result<BoxedHop, DialError> {
        let client = self.connect_bastion().await?;
        debug!("connected to {} (1 of 2)", self.bastion);

        let channel = client
            .open_direct_tcpip_channel(&target.host, target.port, Some(peer))
            .await
            .map_err(|source| DialError::Target {
                target: target.to_string(),
                source,
            })?;
        debug!("connected to {} (2 of 2)", target);

        Ok(Box::new(SshHop {
            stream: Box::pin(channel.into_stream()),
            _client: client,
        }))
    }
}

/// Channel stream that keeps its SSH session alive for as long as it exists
struct SshHop {
    stream: Pin<Box<ChannelStream<Msg>>>,
    _client: Client,
}

impl AsyncRead for SshHop {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().stream.as_mut().poll_read(cx, buf)
    }
}

impl AsyncWrite for SshHop {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().stream.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().stream.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().stream.as_mut().poll_shutdown(cx)
    }
}

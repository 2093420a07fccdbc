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

//! Local tunnel listener and its lifecycle
//!
//! [`open_tunnel`] binds a loopback listener and spawns the accept loop;
//! [`serve_tunnel`] does the same over any [`Acceptor`]. Each accepted
//! connection gets its own relay task, which dials a fresh path to
//! the target through a [`HopDialer`] and pumps bytes until either side ends.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──bind──▶ Listening ──shutdown / fatal accept──▶ Closed
//!                      │
//!                      └── spawn relay per connection (independent)
//! ```
//!
//! - Binding failure returns [`TunnelError::Listen`] and spawns nothing.
//! - The accept loop waits on the listener for at most `accept_poll_interval`
//!   at a time while watching the shutdown token.
//! - A non-timeout accept error is fatal: it is delivered once through the
//!   [`DoneSignal`] and the listener is closed.
//! - Shutdown stops admission only. Relays already running are not cancelled;
//!   they finish when their sockets close. [`TunnelHandle::drain`] waits for
//!   them with a bound.

mod dialer;
pub mod error;
mod relay;

pub use dialer::{BoxedHop, HopDialer, HopStream, SshHopDialer, DEFAULT_CONNECT_TIMEOUT};
pub use error::{DialError, TunnelError};
pub use relay::{pump, RelayStats};

use crate::endpoint::TargetEndpoint;
use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace};

/// Longest single wait on the listener before the loop re-checks shutdown
pub const DEFAULT_ACCEPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long a relay keeps the second direction open after the first ends.
/// Zero closes both hops as soon as either side reaches end-of-stream.
pub const DEFAULT_RELAY_LINGER: Duration = Duration::ZERO;

/// How long the binary waits for relays to finish after shutdown
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Listener settings
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub bind_addr: IpAddr,
    pub accept_poll_interval: Duration,
    pub relay_linger: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            accept_poll_interval: DEFAULT_ACCEPT_POLL_INTERVAL,
            relay_linger: DEFAULT_RELAY_LINGER,
        }
    }
}

/// Source of inbound client connections
#[async_trait]
pub trait Acceptor: Send + 'static {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl Acceptor for TcpListener {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Write-once trigger for a graceful stop
#[derive(Debug, Clone)]
pub struct ShutdownSignal(CancellationToken);

impl ShutdownSignal {
    /// Stop accepting new connections. Repeated calls have no further effect.
    pub fn trigger(&self) {
        self.0.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Fires at most once, carrying the error that killed the tunnel
#[derive(Debug)]
pub struct DoneSignal(Option<oneshot::Receiver<TunnelError>>);

impl DoneSignal {
    /// Wait until the accept loop has ended.
    ///
    /// Returns the fatal error if there was one, `None` after a clean
    /// shutdown. Later calls return `None` immediately.
    pub async fn wait(&mut self) -> Option<TunnelError> {
        let receiver = self.0.take()?;
        receiver.await.ok()
    }
}

/// A running tunnel
#[derive(Debug)]
pub struct TunnelHandle {
    local_addr: SocketAddr,
    shutdown: ShutdownSignal,
    done: DoneSignal,
    relays: TaskTracker,
    accept_task: Option<JoinHandle<()>>,
}

impl TunnelHandle {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Request a graceful stop
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn done_signal(&mut self) -> &mut DoneSignal {
        &mut self.done
    }

    /// Number of relays still running
    pub fn active_relays(&self) -> usize {
        self.relays.len()
    }

    /// Wait for the accept loop to exit and the listener to be closed.
    pub async fn closed(&mut self) {
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                error!("Tunnel accept loop ended abnormally: {}", e);
            }
        }
    }

    /// Wait up to `timeout` for relays to finish on their own.
    ///
    /// Only meaningful once the tunnel is closed; returns `true` when every
    /// relay has finished.
    pub async fn drain(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.relays.wait()).await.is_ok()
    }
}

/// Bind `bind_addr:local_port` and start serving connections to `target`.
///
/// Passing port 0 binds an ephemeral port; see [`TunnelHandle::local_addr`].
pub async fn open_tunnel(
    local_port: u16,
    target: TargetEndpoint,
    dialer: Arc<dyn HopDialer>,
    config: TunnelConfig,
) -> Result<TunnelHandle, TunnelError> {
    let requested = SocketAddr::new(config.bind_addr, local_port);
    let listener = TcpListener::bind(requested)
        .await
        .map_err(|source| TunnelError::Listen {
            addr: requested,
            source,
        })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| TunnelError::Listen {
            addr: requested,
            source,
        })?;

    if !config.bind_addr.is_loopback() {
        tracing::warn!(
            "Tunnel listener bound to non-loopback address {}",
            local_addr
        );
    }

    Ok(serve_tunnel(listener, local_addr, target, dialer, config))
}

/// Start serving connections from `acceptor` to `target`.
///
/// `local_addr` is the address clients reach `acceptor` on. The acceptor is
/// dropped once the accept loop ends.
pub fn serve_tunnel<A: Acceptor>(
    acceptor: A,
    local_addr: SocketAddr,
    target: TargetEndpoint,
    dialer: Arc<dyn HopDialer>,
    config: TunnelConfig,
) -> TunnelHandle {
    info!("Tunnel listening on {} → {}", local_addr, target);

    let token = CancellationToken::new();
    let (done_tx, done_rx) = oneshot::channel();
    let relays = TaskTracker::new();

    let accept_loop = AcceptLoop {
        acceptor,
        local_addr,
        target: Arc::new(target),
        dialer,
        config,
        shutdown: token.clone(),
        relays: relays.clone(),
    };
    let accept_task = tokio::spawn(async move {
        if let Some(fatal) = accept_loop.run().await {
            // Receiver gone means nobody is listening for the outcome
            let _ = done_tx.send(fatal);
        }
    });

    TunnelHandle {
        local_addr,
        shutdown: ShutdownSignal(token),
        done: DoneSignal(Some(done_rx)),
        relays,
        accept_task: Some(accept_task),
    }
}

struct AcceptLoop<A> {
    acceptor: A,
    local_addr: SocketAddr,
    target: Arc<TargetEndpoint>,
    dialer: Arc<dyn HopDialer>,
    config: TunnelConfig,
    shutdown: CancellationToken,
    relays: TaskTracker,
}

impl<A: Acceptor> AcceptLoop<A> {
    /// Returns the fatal error that ended the loop, or `None` on shutdown.
    async fn run(mut self) -> Option<TunnelError> {
        let mut next_relay_id: u64 = 0;

        let outcome = loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Listener received shutdown signal");
                    break None;
                }
                accepted = tokio::time::timeout(self.config.accept_poll_interval, self.acceptor.accept()) => {
                    match accepted {
                        Err(_) => {
                            trace!("accept poll elapsed");
                            continue;
                        }
                        Ok(Ok((stream, peer))) => {
                            next_relay_id += 1;
                            debug!("accepted connection {} from {}", next_relay_id, peer);
                            self.relays.spawn(relay::serve(
                                next_relay_id,
                                stream,
                                peer,
                                Arc::clone(&self.target),
                                Arc::clone(&self.dialer),
                                self.config.relay_linger,
                            ));
                        }
                        Ok(Err(e)) => {
                            error!(
                                "Encountered unrecoverable error while accepting on {}: {}",
                                self.local_addr, e
                            );
                            break Some(TunnelError::FatalAccept {
                                addr: self.local_addr,
                                source: e,
                            });
                        }
                    }
                }
            }
        };

        self.relays.close();
        drop(self.acceptor);
        info!(
            "Listener on {} closed, {} relay(s) still draining",
            self.local_addr,
            self.relays.len()
        );
        outcome
    }
}

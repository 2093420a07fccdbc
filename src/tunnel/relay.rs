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

//! Per-connection byte relay
//!
//! A relay owns one accepted client socket and the hop dialed for it. Two
//! tasks copy bytes, one per direction:
//!
//! ```text
//! [Client] ──upstream──▶ [Hop to target]
//! [Client] ◀─downstream── [Hop to target]
//! ```
//!
//! When one direction reaches end-of-stream its destination is shut down for
//! writing and both sockets are closed. A non-zero `linger` instead gives the
//! other direction up to that long to finish first, for clients that
//! half-close and then wait for a reply. An error in either direction drops
//! both at once.

use super::dialer::HopDialer;
use crate::endpoint::TargetEndpoint;
use crate::utils::{format_bytes, format_duration};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Byte counts of a finished relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Client to target
    pub bytes_upstream: u64,
    /// Target to client
    pub bytes_downstream: u64,
}

impl RelayStats {
    pub fn total_bytes(&self) -> u64 {
        self.bytes_upstream + self.bytes_downstream
    }
}

/// Serve one accepted connection: dial the hop, then pump bytes.
///
/// Never fails upward; dial and copy errors are logged and only close this
/// connection.
pub(crate) async fn serve(
    id: u64,
    local: TcpStream,
    peer: SocketAddr,
    target: Arc<TargetEndpoint>,
    dialer: Arc<dyn HopDialer>,
    linger: Duration,
) {
    let started = Instant::now();
    debug!("relay {}: dialing {} for {}", id, target, peer);

    let hop = match dialer.dial(&target, peer).await {
        Ok(hop) => hop,
        Err(e) => {
            warn!("relay {}: dial for {} failed: {}", id, peer, e);
            return;
        }
    };

    match pump(local, hop, linger).await {
        Ok(stats) => debug!(
            "relay {}: closed after {}, {} up, {} down",
            id,
            format_duration(started.elapsed()),
            format_bytes(stats.bytes_upstream),
            format_bytes(stats.bytes_downstream)
        ),
        Err(e) => warn!(
            "relay {}: {} failed after {}: {}",
            id,
            peer,
            format_duration(started.elapsed()),
            e
        ),
    }
}

/// Copy bytes between `local` and `hop` in both directions until one side
/// ends, then close both.
pub async fn pump<H>(local: TcpStream, hop: H, linger: Duration) -> io::Result<RelayStats>
where
    H: AsyncRead + AsyncWrite + Send + 'static,
{
    let (local_read, local_write) = local.into_split();
    let (hop_read, hop_write) = tokio::io::split(hop);

    let mut upstream = tokio::spawn(copy_half(local_read, hop_write, "upstream"));
    let mut downstream = tokio::spawn(copy_half(hop_read, local_write, "downstream"));

    let mut stats = RelayStats::default();
    let (first, first_is_upstream) = tokio::select! {
        result = &mut upstream => (result, true),
        result = &mut downstream => (result, false),
    };
    let mut other = if first_is_upstream { downstream } else { upstream };

    let bytes = match flatten(first) {
        Ok(bytes) => bytes,
        Err(e) => {
            other.abort();
            let _ = other.await;
            return Err(e);
        }
    };
    record(&mut stats, first_is_upstream, bytes);

    match tokio::time::timeout(linger, &mut other).await {
        Ok(result) => {
            let bytes = flatten(result)?;
            record(&mut stats, !first_is_upstream, bytes);
        }
        Err(_) => {
            other.abort();
            // Cancelled task drops its socket halves
            let _ = other.await;
            trace!("other side still open after {:?}, closing relay", linger);
        }
    }

    Ok(stats)
}

async fn copy_half<R, W>(mut reader: R, mut writer: W, direction: &'static str) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let bytes = tokio::io::copy(&mut reader, &mut writer).await?;
    trace!("{} reached end of stream after {} bytes", direction, bytes);
    // Propagate EOF; the peer may already be gone
    let _ = writer.shutdown().await;
    Ok(bytes)
}

fn flatten(result: Result<io::Result<u64>, tokio::task::JoinError>) -> io::Result<u64> {
    result.map_err(|e| io::Error::other(format!("copy task ended abnormally: {e}")))?
}

fn record(stats: &mut RelayStats, upstream: bool, bytes: u64) {
    if upstream {
        stats.bytes_upstream = bytes;
    } else {
        stats.bytes_downstream = bytes;
    }
}

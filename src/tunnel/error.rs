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

use crate::endpoint::ProvisioningError;
use crate::ssh::SshError;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Tunnel-level failures. Both end the tunnel.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The local listener could not be bound
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The listener failed while accepting; no further connections are served
    #[error("listener on {addr} failed: {source}")]
    FatalAccept {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Failure to build one relay's path. Only that relay is affected.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("bastion hop to {bastion} failed: {source}")]
    Bastion {
        bastion: String,
        #[source]
        source: SshError,
    },

    #[error("target hop to {target} failed: {source}")]
    Target {
        target: String,
        #[source]
        source: SshError,
    },

    /// The ephemeral key had lapsed and could not be pushed again
    #[error("re-authorizing key for {bastion} failed: {source}")]
    KeyRefresh {
        bastion: String,
        #[source]
        source: ProvisioningError,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

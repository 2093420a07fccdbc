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

use std::io;
use thiserror::Error;

/// Errors from the SSH transport
#[derive(Debug, Error)]
pub enum SshError {
    #[error("failed to resolve {host}: {source}")]
    AddressInvalid {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("{host} did not resolve to any address")]
    NoAddress { host: String },

    #[error("connecting to {host} timed out after {secs}s")]
    Timeout { host: String, secs: u64 },

    #[error("public key authentication rejected for user {user}")]
    KeyAuthFailed { user: String },

    #[error("opening channel to {target} was refused: {source}")]
    ChannelOpen {
        target: String,
        #[source]
        source: russh::Error,
    },

    #[error(transparent)]
    Ssh(#[from] russh::Error),
}

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

use thiserror::Error;

/// Inventory lookup failures
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("{kind} {id} was not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {id} has no reachable address")]
    NoAddress { kind: &'static str, id: String },

    #[error("looking up {kind} {id}: {message}")]
    Backend {
        kind: &'static str,
        id: String,
        message: String,
    },
}

/// Ephemeral key provisioning failures
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("pushing key for {os_user}@{instance_id} was rejected: {message}")]
    Rejected {
        instance_id: String,
        os_user: String,
        message: String,
    },

    #[error("pushing key for {os_user}@{instance_id}: {message}")]
    Backend {
        instance_id: String,
        os_user: String,
        message: String,
    },
}

/// Failures while building a bastion endpoint
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    #[error("failed to generate ephemeral key: {0}")]
    KeyGeneration(String),
}

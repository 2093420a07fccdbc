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

//! JSON shapes printed by the CLI for the calls this crate makes.
//!
//! Only the fields that are read are declared; the rest is ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AssumeRoleOutput {
    pub credentials: TemporaryCredentials,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<DateTime<Utc>>,
}

/// Listing output that may continue on another page
pub(crate) trait Paged {
    fn next_token(&self) -> Option<&str>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DescribeInstancesOutput {
    #[serde(default)]
    pub reservations: Vec<Reservation>,
    pub next_token: Option<String>,
}

impl Paged for DescribeInstancesOutput {
    fn next_token(&self) -> Option<&str> {
        self.next_token.as_deref()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Reservation {
    #[serde(default)]
    pub instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Instance {
    pub instance_id: String,
    pub public_ip_address: Option<String>,
    pub public_dns_name: Option<String>,
    pub private_ip_address: Option<String>,
    pub state: Option<InstanceState>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct InstanceState {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Tag {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl Instance {
    /// Most reachable address: public IP, then public DNS, then private IP.
    pub fn best_address(&self) -> Option<&str> {
        [
            &self.public_ip_address,
            &self.public_dns_name,
            &self.private_ip_address,
        ]
        .into_iter()
        .filter_map(|candidate| candidate.as_deref())
        .find(|candidate| !candidate.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DescribeDbInstancesOutput {
    #[serde(rename = "DBInstances", default)]
    pub db_instances: Vec<DbInstance>,
    #[serde(rename = "NextToken")]
    pub next_token: Option<String>,
}

impl Paged for DescribeDbInstancesOutput {
    fn next_token(&self) -> Option<&str> {
        self.next_token.as_deref()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DbInstance {
    #[serde(rename = "DBInstanceIdentifier")]
    pub identifier: String,
    #[serde(rename = "Engine")]
    pub engine: Option<String>,
    #[serde(rename = "DBInstanceStatus")]
    pub status: Option<String>,
    #[serde(rename = "Endpoint")]
    pub endpoint: Option<DbEndpoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DbEndpoint {
    pub address: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct SendSshPublicKeyOutput {
    pub success: bool,
    pub request_id: Option<String>,
}

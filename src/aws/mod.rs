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

//! Cloud backend driven through the `aws` command-line client.
//!
//! [`AwsBackend`] performs role assumption for the profile resolver. Once a
//! session exists, [`AwsBackend::scoped`] yields a [`ScopedAws`] that looks up
//! instances and databases and pushes ephemeral SSH keys with that session's
//! credentials. It also lists the instances and databases a session can see,
//! so their identifiers can be found.

pub mod cli;
mod model;

pub use cli::{AwsCli, AwsCliError, DEFAULT_CLI_TIMEOUT};

use crate::endpoint::{
    DatabaseAddress, DiscoveryError, InstanceAddress, InstanceDiscovery, KeyProvisioner,
    ProvisioningError,
};
use crate::profile::{AssumeRoleError, AssumedCredentials, RoleAssumer, Session};
use async_trait::async_trait;
use model::{
    AssumeRoleOutput, DescribeDbInstancesOutput, DescribeInstancesOutput, Paged,
    SendSshPublicKeyOutput,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

/// Lifetime EC2 Instance Connect grants a pushed key, fixed by the service
pub const INSTANCE_CONNECT_KEY_TTL: Duration = Duration::from_secs(60);

/// Items requested per page when listing
const LIST_PAGE_SIZE: &str = "50";

/// Service error codes meaning the looked-up resource does not exist
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidInstanceID.NotFound",
    "InvalidInstanceID.Malformed",
    "DBInstanceNotFound",
    "DBInstanceNotFoundFault",
];

/// Role assumption through `aws sts assume-role`.
#[derive(Debug, Clone)]
pub struct AwsBackend {
    cli: Arc<AwsCli>,
}

impl AwsBackend {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli: Arc::new(cli) }
    }

    /// Inventory and key-push capabilities acting as `session`.
    pub fn scoped(&self, session: Session) -> ScopedAws {
        ScopedAws {
            cli: Arc::clone(&self.cli),
            session,
        }
    }
}

#[async_trait]
impl RoleAssumer for AwsBackend {
    async fn assume_role(
        &self,
        parent: &Session,
        role_arn: &str,
        session_name: &str,
    ) -> Result<AssumedCredentials, AssumeRoleError> {
        let output: AssumeRoleOutput = self
            .cli
            .run(
                parent,
                &[
                    "sts",
                    "assume-role",
                    "--role-arn",
                    role_arn,
                    "--role-session-name",
                    session_name,
                ],
            )
            .await
            .map_err(|e| match e {
                AwsCliError::Service { .. } => AssumeRoleError::Rejected(e.to_string()),
                other => AssumeRoleError::Unavailable(other.to_string()),
            })?;

        let credentials = output.credentials;
        Ok(AssumedCredentials {
            access_key_id: credentials.access_key_id,
            secret_access_key: Zeroizing::new(credentials.secret_access_key),
            session_token: Zeroizing::new(credentials.session_token),
            expiration: credentials.expiration,
        })
    }
}

/// Capabilities bound to one resolved session.
#[derive(Debug, Clone)]
pub struct ScopedAws {
    cli: Arc<AwsCli>,
    session: Session,
}

/// One compute instance in a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSummary {
    pub instance_id: String,
    pub state: Option<String>,
    pub address: Option<String>,
    /// `(key, value)` in the order the service reports them
    pub tags: Vec<(String, String)>,
}

/// One managed database in a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSummary {
    pub identifier: String,
    pub engine: Option<String>,
    pub status: Option<String>,
    /// `None` while the database has no endpoint yet
    pub endpoint: Option<(String, u16)>,
}

impl ScopedAws {
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Every instance visible to the session, across all pages.
    pub async fn list_instances(&self) -> Result<Vec<InstanceSummary>, AwsCliError> {
        let pages: Vec<DescribeInstancesOutput> =
            self.collect_pages(&["ec2", "describe-instances"]).await?;

        Ok(pages
            .into_iter()
            .flat_map(|page| page.reservations)
            .flat_map(|reservation| reservation.instances)
            .map(|instance| InstanceSummary {
                address: instance.best_address().map(str::to_string),
                state: instance.state.map(|state| state.name),
                tags: instance
                    .tags
                    .into_iter()
                    .map(|tag| (tag.key, tag.value))
                    .collect(),
                instance_id: instance.instance_id,
            })
            .collect())
    }

    /// Every database visible to the session, across all pages.
    pub async fn list_databases(&self) -> Result<Vec<DatabaseSummary>, AwsCliError> {
        let pages: Vec<DescribeDbInstancesOutput> =
            self.collect_pages(&["rds", "describe-db-instances"]).await?;

        Ok(pages
            .into_iter()
            .flat_map(|page| page.db_instances)
            .map(|db| DatabaseSummary {
                endpoint: db
                    .endpoint
                    .and_then(|endpoint| Some((endpoint.address?, endpoint.port?)))
                    .filter(|(address, _)| !address.is_empty()),
                identifier: db.identifier,
                engine: db.engine,
                status: db.status,
            })
            .collect())
    }

    /// Run a listing call, following `NextToken` until the last page.
    async fn collect_pages<T>(&self, args: &[&str]) -> Result<Vec<T>, AwsCliError>
    where
        T: DeserializeOwned + Paged,
    {
        let mut pages = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page: T = {
                let mut call = args.to_vec();
                call.extend(["--max-items", LIST_PAGE_SIZE]);
                if let Some(token) = token.as_deref() {
                    call.extend(["--starting-token", token]);
                }
                self.cli.run(&self.session, &call).await?
            };
            let next = page
                .next_token()
                .filter(|next| !next.is_empty() && Some(*next) != token.as_deref())
                .map(str::to_string);
            pages.push(page);

            match next {
                Some(next) => {
                    tracing::debug!("{} continues on page {}", args.join(" "), pages.len() + 1);
                    token = Some(next);
                }
                None => return Ok(pages),
            }
        }
    }
}

fn discovery_error(kind: &'static str, id: &str, error: AwsCliError) -> DiscoveryError {
    match error.service_code() {
        Some(code) if NOT_FOUND_CODES.contains(&code) => DiscoveryError::NotFound {
            kind,
            id: id.to_string(),
        },
        _ => DiscoveryError::Backend {
            kind,
            id: id.to_string(),
            message: error.to_string(),
        },
    }
}

#[async_trait]
impl InstanceDiscovery for ScopedAws {
    async fn discover_instance(&self, instance_id: &str) -> Result<InstanceAddress, DiscoveryError> {
        let output: DescribeInstancesOutput = self
            .cli
            .run(
                &self.session,
                &["ec2", "describe-instances", "--instance-ids", instance_id],
            )
            .await
            .map_err(|e| discovery_error("instance", instance_id, e))?;

        let instance = output
            .reservations
            .iter()
            .flat_map(|reservation| reservation.instances.iter())
            .find(|instance| instance.instance_id == instance_id)
            .ok_or_else(|| DiscoveryError::NotFound {
                kind: "instance",
                id: instance_id.to_string(),
            })?;

        let address = instance
            .best_address()
            .ok_or_else(|| DiscoveryError::NoAddress {
                kind: "instance",
                id: instance_id.to_string(),
            })?;

        tracing::debug!("Instance {} is reachable at {}", instance_id, address);
        Ok(InstanceAddress {
            address: address.to_string(),
        })
    }

    async fn discover_database(&self, database_id: &str) -> Result<DatabaseAddress, DiscoveryError> {
        let output: DescribeDbInstancesOutput = self
            .cli
            .run(
                &self.session,
                &[
                    "rds",
                    "describe-db-instances",
                    "--db-instance-identifier",
                    database_id,
                ],
            )
            .await
            .map_err(|e| discovery_error("database", database_id, e))?;

        let database = output
            .db_instances
            .iter()
            .find(|db| db.identifier == database_id)
            .ok_or_else(|| DiscoveryError::NotFound {
                kind: "database",
                id: database_id.to_string(),
            })?;

        // An instance still being created has no endpoint yet
        let (address, port) = database
            .endpoint
            .as_ref()
            .and_then(|endpoint| Some((endpoint.address.as_deref()?, endpoint.port?)))
            .filter(|(address, _)| !address.is_empty())
            .ok_or_else(|| DiscoveryError::NoAddress {
                kind: "database",
                id: database_id.to_string(),
            })?;

        tracing::debug!("Database {} is at {}:{}", database_id, address, port);
        Ok(DatabaseAddress {
            address: address.to_string(),
            port,
        })
    }
}

#[async_trait]
impl KeyProvisioner for ScopedAws {
    async fn push_key(
        &self,
        instance_id: &str,
        os_user: &str,
        public_key: &str,
        ttl: Duration,
    ) -> Result<Duration, ProvisioningError> {
        if ttl != INSTANCE_CONNECT_KEY_TTL {
            tracing::debug!(
                "Requested key lifetime {}s ignored; the service grants {}s",
                ttl.as_secs(),
                INSTANCE_CONNECT_KEY_TTL.as_secs()
            );
        }

        let output: SendSshPublicKeyOutput = self
            .cli
            .run(
                &self.session,
                &[
                    "ec2-instance-connect",
                    "send-ssh-public-key",
                    "--instance-id",
                    instance_id,
                    "--instance-os-user",
                    os_user,
                    "--ssh-public-key",
                    public_key,
                ],
            )
            .await
            .map_err(|e| match e {
                AwsCliError::Service { .. } => ProvisioningError::Rejected {
                    instance_id: instance_id.to_string(),
                    os_user: os_user.to_string(),
                    message: e.to_string(),
                },
                other => ProvisioningError::Backend {
                    instance_id: instance_id.to_string(),
                    os_user: os_user.to_string(),
                    message: other.to_string(),
                },
            })?;

        if !output.success {
            return Err(ProvisioningError::Rejected {
                instance_id: instance_id.to_string(),
                os_user: os_user.to_string(),
                message: format!(
                    "service reported failure (request {})",
                    output.request_id.as_deref().unwrap_or("unknown")
                ),
            });
        }

        tracing::debug!("Pushed ephemeral key for {}@{}", os_user, instance_id);
        Ok(INSTANCE_CONNECT_KEY_TTL)
    }
}

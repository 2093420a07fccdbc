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

//! `tunneller connect`: the full flow from profile to listening tunnel.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::resolve::{build_resolver, print_session};
use crate::config::Config;
use crate::endpoint::{bastion_endpoint, target_endpoint, BastionOptions, TargetEndpoint};
use crate::profile::ProfileStore;
use crate::ssh::known_hosts::{get_check_method, StrictHostKeyChecking};
use crate::tunnel::{open_tunnel, SshHopDialer, TunnelConfig, TunnelHandle};

/// Where relayed connections end up
#[derive(Debug, Clone)]
pub enum Destination {
    /// Database instance looked up through inventory
    Database(String),
    /// Host and port given directly
    Address(TargetEndpoint),
}

/// Everything `connect` needs after flags and config are merged
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub profile: String,
    pub region: String,
    pub bastion: String,
    pub destination: Destination,
    pub local_port: u16,
    pub bastion_options: BastionOptions,
    pub host_key_checking: StrictHostKeyChecking,
    pub connect_timeout: Duration,
    pub tunnel: TunnelConfig,
    pub drain_timeout: Duration,
}

pub async fn connect(store: ProfileStore, params: ConnectParams, config: &Config) -> Result<()> {
    let chain = store
        .chain(&params.profile)
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let (resolver, backend) = build_resolver(store, config);

    let session = resolver.resolve(&params.profile, &params.region).await?;
    print_session(&session, &chain);

    let cloud = backend.scoped(session);

    let target = match &params.destination {
        Destination::Database(database_id) => target_endpoint(database_id, &cloud)
            .await
            .with_context(|| format!("Failed to look up database {database_id}"))?,
        Destination::Address(target) => target.clone(),
    };

    let bastion = bastion_endpoint(&params.bastion, &cloud, &cloud, &params.bastion_options)
        .await
        .with_context(|| format!("Failed to prepare bastion {}", params.bastion))?;
    println!(
        "{} Bastion {} ready (key {})",
        "●".green(),
        bastion.to_string().bold(),
        bastion.auth.fingerprint().dimmed()
    );

    let dialer = SshHopDialer::new(bastion, get_check_method(params.host_key_checking))
        .with_connect_timeout(params.connect_timeout)
        .with_key_refresh(Arc::new(cloud), params.bastion_options.key_ttl)?;

    // Fail before listening if the bastion cannot be reached or refuses the key
    dialer
        .preflight()
        .await
        .context("Could not connect to the bastion")?;

    let mut handle = open_tunnel(
        params.local_port,
        target.clone(),
        Arc::new(dialer),
        params.tunnel.clone(),
    )
    .await?;

    println!(
        "{} Tunnel started: {} → {}. Press Ctrl-C to stop.",
        "▶".cyan(),
        handle.local_addr().to_string().bold(),
        target.to_string().yellow()
    );

    let stop = stop_signal()?;
    tokio::pin!(stop);

    tokio::select! {
        _ = &mut stop => {
            println!("\n{}", "Stopping, no new connections accepted".yellow());
            handle.shutdown();
            handle.closed().await;
            drain(&handle, params.drain_timeout).await;
            Ok(())
        }
        fatal = handle.done_signal().wait() => {
            handle.closed().await;
            match fatal {
                Some(e) => Err(e).context("Tunnel stopped"),
                None => Ok(()),
            }
        }
    }
}

async fn drain(handle: &TunnelHandle, timeout: Duration) {
    let active = handle.active_relays();
    if active == 0 {
        return;
    }
    println!(
        "{} Waiting up to {}s for {} open connection(s), Ctrl-C again to quit now",
        "•".dimmed(),
        timeout.as_secs(),
        active
    );

    tokio::select! {
        drained = handle.drain(timeout) => {
            if !drained {
                tracing::warn!(
                    "{} connection(s) still open after {}s",
                    handle.active_relays(),
                    timeout.as_secs()
                );
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Drain interrupted");
        }
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
fn stop_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal;

    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    Ok(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            terminate.recv().await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received SIGINT (Ctrl+C)");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM");
            }
        }
    })
}

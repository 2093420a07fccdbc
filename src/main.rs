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

use anyhow::{Context, Result};
use clap::Parser;

use tunneller::{
    cli::{Cli, Commands, ConnectArgs},
    commands::{
        connect::{connect, ConnectParams, Destination},
        inventory::{list_databases, list_instances},
        load_store,
        profiles::list_profiles,
        resolve::resolve_profile,
        select_profile_and_region,
    },
    config::Config,
    endpoint::{BastionOptions, DEFAULT_SSH_PORT},
    tunnel::TunnelConfig,
    utils::init_logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path).await?;
    tracing::debug!("Configuration loaded from {}", config_path.display());

    let store = load_store(cli.credentials.as_deref(), &config).await?;

    match cli.command {
        Commands::Profiles => {
            list_profiles(&store);
            Ok(())
        }
        Commands::Resolve { selection } => {
            let (profile, region) = select_profile_and_region(
                selection.profile.as_deref(),
                selection.region.as_deref(),
                &config,
            )?;
            resolve_profile(store, &profile, &region, &config).await
        }
        Commands::Instances { selection } => {
            let (profile, region) = select_profile_and_region(
                selection.profile.as_deref(),
                selection.region.as_deref(),
                &config,
            )?;
            list_instances(store, &profile, &region, &config).await
        }
        Commands::Databases { selection } => {
            let (profile, region) = select_profile_and_region(
                selection.profile.as_deref(),
                selection.region.as_deref(),
                &config,
            )?;
            list_databases(store, &profile, &region, &config).await
        }
        Commands::Connect(args) => {
            let params = connect_params(args, &config)?;
            connect(store, params, &config).await
        }
    }
}

/// Merge connect flags over the config file.
fn connect_params(args: ConnectArgs, config: &Config) -> Result<ConnectParams> {
    let (profile, region) = select_profile_and_region(
        args.selection.profile.as_deref(),
        args.selection.region.as_deref(),
        config,
    )?;

    let bastion = args
        .bastion
        .or_else(|| config.bastion.clone())
        .context("No bastion given; pass --bastion or set 'bastion' in the config file")?;

    let destination = match (args.target, args.database) {
        (Some(target), _) => Destination::Address(target),
        (None, Some(database)) => Destination::Database(database),
        (None, None) => Destination::Database(config.database.clone().context(
            "No target given; pass --database or --target, or set 'database' in the config file",
        )?),
    };

    Ok(ConnectParams {
        profile,
        region,
        bastion,
        destination,
        local_port: args.local_port.unwrap_or_else(|| config.local_port()),
        bastion_options: BastionOptions {
            os_user: args
                .os_user
                .unwrap_or_else(|| config.os_user().to_string()),
            key_ttl: config.key_ttl(),
            ssh_port: DEFAULT_SSH_PORT,
        },
        host_key_checking: args
            .strict_host_key_checking
            .unwrap_or_else(|| config.strict_host_key_checking()),
        connect_timeout: config.connect_timeout(),
        tunnel: TunnelConfig {
            accept_poll_interval: config.accept_poll_interval(),
            relay_linger: config.relay_linger(),
            ..TunnelConfig::default()
        },
        drain_timeout: config.drain_timeout(),
    })
}

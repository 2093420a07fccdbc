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

//! Listing what a session can reach, to find bastion and database identifiers.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use super::resolve::build_resolver;
use crate::aws::{DatabaseSummary, InstanceSummary, ScopedAws};
use crate::config::Config;
use crate::profile::ProfileStore;

async fn scoped_session(
    store: ProfileStore,
    profile: &str,
    region: &str,
    config: &Config,
) -> Result<ScopedAws> {
    let (resolver, backend) = build_resolver(store, config);
    let session = resolver.resolve(profile, region).await?;
    Ok(backend.scoped(session))
}

pub async fn list_instances(
    store: ProfileStore,
    profile: &str,
    region: &str,
    config: &Config,
) -> Result<()> {
    let cloud = scoped_session(store, profile, region, config).await?;
    let instances = cloud
        .list_instances()
        .await
        .with_context(|| format!("Failed to list instances in {region}"))?;
    print_instances(&instances, region);
    Ok(())
}

pub async fn list_databases(
    store: ProfileStore,
    profile: &str,
    region: &str,
    config: &Config,
) -> Result<()> {
    let cloud = scoped_session(store, profile, region, config).await?;
    let databases = cloud
        .list_databases()
        .await
        .with_context(|| format!("Failed to list databases in {region}"))?;
    print_databases(&databases, region);
    Ok(())
}

pub fn print_instances(instances: &[InstanceSummary], region: &str) {
    if instances.is_empty() {
        println!("{}", format!("No instances in {region}").dimmed());
        return;
    }

    println!(
        "\n{} {} ({})\n",
        "▶".cyan(),
        format!("Instances in {region}").bold(),
        instances.len()
    );
    for instance in instances {
        let state = match instance.state.as_deref() {
            Some("running") => "running".green().to_string(),
            Some(other) => other.yellow().to_string(),
            None => "unknown".dimmed().to_string(),
        };
        let address = instance.address.as_deref().unwrap_or("no address");
        println!(
            "  {} {} ({}) {}",
            "●".blue(),
            instance.instance_id.bold(),
            state,
            address.dimmed()
        );
        if !instance.tags.is_empty() {
            let tags = instance
                .tags
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(", ");
            println!("    {} {}", "•".dimmed(), tags);
        }
    }
    println!();
}

pub fn print_databases(databases: &[DatabaseSummary], region: &str) {
    if databases.is_empty() {
        println!("{}", format!("No databases in {region}").dimmed());
        return;
    }

    println!(
        "\n{} {} ({})\n",
        "▶".cyan(),
        format!("Databases in {region}").bold(),
        databases.len()
    );
    for db in databases {
        let engine = db.engine.as_deref().unwrap_or("unknown engine");
        let endpoint = match &db.endpoint {
            Some((address, port)) => format!("{address}:{port}"),
            None => "no endpoint yet".red().to_string(),
        };
        println!(
            "  {} {} ({}) {}",
            "●".magenta(),
            db.identifier.bold(),
            engine.yellow(),
            endpoint
        );
        if let Some(status) = db.status.as_deref() {
            println!("    {} {}", "•".dimmed(), status.dimmed());
        }
    }
    println!();
}

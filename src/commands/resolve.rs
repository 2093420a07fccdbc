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

use anyhow::Result;
use chrono::Utc;
use owo_colors::OwoColorize;
use std::sync::Arc;

use crate::aws::{AwsBackend, AwsCli};
use crate::config::Config;
use crate::profile::{ProfileResolver, ProfileStore, Session};
use crate::utils::format_duration;

/// Resolver wired to the CLI backend named in `config`.
pub fn build_resolver(store: ProfileStore, config: &Config) -> (ProfileResolver, AwsBackend) {
    let backend = AwsBackend::new(AwsCli::new(config.aws_cli()));
    let resolver = ProfileResolver::new(Arc::new(store), Arc::new(backend.clone()))
        .with_refresh_margin(config.session_refresh_margin());
    (resolver, backend)
}

pub async fn resolve_profile(
    store: ProfileStore,
    profile: &str,
    region: &str,
    config: &Config,
) -> Result<()> {
    let (resolver, _) = build_resolver(store, config);
    let chain = resolver
        .store()
        .chain(profile)
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let session = resolver.resolve(profile, region).await?;
    print_session(&session, &chain);
    Ok(())
}

pub fn print_session(session: &Session, chain: &[String]) {
    println!(
        "{} Resolved {} in {}",
        "●".green(),
        session.profile().bold(),
        session.region().cyan()
    );
    if chain.len() > 1 {
        println!("    {} via {}", "•".dimmed(), chain.join(" → ").dimmed());
    }
    println!(
        "    {} access key {}",
        "•".dimmed(),
        session.masked_access_key()
    );
    match session.credentials().expiration() {
        Some(expiration) => {
            let remaining = (expiration - Utc::now()).to_std().unwrap_or_default();
            println!(
                "    {} expires {} (in {})",
                "•".dimmed(),
                expiration.to_rfc3339(),
                format_duration(remaining).yellow()
            );
        }
        None => println!("    {} {}", "•".dimmed(), "long-lived static keys".dimmed()),
    }
}

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

use owo_colors::OwoColorize;

use crate::profile::{ProfileKind, ProfileStore};
use crate::utils::mask_key;

pub fn list_profiles(store: &ProfileStore) {
    if store.is_empty() {
        println!("{}", "No profiles defined".dimmed());
        return;
    }

    println!("\n{} {}\n", "▶".cyan(), "Available profiles".bold());
    for profile in store.iter() {
        match profile.kind() {
            ProfileKind::Direct(keys) => {
                println!(
                    "  {} {} ({}, key {})",
                    "●".blue(),
                    profile.name().bold(),
                    "static keys".yellow(),
                    mask_key(&keys.access_key_id).dimmed()
                );
            }
            ProfileKind::Assumed { role_arn, .. } => {
                println!(
                    "  {} {} ({})",
                    "●".magenta(),
                    profile.name().bold(),
                    "assumes role".yellow()
                );
                println!("    {} {}", "•".dimmed(), role_arn.dimmed());

                let chain = store.chain(profile.name());
                let rendered = chain
                    .iter()
                    .map(|name| {
                        if store.contains(name) {
                            name.to_string()
                        } else {
                            format!("{} (undefined)", name).red().to_string()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" → ");
                println!("    {} {}", "•".dimmed(), rendered);
            }
        }
    }
    println!();
}

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

//! Minimal INI reader for shared credentials files
//!
//! Understands `[section]` headers, `key = value` pairs, and full-line comments
//! starting with `#` or `;`. Keys are case-insensitive and stored lowercased.
//! A section that appears more than once is merged, later keys winning.

use super::error::ConfigError;
use std::collections::BTreeMap;

/// One named section of an INI document
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IniSection {
    pub name: String,
    pub line: usize,
    pub entries: BTreeMap<String, String>,
}

impl IniSection {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

/// Parse INI content into sections, preserving first-seen order.
///
/// `origin` is only used to label syntax errors.
pub(crate) fn parse(content: &str, origin: &str) -> Result<Vec<IniSection>, ConfigError> {
    let mut sections: Vec<IniSection> = Vec::new();
    let mut current: Option<usize> = None;

    for (index, raw) in content.lines().enumerate() {
        let line_number = index + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let syntax = |message: String| ConfigError::Syntax {
            origin: origin.to_string(),
            line: line_number,
            message,
        };

        if let Some(rest) = line.strip_prefix('[') {
            let Some(name) = rest.strip_suffix(']') else {
                return Err(syntax(format!("unterminated section header '{line}'")));
            };
            let name = normalize_section_name(name);
            if name.is_empty() {
                return Err(syntax("empty section name".to_string()));
            }

            current = match sections.iter().position(|s| s.name == name) {
                Some(existing) => {
                    tracing::debug!(
                        "Section [{}] repeated at {}:{}, merging keys",
                        name,
                        origin,
                        line_number
                    );
                    Some(existing)
                }
                None => {
                    sections.push(IniSection {
                        name,
                        line: line_number,
                        entries: BTreeMap::new(),
                    });
                    Some(sections.len() - 1)
                }
            };
            continue;
        }

        let Some(eq_pos) = line.find('=') else {
            return Err(syntax(format!("expected 'key = value', found '{line}'")));
        };
        let key = line[..eq_pos].trim().to_lowercase();
        let value = line[eq_pos + 1..].trim();
        if key.is_empty() {
            return Err(syntax("missing key before '='".to_string()));
        }

        let Some(section) = current else {
            return Err(syntax(format!("key '{key}' appears before any section")));
        };
        sections[section].entries.insert(key, value.to_string());
    }

    Ok(sections)
}

/// `[profile name]` (config-file style) and `[name]` refer to the same profile.
fn normalize_section_name(raw: &str) -> String {
    let name = raw.trim();
    match name.strip_prefix("profile ") {
        Some(rest) => rest.trim().to_string(),
        None => name.to_string(),
    }
}

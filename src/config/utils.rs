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

//! Configuration utility functions.

use directories::BaseDirs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the profile definitions file
pub const CREDENTIALS_FILE_ENV: &str = "AWS_SHARED_CREDENTIALS_FILE";

/// Expand tilde (~) in path to home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if path_str == "~" || path_str.starts_with("~/") {
            if let Some(dirs) = BaseDirs::new() {
                let home = dirs.home_dir();
                return match path_str.strip_prefix("~/") {
                    Some(rest) => home.join(rest),
                    None => home.to_path_buf(),
                };
            }
        }
    }
    path.to_path_buf()
}

/// Default profile definitions file, `~/.aws/credentials`.
pub fn default_credentials_path() -> PathBuf {
    expand_tilde(Path::new("~/.aws/credentials"))
}

/// Pick the credentials file: explicit choice, then config, then default.
pub fn credentials_path(explicit: Option<&Path>, configured: Option<PathBuf>) -> PathBuf {
    explicit
        .map(expand_tilde)
        .or(configured)
        .unwrap_or_else(default_credentials_path)
}

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

//! Configuration tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::{Config, DEFAULT_LOCAL_PORT};
use super::utils::{credentials_path, expand_tilde};
use crate::ssh::known_hosts::StrictHostKeyChecking;

#[test]
fn test_expand_tilde() {
    let Some(dirs) = directories::BaseDirs::new() else {
        return;
    };
    let home = dirs.home_dir();

    assert_eq!(
        expand_tilde(Path::new("~/.aws/credentials")),
        home.join(".aws/credentials")
    );
    assert_eq!(expand_tilde(Path::new("~")), home.to_path_buf());
    assert_eq!(
        expand_tilde(Path::new("/etc/tunneller.yaml")),
        PathBuf::from("/etc/tunneller.yaml")
    );
    // Only a leading tilde is special
    assert_eq!(
        expand_tilde(Path::new("data/~/x")),
        PathBuf::from("data/~/x")
    );
}

#[test]
fn test_config_parsing() {
    let yaml = r#"
credentials_file: /srv/creds
profile: ops
region: eu-west-1
bastion: i-0abc
database: orders-db
local_port: 15432
os_user: ubuntu
key_ttl_secs: 45
accept_poll_ms: 250
relay_linger_secs: 5
drain_timeout_secs: 12
session_refresh_margin_secs: 120
strict_host_key_checking: "yes"
connect_timeout_secs: 7
aws_cli: /opt/aws/bin/aws
"#;

    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.profile.as_deref(), Some("ops"));
    assert_eq!(config.region.as_deref(), Some("eu-west-1"));
    assert_eq!(config.bastion.as_deref(), Some("i-0abc"));
    assert_eq!(config.database.as_deref(), Some("orders-db"));
    assert_eq!(config.local_port(), 15432);
    assert_eq!(config.os_user(), "ubuntu");
    assert_eq!(config.key_ttl(), Duration::from_secs(45));
    assert_eq!(config.accept_poll_interval(), Duration::from_millis(250));
    assert_eq!(config.relay_linger(), Duration::from_secs(5));
    assert_eq!(config.drain_timeout(), Duration::from_secs(12));
    assert_eq!(config.session_refresh_margin(), Duration::from_secs(120));
    assert_eq!(config.strict_host_key_checking(), StrictHostKeyChecking::Yes);
    assert_eq!(config.connect_timeout(), Duration::from_secs(7));
    assert_eq!(config.aws_cli(), "/opt/aws/bin/aws");
    assert_eq!(config.credentials_file(), Some(PathBuf::from("/srv/creds")));
}

#[test]
fn test_defaults() {
    let config = Config::from_yaml("").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.local_port(), DEFAULT_LOCAL_PORT);
    assert_eq!(config.os_user(), "ec2-user");
    assert_eq!(config.key_ttl(), Duration::from_secs(60));
    assert_eq!(config.accept_poll_interval(), Duration::from_secs(1));
    assert_eq!(config.relay_linger(), Duration::ZERO);
    assert_eq!(config.drain_timeout(), Duration::from_secs(30));
    assert_eq!(config.session_refresh_margin(), Duration::from_secs(300));
    assert_eq!(
        config.strict_host_key_checking(),
        StrictHostKeyChecking::AcceptNew
    );
    assert_eq!(config.connect_timeout(), Duration::from_secs(15));
    assert_eq!(config.aws_cli(), "aws");
    assert!(config.credentials_file().is_none());
}

#[test]
fn test_host_key_mode_spellings() {
    let config = Config::from_yaml("strict_host_key_checking: accept-new").unwrap();
    assert_eq!(
        config.strict_host_key_checking(),
        StrictHostKeyChecking::AcceptNew
    );
    let config = Config::from_yaml("strict_host_key_checking: tofu").unwrap();
    assert_eq!(
        config.strict_host_key_checking(),
        StrictHostKeyChecking::AcceptNew
    );
    assert!(Config::from_yaml("strict_host_key_checking: sometimes").is_err());
}

#[test]
fn test_zero_poll_interval_is_raised() {
    let config = Config::from_yaml("accept_poll_ms: 0").unwrap();
    assert_eq!(config.accept_poll_interval(), Duration::from_millis(1));
}

#[test]
fn test_unknown_key_rejected() {
    let err = Config::from_yaml("local_prot: 9000").unwrap_err();
    assert!(format!("{err:#}").contains("local_prot"));
}

#[tokio::test]
async fn test_load_missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("absent.yaml")).await.unwrap();
    assert_eq!(config, Config::default());
}

#[tokio::test]
async fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "region: ap-northeast-2\nlocal_port: 5433\n").unwrap();

    let config = Config::load(&path).await.unwrap();
    assert_eq!(config.region.as_deref(), Some("ap-northeast-2"));
    assert_eq!(config.local_port(), 5433);
}

#[tokio::test]
async fn test_load_reports_path_on_syntax_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, "local_port: [unterminated\n").unwrap();

    let err = Config::load(&path).await.unwrap_err();
    assert!(format!("{err}").contains("broken.yaml"));
}

#[test]
fn test_credentials_path_precedence() {
    let explicit = PathBuf::from("/explicit/creds");
    let configured = PathBuf::from("/configured/creds");

    assert_eq!(
        credentials_path(Some(&explicit), Some(configured.clone())),
        explicit
    );
    assert_eq!(credentials_path(None, Some(configured.clone())), configured);
    assert!(credentials_path(None, None).ends_with(".aws/credentials"));
}

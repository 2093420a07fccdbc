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

//! Runner for the `aws` command-line client.
//!
//! Each call is a separate child process. Credentials are handed over through
//! the child's environment only, so nothing secret appears on a command line
//! or in a file. Output is always requested as JSON.

use crate::profile::Session;
use serde::de::DeserializeOwned;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

/// Upper bound on a single CLI invocation
pub const DEFAULT_CLI_TIMEOUT: Duration = Duration::from_secs(30);

/// Variables that would make the child pick credentials other than ours
const SCRUBBED_ENV: &[&str] = &[
    "AWS_PROFILE",
    "AWS_DEFAULT_PROFILE",
    "AWS_SESSION_TOKEN",
    "AWS_SECURITY_TOKEN",
];

/// Failures of a single CLI invocation
#[derive(Debug, Error)]
pub enum AwsCliError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' did not finish within {secs}s")]
    Timeout { command: String, secs: u64 },

    /// The service answered with an error, e.g. `AccessDenied`
    #[error("'{command}' failed ({code}): {message}")]
    Service {
        command: String,
        code: String,
        message: String,
    },

    /// Non-zero exit without a recognizable service error
    #[error("'{command}' exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected output from '{command}': {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

impl AwsCliError {
    /// Service error code, when the service itself rejected the request.
    pub fn service_code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Invokes the CLI on behalf of a [`Session`].
#[derive(Debug, Clone)]
pub struct AwsCli {
    program: String,
    leading_args: Vec<String>,
    timeout: Duration,
}

impl Default for AwsCli {
    fn default() -> Self {
        Self::new("aws")
    }
}

impl AwsCli {
    /// `command_line` is split on whitespace; the first word is the program
    /// and the rest are passed before every subcommand.
    pub fn new(command_line: &str) -> Self {
        let mut words = command_line.split_whitespace().map(str::to_string);
        let program = words.next().unwrap_or_else(|| "aws".to_string());
        Self {
            program,
            leading_args: words.collect(),
            timeout: DEFAULT_CLI_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run `args` with the credentials and region of `session` and decode the
    /// JSON the CLI prints.
    pub async fn run<T: DeserializeOwned>(
        &self,
        session: &Session,
        args: &[&str],
    ) -> Result<T, AwsCliError> {
        let command = display_command(args);
        let credentials = session.credentials();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .args(args)
            .args(["--output", "json", "--region", session.region()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for key in SCRUBBED_ENV {
            cmd.env_remove(key);
        }
        cmd.env("AWS_ACCESS_KEY_ID", credentials.access_key_id())
            .env("AWS_SECRET_ACCESS_KEY", credentials.secret_access_key())
            .env("AWS_REGION", session.region())
            .env("AWS_DEFAULT_REGION", session.region())
            .env("AWS_PAGER", "");
        if let Some(token) = credentials.session_token() {
            cmd.env("AWS_SESSION_TOKEN", token);
        }

        tracing::debug!(
            "Running '{}' as profile {} in {}",
            command,
            session.profile(),
            session.region()
        );
        let start = Instant::now();

        let child = cmd.spawn().map_err(|source| AwsCliError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Dropping the pending future kills the child (kill_on_drop)
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(AwsCliError::Spawn {
                    program: self.program.clone(),
                    source,
                })
            }
            Err(_) => {
                tracing::warn!(
                    "'{}' exceeded timeout of {}s, killing process",
                    command,
                    self.timeout.as_secs()
                );
                return Err(AwsCliError::Timeout {
                    command,
                    secs: self.timeout.as_secs(),
                });
            }
        };

        tracing::debug!(
            "'{}' completed in {:.1}s with status {}",
            command,
            start.elapsed().as_secs_f64(),
            output.status
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(match parse_service_error(&stderr) {
                Some((code, message)) => AwsCliError::Service {
                    command,
                    code,
                    message,
                },
                None => AwsCliError::Failed {
                    command,
                    status: output.status.to_string(),
                    stderr,
                },
            });
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|source| AwsCliError::Parse { command, source })
    }
}

fn display_command(args: &[&str]) -> String {
    args.iter()
        .take_while(|arg| !arg.starts_with("--"))
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract `(code, message)` from the CLI's service error line:
/// `An error occurred (AccessDenied) when calling the AssumeRole operation: ...`
pub(crate) fn parse_service_error(stderr: &str) -> Option<(String, String)> {
    let line = stderr
        .lines()
        .find(|line| line.contains("An error occurred ("))?;
    let rest = &line[line.find("An error occurred (")? + "An error occurred (".len()..];
    let (code, tail) = rest.split_once(')')?;
    let message = tail
        .split_once(": ")
        .map(|(_, message)| message.trim())
        .unwrap_or_else(|| tail.trim());
    Some((code.to_string(), message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_error() {
        let stderr = "\nAn error occurred (AccessDenied) when calling the AssumeRole operation: User: arn:aws:iam::111:user/x is not authorized\n";
        let (code, message) = parse_service_error(stderr).unwrap();
        assert_eq!(code, "AccessDenied");
        assert_eq!(message, "User: arn:aws:iam::111:user/x is not authorized");

        assert!(parse_service_error("Could not connect to the endpoint URL").is_none());
        assert!(parse_service_error("").is_none());
    }

    #[test]
    fn test_display_command_stops_at_flags() {
        assert_eq!(
            display_command(&["sts", "assume-role", "--role-arn", "arn:x"]),
            "sts assume-role"
        );
    }

    #[test]
    fn test_command_line_split() {
        let cli = AwsCli::new("  /opt/aws/bin/aws   --no-cli-pager ");
        assert_eq!(cli.program(), "/opt/aws/bin/aws");
        assert_eq!(cli.leading_args, vec!["--no-cli-pager".to_string()]);

        assert_eq!(AwsCli::new("").program(), "aws");
    }
}

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

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CREDENTIALS_FILE_ENV;
use crate::endpoint::TargetEndpoint;
use crate::ssh::known_hosts::StrictHostKeyChecking;

#[derive(Parser, Debug)]
#[command(
    name = "tunneller",
    version,
    about = "Reach a private database through an ephemeral-key bastion tunnel",
    long_about = "tunneller resolves a cloud credential profile (following role-assumption chains),\nlooks up a bastion instance and a database, pushes a short-lived SSH key to the bastion,\nand serves a local port whose connections are relayed to the database through the bastion.",
    after_help = "EXAMPLES:\n  List profiles:          tunneller profiles\n  Check a profile:        tunneller resolve -p ops -r us-east-1\n  Find a bastion:         tunneller instances -p ops -r us-east-1\n  Tunnel to a database:   tunneller connect -p ops -r us-east-1 -b i-0abc123 -d orders-db\n  Tunnel to host:port:    tunneller connect -b i-0abc123 --target 10.0.3.7:5432 -l 15432"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        long,
        global = true,
        help = "Configuration file path [default: ~/.config/tunneller/config.yaml]"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = CREDENTIALS_FILE_ENV,
        help = "Profile definitions file [default: ~/.aws/credentials]"
    )]
    pub credentials: Option<PathBuf>,

    #[arg(
        short = 'v',
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,
}

/// Profile and region selection shared by subcommands
#[derive(Args, Debug, Clone)]
pub struct ProfileArgs {
    #[arg(short = 'p', long, env = "AWS_PROFILE", help = "Profile to resolve")]
    pub profile: Option<String>,

    #[arg(short = 'r', long, env = "AWS_REGION", help = "Region the session is bound to")]
    pub region: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "List profiles in the credentials file",
        long_about = "Shows every profile with its kind. Role profiles list the chain of\nprofiles they are derived from."
    )]
    Profiles,

    #[command(
        about = "Resolve a profile into a session",
        long_about = "Resolves the profile for the region, assuming roles along the chain as\nneeded, and prints a summary of the session. Secrets are never printed.\n\nExit codes: 0 (resolved), 1 (resolution failed)"
    )]
    Resolve {
        #[command(flatten)]
        selection: ProfileArgs,
    },

    #[command(
        about = "List compute instances visible to a profile",
        long_about = "Resolves the profile and lists every instance in the region with its\nstate, address and tags. Use it to find the bastion identifier."
    )]
    Instances {
        #[command(flatten)]
        selection: ProfileArgs,
    },

    #[command(
        about = "List databases visible to a profile",
        long_about = "Resolves the profile and lists every database in the region with its\nengine and endpoint. Use it to find the database identifier."
    )]
    Databases {
        #[command(flatten)]
        selection: ProfileArgs,
    },

    #[command(
        about = "Open a tunnel to a database through a bastion",
        long_about = "Resolves the profile, looks up the bastion and the target, pushes an\nephemeral SSH key to the bastion and listens on a local port. Each local\nconnection is relayed to the target through a fresh bastion session.\nPress Ctrl-C to stop accepting connections.\n\nExit codes: 0 (stopped by the operator), 1 (setup or listener failure)"
    )]
    Connect(ConnectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    #[command(flatten)]
    pub selection: ProfileArgs,

    #[arg(short = 'b', long, help = "Bastion instance identifier")]
    pub bastion: Option<String>,

    #[arg(
        short = 'd',
        long,
        conflicts_with = "target",
        help = "Database instance identifier; its endpoint becomes the target"
    )]
    pub database: Option<String>,

    #[arg(
        long,
        value_parser = clap::value_parser!(TargetEndpoint),
        help = "Explicit target in host:port form, resolved from the bastion"
    )]
    pub target: Option<TargetEndpoint>,

    #[arg(short = 'l', long, help = "Local port to listen on [default: 8888]")]
    pub local_port: Option<u16>,

    #[arg(long, help = "OS user on the bastion [default: ec2-user]")]
    pub os_user: Option<String>,

    #[arg(
        long,
        value_parser = clap::value_parser!(StrictHostKeyChecking),
        help = "Bastion host key checking: yes, no or accept-new [default: accept-new]"
    )]
    pub strict_host_key_checking: Option<StrictHostKeyChecking>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_parsing() {
        let cli = Cli::try_parse_from([
            "tunneller",
            "-vv",
            "connect",
            "-p",
            "ops",
            "-r",
            "us-east-1",
            "-b",
            "i-0abc",
            "--target",
            "10.0.3.7:5432",
            "-l",
            "15432",
            "--strict-host-key-checking",
            "no",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Commands::Connect(args) = cli.command else {
            panic!("expected connect");
        };
        assert_eq!(args.selection.profile.as_deref(), Some("ops"));
        assert_eq!(args.bastion.as_deref(), Some("i-0abc"));
        assert_eq!(args.target, Some(TargetEndpoint::new("10.0.3.7", 5432)));
        assert_eq!(args.local_port, Some(15432));
        assert_eq!(
            args.strict_host_key_checking,
            Some(StrictHostKeyChecking::No)
        );
    }

    #[test]
    fn test_database_conflicts_with_target() {
        let result = Cli::try_parse_from([
            "tunneller",
            "connect",
            "-d",
            "orders",
            "--target",
            "db:5432",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_listing_subcommands() {
        let cli = Cli::try_parse_from(["tunneller", "instances", "-p", "ops", "-r", "eu-west-1"])
            .unwrap();
        let Commands::Instances { selection } = cli.command else {
            panic!("expected instances");
        };
        assert_eq!(selection.profile.as_deref(), Some("ops"));
        assert_eq!(selection.region.as_deref(), Some("eu-west-1"));

        let cli = Cli::try_parse_from(["tunneller", "databases", "-r", "eu-west-1"]).unwrap();
        assert!(matches!(cli.command, Commands::Databases { .. }));
    }

    #[test]
    fn test_credentials_flag_reads_shared_file_env() {
        use clap::CommandFactory;

        let command = Cli::command();
        let credentials = command
            .get_arguments()
            .find(|arg| arg.get_id() == "credentials")
            .unwrap();
        assert_eq!(
            credentials.get_env(),
            Some(std::ffi::OsStr::new(CREDENTIALS_FILE_ENV))
        );
    }

    #[test]
    fn test_bad_target_rejected() {
        let result = Cli::try_parse_from(["tunneller", "connect", "--target", "db:0"]);
        assert!(result.is_err());
    }
}

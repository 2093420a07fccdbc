pub mod aws;
pub mod cli;
pub mod commands;
pub mod config;
pub mod endpoint;
pub mod profile;
pub mod ssh;
pub mod tunnel;
pub mod utils;

pub use cli::Cli;
pub use config::Config;
pub use endpoint::{BastionEndpoint, TargetEndpoint};
pub use profile::{ProfileResolver, ProfileStore, Session};
pub use tunnel::{open_tunnel, TunnelConfig, TunnelHandle};

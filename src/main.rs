use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::auth::ChallengeArgs;
use regcred::config::Config;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage registered registries and their stored passwords
    #[command(subcommand)]
    #[command(visible_alias = "r")]
    Registry(RegistryCommands),
    /// Print the Authorization header for a request to a registry
    Header {
        /// Registry URL as registered
        url: String,
        #[command(flatten)]
        challenge: ChallengeFlags,
    },
    /// Print container CLI login credentials for a registry as JSON
    Credentials {
        /// Registry URL as registered
        url: String,
    },
    /// Log the container CLI into a registry
    Login {
        /// Registry URL as registered
        url: String,
        /// Container CLI to use (defaults to the configured one, or docker)
        #[arg(long)]
        container_cli: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum RegistryCommands {
    /// Register a registry; the password is read from stdin
    #[command(visible_alias = "a")]
    Add {
        /// Registry URL (e.g., https://registry.example.com)
        url: String,
        /// Username (omit for anonymous registries)
        #[arg(long, short)]
        username: Option<String>,
    },
    /// Forget a registry and delete its stored password
    #[command(visible_alias = "rm")]
    Remove {
        /// Registry URL
        url: String,
    },
    /// List registered registries
    #[command(visible_alias = "ls")]
    List {},
}

#[derive(Args, Debug)]
struct ChallengeFlags {
    /// Token endpoint from the registry's challenge
    #[arg(long, conflicts_with = "probe")]
    realm: Option<String>,
    /// Service from the registry's challenge
    #[arg(long)]
    service: Option<String>,
    /// Scope from the registry's challenge
    #[arg(long)]
    scope: Option<String>,
    /// Probe this URL without credentials and use the challenge it returns
    #[arg(long)]
    probe: Option<String>,
}

impl From<ChallengeFlags> for ChallengeArgs {
    fn from(flags: ChallengeFlags) -> Self {
        ChallengeArgs {
            realm: flags.realm,
            service: flags.service,
            scope: flags.scope,
            probe: flags.probe,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so header and credential output stay pipeable
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load()?;

    match cli.command {
        Commands::Registry(RegistryCommands::Add { url, username }) => {
            cli::registry::add_registry(&mut config, &url, username).await
        }
        Commands::Registry(RegistryCommands::Remove { url }) => {
            cli::registry::remove_registry(&mut config, &url).await
        }
        Commands::Registry(RegistryCommands::List {}) => {
            cli::registry::list_registries(&config).await
        }
        Commands::Header { url, challenge } => {
            cli::auth::print_header(&config, &url, challenge.into()).await
        }
        Commands::Credentials { url } => cli::auth::print_credentials(&config, &url).await,
        Commands::Login { url, container_cli } => {
            cli::auth::login_registry(&config, &url, container_cli.as_deref()).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_realm_and_probe_conflict() {
        let result = Cli::try_parse_from([
            "regcred",
            "header",
            "https://reg.example.com",
            "--realm",
            "https://auth.example.com/token",
            "--probe",
            "https://reg.example.com/v2/",
        ]);
        assert!(result.is_err());
    }
}

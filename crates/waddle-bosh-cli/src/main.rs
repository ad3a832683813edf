// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! waddle-bosh - command-line XMPP client over BOSH.
//!
//! Opens a BOSH session with a connection manager and runs one flow:
//! authentication, in-band registration, an administrative command or a
//! service discovery query.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use waddle_bosh::{
    protocol_node, AuthOutcome, BoshClient, DigestMd5, DiscoInfo, Identity, ReqwestHttpClient,
};

mod config;

use config::Config;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// waddle-bosh - XMPP over BOSH from the command line
#[derive(Parser)]
#[command(name = "waddle-bosh")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/waddle-bosh/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// BOSH connection manager URL
    #[arg(long, global = true)]
    service: Option<String>,

    /// Resource to bind
    #[arg(long, global = true)]
    resource: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Account {
    /// Account JID (user@domain)
    #[arg(long)]
    jid: String,

    /// Account password
    #[arg(long, env = "WADDLE_BOSH_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate and establish an XMPP session
    Auth {
        #[command(flatten)]
        account: Account,
    },
    /// Register a new account (XEP-0077)
    Register {
        /// JID of the account to create (user@domain)
        #[arg(long)]
        jid: String,

        /// Registration field value as name=value (repeatable)
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Run a service administration command (XEP-0133)
    Admin {
        #[command(flatten)]
        account: Account,

        #[command(subcommand)]
        action: AdminAction,
    },
    /// Query service discovery information (XEP-0030)
    Disco {
        #[command(flatten)]
        account: Account,

        /// Node to query instead of the domain itself; a short name such as
        /// `admin` means `http://jabber.org/protocol/admin`
        #[arg(long)]
        node: Option<String>,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Print the number of registered users
    UsersCount,
    /// Create an account on the domain
    AddUser {
        #[arg(long)]
        username: String,

        #[arg(long = "user-password")]
        user_password: String,
    },
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got {raw:?}")),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,waddle_bosh=debug"
    } else {
        "warn,waddle_bosh=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(verbose))
        .init();
}

type Client = BoshClient<ReqwestHttpClient, DigestMd5>;

async fn connect(config: &Config, jid: &str, password: &str) -> Result<Client> {
    let identity = Identity::parse(jid, &config.resource)?;
    let http = ReqwestHttpClient::with_connect_timeout(CONNECT_TIMEOUT)
        .context("Failed to build HTTP client")?;
    let mut client = BoshClient::new(
        http,
        DigestMd5::new(),
        identity,
        password,
        config.client_config(),
    );

    client
        .connect(&config.service_url)
        .await
        .with_context(|| format!("Failed to open BOSH session at {}", config.service_url))?;
    Ok(client)
}

async fn login(config: &Config, account: &Account) -> Result<Client> {
    let mut client = connect(config, &account.jid, &account.password).await?;
    match client.authenticate().await {
        AuthOutcome::Success { resource } => {
            info!(jid = %client.identity(), %resource, "Authenticated");
            Ok(client)
        }
        AuthOutcome::Failure(error) => {
            shutdown(&mut client).await;
            Err(error).context("Authentication failed")
        }
    }
}

async fn shutdown(client: &mut Client) {
    if let Err(error) = client.disconnect().await {
        warn!(%error, "Failed to terminate BOSH session cleanly");
    }
    client.close();
}

fn print_disco(info: &DiscoInfo) {
    for identity in &info.identities {
        match &identity.name {
            Some(name) => println!("identity {}/{} ({name})", identity.category, identity.kind),
            None => println!("identity {}/{}", identity.category, identity.kind),
        }
    }
    for feature in &info.features {
        println!("feature {feature}");
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Auth { account } => {
            let mut client = login(&config, &account).await?;
            println!("Authenticated as {}", client.identity().full());
            shutdown(&mut client).await;
        }

        Commands::Register { jid, fields } => {
            let mut client = connect(&config, &jid, "").await?;
            let identity = client.identity().clone();

            let mut values: HashMap<String, String> = fields.into_iter().collect();
            values
                .entry("username".to_string())
                .or_insert_with(|| identity.local().to_string());

            let result = client.register(&values).await;
            shutdown(&mut client).await;
            let outcome = result.context("Registration failed")?;

            if !outcome.defaulted.is_empty() {
                eprintln!(
                    "warning: sent empty values for: {}",
                    outcome.defaulted.join(", ")
                );
            }
            println!("Registered {}", identity.bare());
        }

        Commands::Admin { account, action } => {
            let mut client = login(&config, &account).await?;
            let result = match action {
                AdminAction::UsersCount => client
                    .registered_users_count()
                    .await
                    .map(|count| println!("{count}")),
                AdminAction::AddUser {
                    username,
                    user_password,
                } => client
                    .add_user(&username, &user_password)
                    .await
                    .map(|()| println!("Created {username}@{}", client.identity().domain())),
            };
            shutdown(&mut client).await;
            result.context("Administrative command failed")?;
        }

        Commands::Disco { account, node } => {
            let mut client = login(&config, &account).await?;
            let node = node.as_deref().map(protocol_node);
            let result = client.disco_info(node.as_deref()).await;
            shutdown(&mut client).await;
            print_disco(&result.context("Service discovery failed")?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok())?;
    if let Some(service) = &cli.service {
        config.service_url = service.clone();
    }
    if let Some(resource) = &cli.resource {
        config.resource = resource.clone();
    }
    if config.max_challenge_rounds == 0 {
        bail!("max_challenge_rounds must be at least 1");
    }

    run(cli, config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field() {
        assert_eq!(
            parse_field("username=moi").unwrap(),
            ("username".to_string(), "moi".to_string())
        );
        assert_eq!(
            parse_field("password=a=b").unwrap(),
            ("password".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_field("email=").unwrap(),
            ("email".to_string(), String::new())
        );
        assert!(parse_field("novalue").is_err());
        assert!(parse_field("=x").is_err());
    }

    #[test]
    fn test_cli_parses_admin_add_user() {
        let cli = Cli::try_parse_from([
            "waddle-bosh",
            "--service",
            "http://debian:5280/http-bind/",
            "admin",
            "--jid",
            "admin@debian",
            "--password",
            "pw",
            "add-user",
            "--username",
            "bob",
            "--user-password",
            "secret",
        ])
        .unwrap();

        assert_eq!(cli.service.as_deref(), Some("http://debian:5280/http-bind/"));
        match cli.command {
            Commands::Admin {
                account,
                action: AdminAction::AddUser { username, .. },
            } => {
                assert_eq!(account.jid, "admin@debian");
                assert_eq!(username, "bob");
            }
            _ => panic!("expected admin add-user"),
        }
    }

    #[test]
    fn test_cli_collects_register_fields() {
        let cli = Cli::try_parse_from([
            "waddle-bosh",
            "register",
            "--jid",
            "moi@debian",
            "--field",
            "username=moi",
            "--field",
            "password=blah",
        ])
        .unwrap();

        match cli.command {
            Commands::Register { fields, .. } => assert_eq!(fields.len(), 2),
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn test_cli_disco_short_node() {
        let cli = Cli::try_parse_from([
            "waddle-bosh",
            "disco",
            "--jid",
            "admin@debian",
            "--password",
            "pw",
            "--node",
            "admin",
        ])
        .unwrap();

        match cli.command {
            Commands::Disco { node, .. } => assert_eq!(
                node.as_deref().map(protocol_node).as_deref(),
                Some("http://jabber.org/protocol/admin")
            ),
            _ => panic!("expected disco"),
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

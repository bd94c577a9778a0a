// ABOUTME: Management CLI: schema setup, client registration, credential pruning
// ABOUTME: Thin wrapper over the credential lifecycle managers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Usage:
//! ```bash
//! # Create tables and the default personal access client
//! aegis-cli setup
//!
//! # Register a confidential client for the code + refresh flows
//! aegis-cli client --name "Web App" --redirect https://app.example/cb
//!
//! # Register a public (PKCE) client
//! aegis-cli client --name "Mobile App" --redirect app://cb --public
//!
//! # Register a machine client for client_credentials
//! aegis-cli client --name "Batch Jobs" --credentials
//!
//! # Remove dead tokens and authorization codes
//! aegis-cli purge --days 7
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use aegis_auth_server::config::ServerConfig;
use aegis_auth_server::credentials::tokens::TokenLifetimes;
use aegis_auth_server::credentials::{
    AuthCodeManager, ClientManager, CreateClientInput, TokenManager,
};
use aegis_auth_server::database::Database;
use aegis_auth_server::models::GrantType;

#[derive(Parser)]
#[command(
    name = "aegis-cli",
    about = "Aegis authorization server management CLI",
    long_about = "Command-line tool for managing the Aegis OAuth 2.0 authorization server: \
                  schema setup, client registration, and credential pruning."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Database URL override
    #[arg(long, global = true)]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Create tables and the default personal access client
    Setup,

    /// Register a client and print its credentials
    Client {
        /// Display name
        #[arg(long)]
        name: String,

        /// Registered redirect URI (repeatable)
        #[arg(long = "redirect")]
        redirect_uris: Vec<String>,

        /// Register a public client (no secret; PKCE required)
        #[arg(long)]
        public: bool,

        /// Trust the client to skip the consent screen
        #[arg(long)]
        first_party: bool,

        /// Permit the client_credentials grant
        #[arg(long)]
        credentials: bool,
    },

    /// Prune dead tokens and authorization codes
    Purge {
        /// Retention window for revoked tokens, in days
        #[arg(long)]
        days: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = ServerConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    // Database::new runs the idempotent migrations
    let database = Database::new(&config.database_url).await?;
    let clients = ClientManager::new(database.clone());

    match cli.command {
        Command::Setup => {
            let (client, secret) = clients
                .create(CreateClientInput {
                    name: "Personal Access Client".to_owned(),
                    redirect_uris: Vec::new(),
                    scopes: None,
                    grant_types: Some(Vec::new()),
                    confidential: true,
                    first_party: true,
                })
                .await?;

            println!("Schema is up to date.");
            println!("Personal access client id: {}", client.id);
            if let Some(secret) = secret {
                println!("Personal access client secret: {secret}");
            }
            println!("Set PERSONAL_ACCESS_CLIENT_ID={} to enable personal tokens.", client.id);
        }

        Command::Client {
            name,
            redirect_uris,
            public,
            first_party,
            credentials,
        } => {
            if public && credentials {
                bail!("public clients may not use the client_credentials grant");
            }

            let mut grant_types = vec![GrantType::AuthorizationCode, GrantType::RefreshToken];
            if credentials {
                grant_types.push(GrantType::ClientCredentials);
            }

            let (client, secret) = clients
                .create(CreateClientInput {
                    name,
                    redirect_uris,
                    scopes: None,
                    grant_types: Some(grant_types),
                    confidential: !public,
                    first_party,
                })
                .await?;

            println!("Client id: {}", client.id);
            match secret {
                Some(secret) => println!("Client secret: {secret}"),
                None => println!("Public client: no secret issued (PKCE required)."),
            }
        }

        Command::Purge { days } => {
            let days = days.unwrap_or(config.prune_revoked_after_days);
            let tokens = TokenManager::new(
                database.clone(),
                TokenLifetimes {
                    access: config.access_token_lifetime,
                    refresh: config.refresh_token_lifetime,
                    personal_access: config.personal_access_token_lifetime,
                },
                config.personal_access_client,
            );
            let codes = AuthCodeManager::new(database, config.auth_code_lifetime);

            let pruned_tokens = tokens.prune(days).await?;
            let pruned_codes = codes.prune().await?;
            println!("Pruned {pruned_tokens} tokens and {pruned_codes} authorization codes.");
        }
    }

    Ok(())
}

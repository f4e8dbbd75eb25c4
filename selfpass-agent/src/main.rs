//! `selfpass` command line front end.
//!
//! Each invocation opens the agent on the data directory, performs one
//! command and exits. Commands that touch the keystore log in first with the
//! master password from `--password` or `SELFPASS_PASSWORD`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use selfpass_agent::generator::{generate_password, PasswordOptions};
use selfpass_agent::{load_config, Agent, AgentConfig, PullOutcome};

/// Self-hosted credential store client
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Directory holding the pairing record and encrypted keystore cache
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Path to a JSON config file (defaults to <data-dir>/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct MasterPassword {
    /// Master password
    #[arg(long = "password", env = "SELFPASS_PASSWORD", hide_env_values = true)]
    value: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register this device with a server and create the keystore
    Pair {
        /// Server address, e.g. https://vault.example.com
        #[arg(long)]
        server: String,

        #[arg(long)]
        username: String,

        /// Access key issued by the server
        #[arg(long)]
        access_key: String,

        #[command(flatten)]
        master: MasterPassword,
    },
    /// Save a credential (a password is generated when none is given)
    Add {
        url: String,
        username: String,
        site_password: Option<String>,

        #[command(flatten)]
        master: MasterPassword,
    },
    /// List stored hosts, optionally filtered by a substring
    List {
        #[arg(long)]
        filter: Option<String>,

        #[command(flatten)]
        master: MasterPassword,
    },
    /// Show the current credentials for a URL
    Get {
        url: String,

        #[command(flatten)]
        master: MasterPassword,
    },
    /// Pull and merge the server keystore
    Sync {
        #[command(flatten)]
        master: MasterPassword,
    },
    /// Print a random password
    Generate {
        #[arg(long, default_value_t = 12)]
        length: usize,

        #[arg(long)]
        no_letters: bool,

        #[arg(long)]
        no_numbers: bool,

        #[arg(long)]
        no_special: bool,
    },
    /// Forget this device's pairing and cached keystore
    Unpair,
    /// Show pairing and login state
    Status,
}

fn load_cli_config(cli: &Cli) -> Result<AgentConfig> {
    let defaults = AgentConfig::default();
    let data_dir = cli.data_dir.clone().unwrap_or(defaults.data_dir);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join("config.json"));

    let mut config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    if cli.data_dir.is_some() {
        config.data_dir = data_dir;
    }
    // Each invocation is short-lived; pulls happen explicitly.
    config.pull_on_login = false;
    Ok(config)
}

/// Pull before reading so the output reflects other devices. Offline is fine.
async fn refresh(agent: &Agent) {
    if let Err(e) = agent.sync_now().await {
        warn!("Could not refresh from server: {}", e);
    }
}

async fn run(agent: Agent, command: Command) -> Result<()> {
    match command {
        Command::Pair {
            server,
            username,
            access_key,
            master,
        } => {
            agent
                .pair_device(&server, &username, &access_key, &master.value)
                .await?;
            println!("Paired as {}", username);
        }
        Command::Add {
            url,
            username,
            site_password,
            master,
        } => {
            agent.login(&master.value).await?;
            let password = match site_password {
                Some(password) => password,
                None => {
                    let generated = generate_password(&PasswordOptions::default())?;
                    println!("Generated password: {}", generated);
                    generated
                }
            };
            agent.save_credentials(&url, &username, &password, None).await?;
            println!("Saved {} for {}", username, url);
        }
        Command::List { filter, master } => {
            agent.login(&master.value).await?;
            refresh(&agent).await;
            let hosts = agent.search(filter.as_deref().unwrap_or("")).await?;
            if hosts.is_empty() {
                println!("No credentials stored");
            }
            for host in hosts {
                println!("{}  ({})", host.host, host.usernames.join(", "));
            }
        }
        Command::Get { url, master } => {
            agent.login(&master.value).await?;
            refresh(&agent).await;
            match agent.credentials_for_url(&url).await? {
                Some(credentials) => {
                    for (username, entry) in credentials {
                        println!("{}\t{}", username, entry.password);
                    }
                }
                None => bail!("No credentials for {}", url),
            }
        }
        Command::Sync { master } => {
            agent.login(&master.value).await?;
            match agent.sync_now().await? {
                PullOutcome::Current => println!("Already up to date"),
                PullOutcome::Merged(tag) => println!("Merged server keystore ({})", tag),
            }
        }
        Command::Generate {
            length,
            no_letters,
            no_numbers,
            no_special,
        } => {
            let options = PasswordOptions {
                length,
                letters: !no_letters,
                numbers: !no_numbers,
                special: !no_special,
            };
            println!("{}", generate_password(&options)?);
        }
        Command::Unpair => {
            agent.unpair().await?;
            println!("Device unpaired");
        }
        Command::Status => {
            let status = agent.status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    selfpass_agent::init_tracing("selfpass_agent=info,selfpass=info");

    let cli = Cli::parse();
    let config = load_cli_config(&cli)?;
    let agent = Agent::open(config).context("Failed to open agent")?;

    run(agent, cli.command).await
}

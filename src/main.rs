//! Binary entrypoint for the profiled admin CLI.
//!
//! Commands:
//! - `init` - write a starter `config.toml`
//! - `status` - print the active backend, manifest state and stored entity count
//! - `start` - initialize the profile store, migrating between backends if needed
//! - `get <entity> <key>` - print one value (`server` names the server profile)
//! - `set <entity> <key> <value> [--type T]` - write and persist one value
//!
//! A run that migrated data exits with code 3 so a supervisor can restart it.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use uuid::Uuid;

use profiled::config::Config;
use profiled::data::{
    parse_entity_id, InitOutcome, KeyScope, KeyType, PersistentDataKey, PersistentValue,
    ProfileHandler, SERVER_PROFILE_ID,
};

const EXIT_RESTART_REQUESTED: i32 = 3;

#[derive(Parser)]
#[command(name = "profiled")]
#[command(about = "Player and server profile storage with backend migration")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Show backend and manifest status
    Status,
    /// Initialize storage, running a pending backend migration
    Start,
    /// Print the value of a key for an entity
    Get {
        /// Player UUID or `server`
        entity: String,
        /// Key id, e.g. `shop:coins`
        key: String,
    },
    /// Set and persist the value of a key for an entity
    Set {
        /// Player UUID or `server`
        entity: String,
        /// Key id, e.g. `shop:coins`
        key: String,
        /// New value; lists are comma-separated
        value: String,
        /// Declare an unregistered key with this type (string, int, double, boolean, string_list)
        #[arg(short = 't', long = "type")]
        key_type: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config early to configure logging (Init writes the default instead)
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Status => {
            let config = require_config(pre_config, &cli.config).await?;
            let profiles = ProfileHandler::new(config.storage.clone())?;
            let manifest = profiles.manifest();
            let handler = profiles.handler();
            handler.initialize()?;
            println!("Configured handler: {}", profiles.handler_type());
            println!(
                "Previous handler:   {}",
                manifest
                    .get_string("previous-handler")
                    .unwrap_or_else(|| "(not recorded)".to_string())
            );
            println!(
                "Migration enabled:  {}",
                config.storage.perform_data_migration
            );
            println!(
                "Known keys:         {} player, {} server",
                manifest.get_strings("categorized-keys.player").map(|v| v.len()).unwrap_or(0),
                manifest.get_strings("categorized-keys.server").map(|v| v.len()).unwrap_or(0)
            );
            println!("Stored entities:    {}", handler.entity_ids()?.len());
        }
        Commands::Start => {
            let config = require_config(pre_config, &cli.config).await?;
            let profiles = open_profiles(&config)?;
            info!(
                "Profile store ready on {} with {} known keys",
                profiles.handler_type(),
                profiles.keys().len()
            );
        }
        Commands::Get { entity, key } => {
            let config = require_config(pre_config, &cli.config).await?;
            let profiles = open_profiles(&config)?;
            let id = entity_arg(&entity)?;
            let key = profiles
                .keys()
                .get(&key)
                .ok_or_else(|| anyhow!("Unknown key {} (declare it with `set --type`)", key))?;
            let value = profiles.load(id).read(&key)?;
            println!("{}", value);
        }
        Commands::Set {
            entity,
            key,
            value,
            key_type,
        } => {
            let config = require_config(pre_config, &cli.config).await?;
            let profiles = open_profiles(&config)?;
            let id = entity_arg(&entity)?;
            let key = match (profiles.keys().get(&key), key_type) {
                (Some(existing), _) => existing,
                (None, Some(type_name)) => {
                    let kind = KeyType::from_name(&type_name)
                        .ok_or_else(|| anyhow!("Unknown key type {}", type_name))?;
                    let scope = if id == SERVER_PROFILE_ID {
                        KeyScope::Server
                    } else {
                        KeyScope::Player
                    };
                    profiles
                        .keys()
                        .register(PersistentDataKey::new(key, kind.zero(), scope)?)
                }
                (None, None) => {
                    return Err(anyhow!("Unknown key {} (pass --type to declare it)", key));
                }
            };
            let parsed = PersistentValue::parse_as(key.key_type(), &value)
                .ok_or_else(|| anyhow!("'{}' is not a valid {}", value, key.key_type()))?;

            profiles.load(id).write(&key, parsed)?;
            profiles.save_keys_for(id, std::slice::from_ref(&key))?;
            profiles.save()?;
            info!("Set {} for {}", key, id);
        }
    }

    Ok(())
}

/// Config loaded for logging, or a fresh load that reports why it failed.
async fn require_config(pre_config: Option<Config>, path: &str) -> Result<Config> {
    match pre_config {
        Some(config) => Ok(config),
        None => Config::load(path).await,
    }
}

/// Initialize the profile store. Exits with [`EXIT_RESTART_REQUESTED`] after
/// a migration so the next run starts on the migrated backend.
fn open_profiles(config: &Config) -> Result<ProfileHandler> {
    let profiles = ProfileHandler::new(config.storage.clone())?;
    match profiles.initialize(&Vec::<Uuid>::new())? {
        InitOutcome::Ready => Ok(profiles),
        InitOutcome::RestartRequested(report) => {
            warn!("Restarting after data migration: {}", report);
            std::process::exit(EXIT_RESTART_REQUESTED);
        }
    }
}

fn entity_arg(text: &str) -> Result<Uuid> {
    parse_entity_id(text).ok_or_else(|| anyhow!("'{}' is not a UUID or `server`", text))
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    // CLI verbosity overrides config
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Foreground runs echo to the console as well as the file.
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}

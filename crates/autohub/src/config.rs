//! Process configuration
//!
//! Settings are layered: built-in defaults, then `<storage>/autohub.toml`,
//! then the file given with `--config`, then `AUTOHUB_*` environment
//! variables. Command line flags win over all of them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use hub_bus::BusConfig;
use serde::{Deserialize, Serialize};

/// Name of the optional settings file in the storage root
pub const CONFIG_FILE: &str = "autohub.toml";

/// Log filter used by `--debug`
pub const DEBUG_LOG_FILTER: &str = "autohub=debug,hub_bus=debug";

/// Automation hub server
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "autohub")]
#[command(about = "In-process automation hub", long_about = None, version)]
pub struct Args {
    /// Storage directory for configuration, data and metadata
    #[arg(short, long)]
    pub storage: Option<PathBuf>,

    /// Extra settings file, applied after `<storage>/autohub.toml`
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub storage: PathBuf,
    /// `tracing_subscriber` filter used when `RUST_LOG` is unset
    pub log_filter: String,
    pub heartbeat_secs: u64,
    pub max_concurrent_deliveries: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        let bus = BusConfig::default();
        Self {
            storage: PathBuf::from("./storage"),
            log_filter: "autohub=info,hub_bus=info".to_string(),
            heartbeat_secs: bus.heartbeat_period.as_secs(),
            max_concurrent_deliveries: bus.max_concurrent_deliveries,
        }
    }
}

impl HubConfig {
    /// Resolve the settings for a run
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let storage = args
            .storage
            .clone()
            .unwrap_or_else(|| HubConfig::default().storage);
        let mut figment = Self::figment(&storage);
        if let Some(path) = &args.config {
            figment = figment.merge(Toml::file(path));
        }
        let mut config: HubConfig = figment
            .merge(Env::prefixed("AUTOHUB_"))
            .extract()?;

        if let Some(storage) = &args.storage {
            config.storage = storage.clone();
        }
        if args.debug {
            config.log_filter = DEBUG_LOG_FILTER.to_string();
        }
        Ok(config)
    }

    fn figment(storage: &Path) -> Figment {
        Figment::from(Serialized::defaults(HubConfig {
            storage: storage.to_path_buf(),
            ..HubConfig::default()
        }))
        .merge(Toml::file(storage.join(CONFIG_FILE)))
    }

    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            heartbeat_period: Duration::from_secs(self.heartbeat_secs),
            max_concurrent_deliveries: self.max_concurrent_deliveries.max(1),
        }
    }
}

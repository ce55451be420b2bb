//! TOML configuration for the reef daemon.
//!
//! Without `--config`, the daemon reads `reefd.toml` from the user's config
//! directory if it exists, and falls back to built-in defaults otherwise.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use reef_engine::ServiceConfig;
use reef_types::AdhocStorageType;
use serde::Deserialize;

/// Default port of the ad-hoc storage controller.
pub const DEFAULT_CONTROLLER_PORT: u16 = 52001;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// RPC server settings.
    pub server: ServerSection,
    /// Transfer dispatch.
    pub transfer: TransferSection,
    /// Ad-hoc storage controller.
    pub controller: ControllerSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[server]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address the service listens on.
    pub listen_addr: String,
    /// Runtime worker threads. Defaults to the number of CPUs.
    pub workers: Option<usize>,
    /// File the daemon writes its pid to while running.
    pub pidfile: Option<PathBuf>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:52000".to_string(),
            workers: None,
            pidfile: None,
        }
    }
}

/// `[transfer]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TransferSection {
    /// Data mover used when a job's storage names none.
    pub mover_address: Option<String>,
    /// Default budget for waiting on a transfer, in milliseconds.
    pub wait_timeout_ms: Option<u64>,
    /// Budget for handing a transfer to the data mover, in milliseconds.
    pub dispatch_timeout_ms: Option<u64>,
}

/// `[controller]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControllerSection {
    /// Address `reefd controller` listens on.
    pub listen_addr: String,
    /// Port controllers listen on, used to locate the controller of a
    /// storage from its first node.
    pub port: u16,
    /// Budget for a deploy or terminate call to a controller, in
    /// milliseconds.
    pub timeout_ms: Option<u64>,
    /// Command templates per storage type (`[controller.adhoc.gekkofs]`).
    pub adhoc: BTreeMap<String, AdhocTemplate>,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{DEFAULT_CONTROLLER_PORT}"),
            port: DEFAULT_CONTROLLER_PORT,
            timeout_ms: None,
            adhoc: BTreeMap::new(),
        }
    }
}

/// How the controller starts and stops one storage type.
#[derive(Debug, Clone, Deserialize)]
pub struct AdhocTemplate {
    /// Parent of the per-instance storage directories.
    pub working_directory: PathBuf,
    pub startup: CommandTemplate,
    pub shutdown: CommandTemplate,
}

/// A shell command line with placeholders, and the environment it runs in.
///
/// Recognized placeholders are `{ADHOC_ID}`, `{ADHOC_DIRECTORY}` and
/// `{ADHOC_NODES}`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandTemplate {
    pub command: String,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
    /// Write logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl DaemonConfig {
    /// Load config from `path`, or from the default location if it exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_path().filter(|p| p.exists()),
        };
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(&p)
                    .with_context(|| format!("cannot read {}", p.display()))?;
                Self::from_toml(&content).with_context(|| format!("invalid {}", p.display()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse and validate config from a TOML string.
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (name, template) in &self.controller.adhoc {
            anyhow::ensure!(
                AdhocStorageType::from_name(name).is_some(),
                "unknown ad-hoc storage type `{name}` in [controller.adhoc]"
            );
            anyhow::ensure!(
                !template.startup.command.trim().is_empty(),
                "empty startup command for `{name}`"
            );
            anyhow::ensure!(
                !template.shutdown.command.trim().is_empty(),
                "empty shutdown command for `{name}`"
            );
        }
        if let Some(0) = self.server.workers {
            anyhow::bail!("[server] workers must be at least 1");
        }
        Ok(())
    }

    /// Effective number of runtime worker threads.
    pub fn workers(&self) -> usize {
        self.server.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    /// Effective transfer wait budget. Defaults to 30 seconds.
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer.wait_timeout_ms.unwrap_or(30_000))
    }

    /// Effective budget for handing a transfer to the data mover. Defaults
    /// to 10 seconds.
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer.dispatch_timeout_ms.unwrap_or(10_000))
    }

    /// Effective budget for controller calls. Defaults to 2 minutes, since
    /// startup commands launch whole storage systems.
    pub fn controller_timeout(&self) -> Duration {
        Duration::from_millis(self.controller.timeout_ms.unwrap_or(120_000))
    }

    /// Command templates for `kind`, if configured.
    pub fn template(&self, kind: AdhocStorageType) -> Option<&AdhocTemplate> {
        self.controller.adhoc.get(kind.name())
    }

    /// Settings for the service context.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            default_mover_address: self
                .transfer
                .mover_address
                .clone()
                .filter(|a| !a.is_empty()),
            controller_port: self.controller.port,
            wait_timeout: self.wait_timeout(),
            dispatch_timeout: self.dispatch_timeout(),
            controller_timeout: self.controller_timeout(),
        }
    }
}

/// `<config dir>/reef/reefd.toml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("reef").join("reefd.toml"))
}

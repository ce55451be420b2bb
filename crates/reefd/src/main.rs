//! `reefd`: the reef daemon.
//!
//! # Usage
//!
//! ```text
//! reefd start                               # serve the reef API
//! reefd start -c reefd.toml -l 0.0.0.0:6000 # with a config file and address
//! reefd controller                          # run as an ad-hoc storage controller
//! reefd ping --server host:52000            # check a running daemon
//! reefd query --server host:52000 4711      # look a job up by scheduler id
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reef_engine::ReefService;
use reef_net::{Reply, Request, RpcClient, RpcServer};
use reefd::config::LogSection;
use reefd::{ControllerHandler, DaemonConfig, ServiceHandler};
use tracing::{info, warn};

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "reefd",
    version,
    about = "reef job and storage coordination daemon"
)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the reef API.
    Start {
        /// Override the listen address (e.g. "127.0.0.1:52000").
        #[arg(short, long)]
        listen_addr: Option<String>,

        /// Override the number of runtime worker threads.
        #[arg(short, long)]
        workers: Option<usize>,

        /// Default data mover address.
        #[arg(short, long, env = "REEF_MOVER_ADDRESS")]
        mover_address: Option<String>,

        /// Write the daemon's pid to this file.
        #[arg(short, long)]
        pidfile: Option<PathBuf>,
    },

    /// Run as an ad-hoc storage controller.
    Controller {
        /// Override the controller listen address.
        #[arg(short, long)]
        listen_addr: Option<String>,
    },

    /// Check that a daemon answers.
    Ping {
        /// Daemon address (`host:port`).
        #[arg(short, long, env = "REEF_SERVER")]
        server: String,
    },

    /// Look a job up by its scheduler id.
    Query {
        /// Daemon address (`host:port`).
        #[arg(short, long, env = "REEF_SERVER")]
        server: String,

        /// Batch scheduler job id.
        slurm_id: u64,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = DaemonConfig::load(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Commands::Start {
            listen_addr,
            workers,
            mover_address,
            pidfile,
        } => {
            // CLI args override config file values.
            if let Some(addr) = listen_addr {
                config.server.listen_addr = addr;
            }
            if let Some(n) = workers {
                anyhow::ensure!(n > 0, "--workers must be at least 1");
                config.server.workers = Some(n);
            }
            if let Some(addr) = mover_address {
                config.transfer.mover_address = Some(addr);
            }
            if let Some(path) = pidfile {
                config.server.pidfile = Some(path);
            }
            setup_tracing(&config.log)?;
            runtime(config.workers())?.block_on(cmd_start(config))
        }
        Commands::Controller { listen_addr } => {
            if let Some(addr) = listen_addr {
                config.controller.listen_addr = addr;
            }
            setup_tracing(&config.log)?;
            runtime(config.workers())?.block_on(cmd_controller(config))
        }
        Commands::Ping { server } => runtime(1)?.block_on(cmd_ping(&server)),
        Commands::Query { server, slurm_id } => runtime(1)?.block_on(cmd_query(&server, slurm_id)),
    }
}

fn runtime(workers: usize) -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
}

/// Initialize the `tracing` subscriber.
///
/// Respects `RUST_LOG` if set, otherwise uses the configured level. With
/// `[log] file`, output goes to that file without ANSI colors.
fn setup_tracing(log: &LogSection) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    match &log.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

/// Resolves once Ctrl-C is received.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("interrupt received, shutting down"),
        Err(e) => {
            warn!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    }
}

// -----------------------------------------------------------------------
// Pidfile
// -----------------------------------------------------------------------

/// Holds the pidfile for the lifetime of the daemon; removes it on drop.
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    fn create(path: &Path) -> Result<Self> {
        std::fs::write(path, format!("{}\n", std::process::id()))
            .with_context(|| format!("cannot write pidfile {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), "cannot remove pidfile: {e}");
        }
    }
}

// -----------------------------------------------------------------------
// reefd start
// -----------------------------------------------------------------------

async fn cmd_start(config: DaemonConfig) -> Result<()> {
    let service_config = config.service_config();
    info!(
        listen_addr = %config.server.listen_addr,
        workers = config.workers(),
        mover = service_config.default_mover_address.as_deref().unwrap_or("none"),
        controller_port = service_config.controller_port,
        wait_timeout_ms = service_config.wait_timeout.as_millis() as u64,
        dispatch_timeout_ms = service_config.dispatch_timeout.as_millis() as u64,
        controller_timeout_ms = service_config.controller_timeout.as_millis() as u64,
        "starting reefd"
    );

    let service = Arc::new(ReefService::new(service_config));
    let server = RpcServer::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen_addr))?;
    let _pidfile = config
        .server
        .pidfile
        .as_deref()
        .map(PidFile::create)
        .transpose()?;

    server
        .serve_until(
            Arc::new(ServiceHandler::new(service.clone())),
            shutdown_signal(),
        )
        .await
        .context("rpc server failed")?;

    let torn_down = service.shutdown().await;
    info!(torn_down, "reefd stopped");
    Ok(())
}

// -----------------------------------------------------------------------
// reefd controller
// -----------------------------------------------------------------------

async fn cmd_controller(config: DaemonConfig) -> Result<()> {
    let handler = ControllerHandler::from_config(&config.controller);
    info!(
        listen_addr = %config.controller.listen_addr,
        types = ?config.controller.adhoc.keys().collect::<Vec<_>>(),
        "starting ad-hoc storage controller"
    );

    let server = RpcServer::bind(&config.controller.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.controller.listen_addr))?;
    server
        .serve_until(Arc::new(handler), shutdown_signal())
        .await
        .context("controller server failed")?;

    info!("controller stopped");
    Ok(())
}

// -----------------------------------------------------------------------
// reefd ping / query
// -----------------------------------------------------------------------

async fn cmd_ping(server: &str) -> Result<()> {
    let client = RpcClient::new(server);
    let start = std::time::Instant::now();
    client
        .call(&Request::Ping)
        .await
        .and_then(|r| r.into_result())
        .with_context(|| format!("ping {server} failed"))?;
    println!("{server}: alive ({:.1} ms)", start.elapsed().as_secs_f64() * 1000.0);
    Ok(())
}

async fn cmd_query(server: &str, slurm_id: u64) -> Result<()> {
    let client = RpcClient::new(server);
    let reply = client
        .call(&Request::Query { slurm_id })
        .await
        .and_then(|r| r.into_result())
        .with_context(|| format!("query for slurm job {slurm_id} failed"))?;

    let info = match reply {
        Reply::JobInfo(info) => info,
        other => anyhow::bail!("unexpected reply from {server}: {other:?}"),
    };
    println!("job:                {}", info.job_id);
    println!(
        "adhoc controller:   {}",
        if info.adhoc_controller_address.is_empty() {
            "-"
        } else {
            &info.adhoc_controller_address
        }
    );
    println!("io procs:           {}", info.io_procs);
    Ok(())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_start_overrides() {
        let cli = Cli::try_parse_from([
            "reefd",
            "-c",
            "/etc/reefd.toml",
            "start",
            "--listen-addr",
            "127.0.0.1:6000",
            "--workers",
            "3",
        ])
        .expect("CLI should parse start flags");

        assert_eq!(cli.config, Some(PathBuf::from("/etc/reefd.toml")));
        match cli.command {
            Commands::Start {
                listen_addr,
                workers,
                ..
            } => {
                assert_eq!(listen_addr.as_deref(), Some("127.0.0.1:6000"));
                assert_eq!(workers, Some(3));
            }
            _ => panic!("expected Start command"),
        }
    }

    #[test]
    fn test_cli_query() {
        let cli = Cli::try_parse_from(["reefd", "query", "--server", "h:1", "4711"])
            .expect("CLI should parse query");
        match cli.command {
            Commands::Query { server, slurm_id } => {
                assert_eq!(server, "h:1");
                assert_eq!(slurm_id, 4711);
            }
            _ => panic!("expected Query command"),
        }
    }

    #[test]
    fn test_cli_query_requires_slurm_id() {
        assert!(Cli::try_parse_from(["reefd", "query", "--server", "h:1"]).is_err());
    }

    #[test]
    fn test_pidfile_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reefd.pid");

        let pidfile = PidFile::create(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());

        drop(pidfile);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_ping_and_query_against_server() {
        let service = Arc::new(ReefService::new(Default::default()));
        service
            .register_job(
                4711,
                reef_types::JobResources::default(),
                reef_types::JobRequirements::default(),
            )
            .await
            .unwrap();

        let server = RpcServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let task = tokio::spawn(server.serve(Arc::new(ServiceHandler::new(service))));

        cmd_ping(&addr).await.unwrap();
        cmd_query(&addr, 4711).await.unwrap();
        assert!(cmd_query(&addr, 1).await.is_err());

        task.abort();
    }
}

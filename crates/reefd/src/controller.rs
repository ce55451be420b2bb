//! Ad-hoc storage controller mode.
//!
//! `reefd controller` answers `AdhocDeploy` and `AdhocTerminate` calls by
//! running the startup or shutdown command configured for the storage type.
//! Each instance gets its own directory, `<working_directory>/<adhoc_id>`,
//! created before startup and reported back as the mount path.

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use reef_net::{Reply, Request, RequestHandler, Response};
use reef_types::{AdhocStorageId, AdhocStorageType, ErrorCode, Node};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{AdhocTemplate, CommandTemplate, ControllerSection};
use crate::handler::{log_response, next_rpc_id};

/// Failure to start or stop a storage instance.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// No templates are configured for the storage type.
    #[error("ad-hoc storage type {0} is not supported by this controller")]
    Unsupported(AdhocStorageType),

    /// The instance directory could not be created.
    #[error("cannot create {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The command could not be launched.
    #[error("cannot run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The command ran and reported failure.
    #[error("`{command}` failed: {status}")]
    Failed { command: String, status: ExitStatus },
}

impl ControllerError {
    /// The wire-level kind of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ControllerError::Unsupported(_) => ErrorCode::BadArguments,
            _ => ErrorCode::Undetermined,
        }
    }
}

/// Expand the placeholders of a command template.
///
/// `{ADHOC_NODES}` becomes the comma-joined hostnames in double quotes.
/// Substituted values are not expanded again; unknown `{...}` sequences are
/// kept as they are.
pub fn expand(template: &str, adhoc: AdhocStorageId, directory: &Path, nodes: &[Node]) -> String {
    let id = adhoc.to_string();
    let directory = directory.display().to_string();
    let hostnames: Vec<&str> = nodes.iter().map(|n| n.hostname.as_str()).collect();
    let nodes = format!("\"{}\"", hostnames.join(","));
    let placeholders = [
        ("{ADHOC_ID}", id.as_str()),
        ("{ADHOC_DIRECTORY}", directory.as_str()),
        ("{ADHOC_NODES}", nodes.as_str()),
    ];

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    'scan: while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        for (key, value) in placeholders {
            if let Some(after) = tail.strip_prefix(key) {
                out.push_str(value);
                rest = after;
                continue 'scan;
            }
        }
        out.push('{');
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

/// Runs storage startup and shutdown commands.
pub struct ControllerHandler {
    templates: BTreeMap<AdhocStorageType, AdhocTemplate>,
}

impl ControllerHandler {
    pub fn new(templates: BTreeMap<AdhocStorageType, AdhocTemplate>) -> Self {
        Self { templates }
    }

    /// Build from the `[controller]` section. Entries naming unknown types
    /// are skipped; config loading already rejects them.
    pub fn from_config(section: &ControllerSection) -> Self {
        let templates = section
            .adhoc
            .iter()
            .filter_map(|(name, t)| Some((AdhocStorageType::from_name(name)?, t.clone())))
            .collect();
        Self::new(templates)
    }

    fn template(&self, kind: AdhocStorageType) -> Result<&AdhocTemplate, ControllerError> {
        self.templates
            .get(&kind)
            .ok_or(ControllerError::Unsupported(kind))
    }

    /// Start an instance. Returns its directory.
    pub async fn deploy(
        &self,
        adhoc: AdhocStorageId,
        kind: AdhocStorageType,
        nodes: &[Node],
    ) -> Result<String, ControllerError> {
        let template = self.template(kind)?;
        let directory = template.working_directory.join(adhoc.to_string());

        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|source| ControllerError::Directory {
                path: directory.clone(),
                source,
            })?;

        run(&template.startup, adhoc, &directory, nodes).await?;
        info!(%adhoc, %kind, directory = %directory.display(), "storage started");
        Ok(directory.display().to_string())
    }

    /// Stop an instance.
    pub async fn terminate(
        &self,
        adhoc: AdhocStorageId,
        kind: AdhocStorageType,
        nodes: &[Node],
    ) -> Result<(), ControllerError> {
        let template = self.template(kind)?;
        let directory = template.working_directory.join(adhoc.to_string());

        run(&template.shutdown, adhoc, &directory, nodes).await?;
        info!(%adhoc, %kind, "storage stopped");
        Ok(())
    }
}

async fn run(
    template: &CommandTemplate,
    adhoc: AdhocStorageId,
    directory: &Path,
    nodes: &[Node],
) -> Result<(), ControllerError> {
    let command = expand(&template.command, adhoc, directory, nodes);
    debug!(%adhoc, %command, "running");

    let status = Command::new("sh")
        .arg("-c")
        .arg(&command)
        .envs(&template.environment)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|source| ControllerError::Spawn {
            command: command.clone(),
            source,
        })?;

    if !status.success() {
        return Err(ControllerError::Failed { command, status });
    }
    Ok(())
}

#[async_trait::async_trait]
impl RequestHandler for ControllerHandler {
    async fn handle(&self, request: Request, peer: SocketAddr) -> Response {
        let rpc_id = next_rpc_id();
        let name = request.name();
        info!(rpc_id, rpc = name, %peer, "=> request");

        let response = match request {
            Request::Ping => Response::ok(Reply::Empty),
            Request::AdhocDeploy {
                adhoc,
                kind,
                resources,
                ..
            } => match self.deploy(adhoc, kind, &resources.nodes).await {
                Ok(path) => Response::ok(Reply::MountPath(path)),
                Err(e) => Response::error(e.code(), e.to_string()),
            },
            Request::AdhocTerminate {
                adhoc,
                kind,
                resources,
            } => match self.terminate(adhoc, kind, &resources.nodes).await {
                Ok(()) => Response::ok(Reply::Empty),
                Err(e) => Response::error(e.code(), e.to_string()),
            },
            other => Response::error(
                ErrorCode::BadArguments,
                format!("{} is not served by a controller", other.name()),
            ),
        };

        log_response(rpc_id, name, peer, &response);
        response
    }
}

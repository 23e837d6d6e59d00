//! Docker-backed executor: one long-lived labelled container per image.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use futures::{StreamExt, TryStreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    ExecOptions, ExecOutput, Executor, KEEPALIVE_COMMAND, MANAGED_BY_LABEL, MANAGED_BY_VALUE,
    cancellable, managed_by_selector,
};
use crate::error::{Result, SoarError};

/// Seconds bollard waits on a single daemon request.
const DAEMON_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerSettings {
    pub image: String,
    /// `unix:///path/docker.sock`, `tcp://host:port` or `http://host:port`.
    /// Local defaults (`DOCKER_HOST` or the platform socket) when unset.
    pub host: Option<String>,
}

impl DockerSettings {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            host: None,
        }
    }

    fn connect(&self) -> Result<Docker> {
        let docker = match self.host.as_deref() {
            None => Docker::connect_with_local_defaults(),
            Some(host) if host.starts_with("unix://") => Docker::connect_with_socket(
                host,
                DAEMON_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
            Some(host) => {
                let host = host.replacen("tcp://", "http://", 1);
                Docker::connect_with_http(&host, DAEMON_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
        };
        docker.map_err(|e| SoarError::provisioning(format!("failed to connect to docker: {e}")))
    }
}

pub struct DockerExecutor {
    docker: Docker,
    image: String,
    container_id: String,
    exec_lock: Mutex<()>,
}

impl fmt::Debug for DockerExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerExecutor")
            .field("image", &self.image)
            .field("container_id", &self.container_id)
            .finish()
    }
}

impl DockerExecutor {
    /// Reuses the first running container labelled `managed-by=soar` for the
    /// image, otherwise pulls the image and starts a new one.
    pub async fn provision(settings: DockerSettings, cancel: &CancellationToken) -> Result<Self> {
        let docker = settings.connect()?;
        let image = settings.image;
        let container_id = cancellable(cancel, "docker provisioning", async {
            match find_managed_container(&docker, &image).await? {
                Some(id) => {
                    debug!(target: "soar::executor", %image, container = %id, "reusing container");
                    Ok(id)
                }
                None => start_container(&docker, &image).await,
            }
        })
        .await?;

        Ok(Self {
            docker,
            image,
            container_id,
            exec_lock: Mutex::new(()),
        })
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    async fn exec(&self, cmd: &[String], options: &ExecOptions) -> Result<ExecOutput> {
        let exec = self
            .docker
            .create_exec(
                &self.container_id,
                CreateExecOptions {
                    attach_stdout: Some(!options.ignore_stdout),
                    attach_stderr: Some(true),
                    env: Some(options.env_pairs()),
                    cmd: Some(cmd.to_vec()),
                    tty: Some(false),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SoarError::execution(format!("docker exec create failed: {e}")))?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| SoarError::execution(format!("docker exec start failed: {e}")))?;

        let mut output = match started {
            StartExecResults::Attached { output, .. } => output,
            StartExecResults::Detached => {
                return Err(SoarError::execution("docker exec started detached"));
            }
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Some(frame) = output.next().await {
            match frame.map_err(|e| SoarError::execution(format!("docker exec stream: {e}")))? {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    stdout.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdErr { message } => {
                    stderr.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdIn { .. } => {}
            }
        }

        Ok(ExecOutput::new(stdout, stderr))
    }
}

async fn find_managed_container(docker: &Docker, image: &str) -> Result<Option<String>> {
    let filters = HashMap::from([("label".to_string(), vec![managed_by_selector()])]);
    let containers = docker
        .list_containers(Some(ListContainersOptions::<String> {
            filters,
            ..Default::default()
        }))
        .await
        .map_err(|e| SoarError::provisioning(format!("failed to list containers: {e}")))?;

    Ok(containers
        .into_iter()
        .filter(|c| c.image.as_deref() == Some(image))
        .find_map(|c| c.id))
}

async fn start_container(docker: &Docker, image: &str) -> Result<String> {
    info!(target: "soar::executor", %image, "booting new container");

    docker
        .create_image(
            Some(CreateImageOptions::<String> {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        )
        .try_collect::<Vec<_>>()
        .await
        .map_err(|e| SoarError::provisioning(format!("failed to pull {image}: {e}")))?;

    let labels = HashMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string())]);
    let created = docker
        .create_container(
            None::<CreateContainerOptions<String>>,
            Config {
                image: Some(image.to_string()),
                cmd: Some(KEEPALIVE_COMMAND.iter().map(|s| s.to_string()).collect()),
                labels: Some(labels),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| SoarError::provisioning(format!("failed to create container: {e}")))?;

    docker
        .start_container(&created.id, None::<StartContainerOptions<String>>)
        .await
        .map_err(|e| SoarError::provisioning(format!("failed to start container: {e}")))?;

    info!(target: "soar::executor", %image, container = %created.id, "container started");
    Ok(created.id)
}

#[async_trait]
impl Executor for DockerExecutor {
    fn name(&self) -> &str {
        "docker"
    }

    async fn run(
        &self,
        cmd: &[String],
        options: &ExecOptions,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput> {
        let _guard = self.exec_lock.lock().await;
        let output = cancellable(cancel, "docker exec", self.exec(cmd, options)).await?;
        output.check(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcp_hosts_are_accepted() {
        let settings = DockerSettings {
            image: "alpine".into(),
            host: Some("tcp://127.0.0.1:2375".into()),
        };
        assert!(settings.connect().is_ok());
    }
}

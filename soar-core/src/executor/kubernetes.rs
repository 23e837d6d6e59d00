//! Kubernetes-backed executor: one long-lived labelled pod per image.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{AttachParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    ExecOptions, ExecOutput, Executor, KEEPALIVE_COMMAND, MANAGED_BY_LABEL, MANAGED_BY_VALUE,
    cancellable, managed_by_selector,
};
use crate::error::{Result, SoarError};

pub const MAIN_CONTAINER: &str = "main-container";
const POD_NAME_PREFIX: &str = "soar-pod";

/// Where the kubeconfig comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KubeConfigSource {
    /// In-cluster service account, `$KUBECONFIG` or `~/.kube/config`.
    #[default]
    Automatic,
    File(PathBuf),
    /// Inline kubeconfig YAML.
    Content(String),
}

impl KubeConfigSource {
    async fn client(&self) -> Result<Client> {
        let config = match self {
            KubeConfigSource::Automatic => Config::infer()
                .await
                .map_err(|e| SoarError::provisioning(format!("failed to infer kubeconfig: {e}")))?,
            KubeConfigSource::File(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    SoarError::provisioning(format!(
                        "failed to read kubeconfig {}: {e}",
                        path.display()
                    ))
                })?;
                from_kubeconfig(kubeconfig).await?
            }
            KubeConfigSource::Content(content) => {
                if content.trim().is_empty() {
                    return Err(SoarError::provisioning("kubeconfig content is empty"));
                }
                let kubeconfig = Kubeconfig::from_yaml(content).map_err(|e| {
                    SoarError::provisioning(format!("failed to parse kubeconfig: {e}"))
                })?;
                from_kubeconfig(kubeconfig).await?
            }
        };
        Client::try_from(config)
            .map_err(|e| SoarError::provisioning(format!("failed to build kube client: {e}")))
    }
}

async fn from_kubeconfig(kubeconfig: Kubeconfig) -> Result<Config> {
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| SoarError::provisioning(format!("invalid kubeconfig: {e}")))
}

/// Bounds the wait for a `Pending` pod to reach `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubernetesSettings {
    pub namespace: String,
    pub image: String,
    pub source: KubeConfigSource,
    pub readiness: ReadinessPolicy,
}

impl KubernetesSettings {
    pub fn new(namespace: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            image: image.into(),
            source: KubeConfigSource::default(),
            readiness: ReadinessPolicy::default(),
        }
    }
}

pub struct KubernetesExecutor {
    pods: Api<Pod>,
    namespace: String,
    pod_name: String,
    exec_lock: Mutex<()>,
}

impl fmt::Debug for KubernetesExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubernetesExecutor")
            .field("namespace", &self.namespace)
            .field("pod", &self.pod_name)
            .finish()
    }
}

impl KubernetesExecutor {
    /// Reuses a running or pending managed pod for the image, or creates one,
    /// then waits for it to reach `Running` under the readiness policy.
    pub async fn provision(settings: KubernetesSettings, cancel: &CancellationToken) -> Result<Self> {
        let client = cancellable(cancel, "kubernetes client", settings.source.client()).await?;
        let pods: Api<Pod> = Api::namespaced(client, &settings.namespace);

        let pod_name = cancellable(cancel, "kubernetes provisioning", async {
            match find_managed_pod(&pods, &settings.image).await? {
                Some(name) => {
                    debug!(target: "soar::executor", pod = %name, "reusing pod");
                    Ok(name)
                }
                None => create_pod(&pods, &settings.namespace, &settings.image).await,
            }
        })
        .await?;

        wait_until_running(&pods, &pod_name, settings.readiness, cancel).await?;

        Ok(Self {
            pods,
            namespace: settings.namespace,
            pod_name,
            exec_lock: Mutex::new(()),
        })
    }

    pub fn pod_name(&self) -> &str {
        &self.pod_name
    }

    async fn exec(&self, cmd: &[String], options: &ExecOptions) -> Result<ExecOutput> {
        let params = AttachParams::default()
            .container(MAIN_CONTAINER)
            .stdin(false)
            .stdout(true)
            .stderr(true);
        let mut attached = self
            .pods
            .exec(&self.pod_name, exec_argv(cmd, options), &params)
            .await
            .map_err(|e| SoarError::execution(format!("pod exec failed: {e}")))?;

        let stdout = attached.stdout();
        let stderr = attached.stderr();
        let status = attached.take_status();
        let (stdout, stderr) = tokio::try_join!(read_stream(stdout), read_stream(stderr))?;

        if let Some(status) = status {
            if let Some(status) = status.await {
                if status.status.as_deref() == Some("Failure") {
                    let message = status
                        .message
                        .unwrap_or_else(|| "pod exec reported failure".to_string());
                    return Err(SoarError::execution(message));
                }
            }
        }
        attached
            .join()
            .await
            .map_err(|e| SoarError::execution(format!("pod exec did not finish cleanly: {e}")))?;

        Ok(ExecOutput::new(stdout, stderr))
    }
}

/// `env K=V ... <cmd>` so the environment reaches the exec'd process.
fn exec_argv(cmd: &[String], options: &ExecOptions) -> Vec<String> {
    let mut argv = Vec::with_capacity(cmd.len() + options.env.len() + 1);
    argv.push("env".to_string());
    argv.extend(options.env_pairs());
    argv.extend(cmd.iter().cloned());
    argv
}

async fn read_stream(reader: Option<impl AsyncRead + Unpin>) -> Result<String> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|s| s.phase.as_deref())
}

fn is_reusable(pod: &Pod, image: &str) -> bool {
    let phase_ok = matches!(pod_phase(pod), Some("Running") | Some("Pending"));
    let image_ok = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.containers.first())
        .and_then(|c| c.image.as_deref())
        == Some(image);
    phase_ok && image_ok
}

async fn find_managed_pod(pods: &Api<Pod>, image: &str) -> Result<Option<String>> {
    let list = pods
        .list(&ListParams::default().labels(&managed_by_selector()))
        .await
        .map_err(|e| SoarError::provisioning(format!("failed to list pods: {e}")))?;
    Ok(list
        .items
        .into_iter()
        .filter(|pod| is_reusable(pod, image))
        .find_map(|pod| pod.metadata.name))
}

fn pod_manifest(name: &str, namespace: &str, image: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                MANAGED_BY_VALUE.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Always".to_string()),
            containers: vec![Container {
                name: MAIN_CONTAINER.to_string(),
                image: Some(image.to_string()),
                image_pull_policy: Some("Always".to_string()),
                args: Some(KEEPALIVE_COMMAND.iter().map(|s| s.to_string()).collect()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

async fn create_pod(pods: &Api<Pod>, namespace: &str, image: &str) -> Result<String> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let name = format!("{POD_NAME_PREFIX}-{millis}");
    info!(target: "soar::executor", %image, pod = %name, "booting new pod");

    pods.create(&PostParams::default(), &pod_manifest(&name, namespace, image))
        .await
        .map_err(|e| SoarError::provisioning(format!("failed to create pod {name}: {e}")))?;
    Ok(name)
}

async fn wait_until_running(
    pods: &Api<Pod>,
    name: &str,
    policy: ReadinessPolicy,
    cancel: &CancellationToken,
) -> Result<()> {
    poll_until_running(name, policy, cancel, || pods.get(name)).await
}

/// Polls `fetch` until the pod reports `Running`. Each read is bounded by the
/// overall deadline and by `cancel`.
async fn poll_until_running<F, Fut>(
    name: &str,
    policy: ReadinessPolicy,
    cancel: &CancellationToken,
    mut fetch: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<Pod, kube::Error>>,
{
    let deadline = Instant::now() + policy.timeout;
    let timed_out =
        || SoarError::provisioning(format!("pod {name} not running after {:?}", policy.timeout));
    let waiting = format!("waiting for pod {name}");

    loop {
        let request = fetch();
        let pod = cancellable(cancel, &waiting, async {
            tokio::time::timeout_at(deadline, request)
                .await
                .map_err(|_| timed_out())?
                .map_err(|e| SoarError::provisioning(format!("failed to read pod {name}: {e}")))
        })
        .await?;
        match pod_phase(&pod) {
            Some("Running") => return Ok(()),
            Some(phase @ ("Failed" | "Succeeded")) => {
                return Err(SoarError::provisioning(format!(
                    "pod {name} terminated with phase {phase}"
                )));
            }
            phase => debug!(target: "soar::executor", pod = %name, ?phase, "waiting for pod"),
        }

        if Instant::now() + policy.poll_interval > deadline {
            return Err(timed_out());
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(SoarError::Cancelled(waiting)),
            _ = tokio::time::sleep(policy.poll_interval) => {}
        }
    }
}

#[async_trait]
impl Executor for KubernetesExecutor {
    fn name(&self) -> &str {
        "kubernetes"
    }

    async fn run(
        &self,
        cmd: &[String],
        options: &ExecOptions,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput> {
        let _guard = self.exec_lock.lock().await;
        let output = cancellable(cancel, "pod exec", self.exec(cmd, options)).await?;
        output.check(options)
    }
}

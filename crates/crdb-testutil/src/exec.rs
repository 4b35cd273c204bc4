//! Remote command execution inside cluster members
//!
//! Administrative commands such as `cockroach node status` only exist inside
//! the database container, so their output is obtained through the pod exec
//! subresource.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crdb_common::Error;

/// Captured output of a finished command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Everything written to stdout
    pub stdout: String,
    /// Everything written to stderr
    pub stderr: String,
}

/// Runs a command in a container and collects its output
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteCommandExecutor: Send + Sync {
    /// Run `command` in `container` of `pod` and wait for it to finish
    ///
    /// Returns `Err` if the command could not be started or exited with a
    /// failure status. A non-empty stderr is returned as output; callers
    /// decide whether that is fatal.
    async fn exec(&self, pod: &str, container: &str, command: &[String])
        -> Result<ExecOutput, Error>;
}

/// [`RemoteCommandExecutor`] using the Kubernetes exec subresource
#[derive(Clone)]
pub struct KubeExecutor {
    client: Client,
    namespace: String,
}

impl KubeExecutor {
    /// Create an executor for pods in one namespace
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

async fn read_stream<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<String> {
    let mut out = String::new();
    if let Some(mut reader) = reader {
        reader.read_to_string(&mut out).await?;
    }
    Ok(out)
}

#[async_trait]
impl RemoteCommandExecutor for KubeExecutor {
    async fn exec(
        &self,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> Result<ExecOutput, Error> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);

        debug!(pod, container, command = ?command, "Executing command");

        let mut attached = pods
            .exec(pod, command.to_vec(), &params)
            .await
            .map_err(|e| Error::exec(pod, format!("failed to start command: {e}")))?;

        let status = attached.take_status();
        let (stdout, stderr) = tokio::join!(
            read_stream(attached.stdout()),
            read_stream(attached.stderr())
        );
        let stdout = stdout.map_err(|e| Error::exec(pod, format!("reading stdout: {e}")))?;
        let stderr = stderr.map_err(|e| Error::exec(pod, format!("reading stderr: {e}")))?;

        attached
            .join()
            .await
            .map_err(|e| Error::exec(pod, format!("exec session failed: {e}")))?;

        if let Some(status) = status {
            if let Some(status) = status.await {
                if status.status.as_deref() == Some("Failure") {
                    return Err(Error::exec(
                        pod,
                        status
                            .message
                            .unwrap_or_else(|| "command exited with failure".to_string()),
                    ));
                }
            }
        }

        Ok(ExecOutput { stdout, stderr })
    }
}

//! Container-backed sandbox launches through the Docker daemon.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, KillContainerOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::models::{HostConfig, ResourcesUlimits};
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use gavel_common::config::Config;

use super::SandboxExit;

/// Runner baked into the sandbox image.
const RUNNER_PATH: &str = "/usr/local/bin/gavel-runner";
/// Mount point of the work directory inside the container.
const WORKSPACE_MOUNT: &str = "/workspace";
const MAX_PIDS: i64 = 64;
const MAX_OPEN_FILES: i64 = 64;
const MAX_FILE_SIZE_BYTES: i64 = 10 * 1024 * 1024;

pub(crate) struct ContainerEngine {
    docker: Docker,
    image: String,
}

/// Force-removes the container even if the executing task panics or is
/// cancelled. Drop cannot be async, so removal is spawned.
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let docker = self.docker.clone();
        let container_id = self.container_id.clone();
        tokio::spawn(async move {
            let options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            if let Err(err) = docker.remove_container(&container_id, Some(options)).await {
                warn!(container = %container_id, error = %err, "failed to remove container");
            }
        });
    }
}

impl ContainerEngine {
    pub(crate) fn new(config: &Config) -> Result<ContainerEngine> {
        let docker = Docker::connect_with_local_defaults()
            .context("failed to connect to the Docker daemon")?;
        Ok(ContainerEngine {
            docker,
            image: config.sandbox_image.clone(),
        })
    }

    pub(crate) async fn launch(
        &self,
        workdir: &Path,
        language: &str,
        time_limit_s: u64,
        case_count: usize,
        memory_limit_mb: u64,
        wall_cap: Duration,
    ) -> Result<SandboxExit> {
        let memory_bytes = (memory_limit_mb * 1024 * 1024) as i64;
        let host_config = HostConfig {
            binds: Some(vec![format!("{}:{}", workdir.display(), WORKSPACE_MOUNT)]),
            memory: Some(memory_bytes),
            // Swap equal to memory: the submission gets no swap at all.
            memory_swap: Some(memory_bytes),
            // One logical CPU.
            nano_cpus: Some(1_000_000_000),
            pids_limit: Some(MAX_PIDS),
            ulimits: Some(vec![
                ResourcesUlimits {
                    name: Some("nofile".to_string()),
                    soft: Some(MAX_OPEN_FILES),
                    hard: Some(MAX_OPEN_FILES),
                },
                ResourcesUlimits {
                    name: Some("fsize".to_string()),
                    soft: Some(MAX_FILE_SIZE_BYTES),
                    hard: Some(MAX_FILE_SIZE_BYTES),
                },
            ]),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            ..Default::default()
        };

        let container_config = ContainerConfig {
            image: Some(self.image.clone()),
            cmd: Some(vec![
                RUNNER_PATH.to_string(),
                language.to_string(),
                time_limit_s.to_string(),
                case_count.to_string(),
            ]),
            working_dir: Some(WORKSPACE_MOUNT.to_string()),
            network_disabled: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        let name = format!("gavel-{}", Uuid::new_v4());
        let options = CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        };
        let container = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .context("failed to create sandbox container")?;
        let container_id = container.id.clone();
        let _guard = ContainerGuard {
            docker: self.docker.clone(),
            container_id: container_id.clone(),
        };

        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .context("failed to start sandbox container")?;

        let status_code = match tokio::time::timeout(wall_cap, self.wait_for_exit(&container_id))
            .await
        {
            Ok(code) => code,
            Err(_) => {
                warn!(container = %container_id, "submission wall cap expired, killing sandbox");
                if let Err(err) = self
                    .docker
                    .kill_container(&container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(container = %container_id, error = %err, "failed to kill sandbox");
                }
                // SIGKILL surfaces as 137. Metas already flushed to disk are
                // still honoured when results are collected.
                Some(137)
            }
        };

        debug!(container = %container_id, status = ?status_code, "sandbox exited");
        Ok(SandboxExit { status_code })
    }

    async fn wait_for_exit(&self, container_id: &str) -> Option<i64> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut wait_stream = self.docker.wait_container(container_id, Some(options));
        match wait_stream.next().await {
            Some(Ok(response)) => Some(response.status_code),
            // bollard reports a non-zero container exit as an error variant
            // that still carries the status code.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Some(code),
            Some(Err(err)) => {
                warn!(container = %container_id, error = %err, "failed waiting for sandbox");
                None
            }
            None => None,
        }
    }
}

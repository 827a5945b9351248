//! Direct-subprocess sandbox backend, for hosts without a container runtime.
//!
//! Spawns the runner straight on the host with the work directory as its
//! current directory. Only the submission-level wall clock is enforced here
//! (the per-case cap still comes from the runner itself) and memory
//! accounting is best-effort: outside a container the runner's cgroup
//! reading describes the wrong scope, so those numbers should not be trusted.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

use gavel_common::config::Config;

use super::SandboxExit;

pub(crate) struct ProcessEngine {
    runner_command: String,
}

impl ProcessEngine {
    pub(crate) fn new(config: &Config) -> ProcessEngine {
        ProcessEngine {
            runner_command: config.runner_command.clone(),
        }
    }

    pub(crate) async fn launch(
        &self,
        workdir: &Path,
        language: &str,
        time_limit_s: u64,
        case_count: usize,
        wall_cap: Duration,
    ) -> Result<SandboxExit> {
        let mut child = Command::new(&self.runner_command)
            .arg(language)
            .arg(time_limit_s.to_string())
            .arg(case_count.to_string())
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn runner {}", self.runner_command))?;

        let status_code = match timeout(wall_cap, child.wait()).await {
            Ok(status) => {
                let status = status.context("failed waiting for runner")?;
                Some(effective_code(status))
            }
            Err(_) => {
                warn!("submission wall cap expired, killing runner");
                if let Err(err) = child.start_kill() {
                    warn!(error = %err, "failed to kill runner");
                }
                let _ = child.wait().await;
                // Attributed like a SIGKILLed sandbox.
                Some(137)
            }
        };

        Ok(SandboxExit { status_code })
    }
}

fn effective_code(status: std::process::ExitStatus) -> i64 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .map(i64::from)
        .unwrap_or_else(|| 128 + i64::from(status.signal().unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    #[test]
    fn effective_code_maps_signals_like_a_shell() {
        assert_eq!(effective_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(effective_code(ExitStatus::from_raw(1 << 8)), 1);
        assert_eq!(effective_code(ExitStatus::from_raw(9)), 137);
    }
}

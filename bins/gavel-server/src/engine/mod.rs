//! Batch executor.
//!
//! Prepares the ephemeral work directory, launches exactly one sandbox per
//! submission, and turns whatever the runner left behind into per-case
//! results. The two backends share everything except how the sandboxed
//! region is invoked; selection is static at startup.
//!
//! Failure semantics: the only error that crosses this boundary is an
//! unsupported language tag. Everything else on the happy path is caught and
//! folded into N internal-error results, and the work directory is removed
//! on every path.

mod container;
mod process;
mod workdir;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::fs;
use tracing::{info, warn};

use gavel_common::config::{Config, ExecutionMode};
use gavel_common::languages::{self, LanguageSpec};
use gavel_common::meta::MetaRecord;
use gavel_common::types::{attribute_unrecorded, CaseResult, Submission};

use self::container::ContainerEngine;
use self::process::ProcessEngine;
use self::workdir::WorkDir;

/// Submission-level grace on top of `N x time_limit`, covering compilation
/// and sandbox startup.
const WALL_CAP_GRACE_S: u64 = 20;
const STDOUT_CAP_BYTES: usize = 10_000;
const STDERR_CAP_BYTES: usize = 5_000;
const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Exit observed from the sandbox itself, not from the submitted program.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SandboxExit {
    pub status_code: Option<i64>,
}

enum Backend {
    Container(ContainerEngine),
    Process(ProcessEngine),
}

pub struct ExecutionEngine {
    backend: Backend,
    config: Arc<Config>,
}

impl ExecutionEngine {
    pub fn from_config(config: Arc<Config>) -> Result<ExecutionEngine> {
        let backend = match config.execution_mode {
            ExecutionMode::Container => Backend::Container(ContainerEngine::new(&config)?),
            ExecutionMode::Process => Backend::Process(ProcessEngine::new(&config)),
        };
        Ok(ExecutionEngine { backend, config })
    }

    /// Convenience wrapper over [`ExecutionEngine::execute_batch`] for the
    /// single-input form.
    pub async fn execute_one(&self, submission: Submission) -> Result<CaseResult> {
        debug_assert_eq!(submission.inputs.len(), 1);
        let mut results = self.execute_batch(submission).await?;
        Ok(results.remove(0))
    }

    pub async fn execute_batch(&self, submission: Submission) -> Result<Vec<CaseResult>> {
        let Some(language) = languages::get(&submission.language) else {
            bail!("unsupported language: {}", submission.language);
        };
        let case_count = submission.inputs.len();
        // Defence in depth; validation upstream already enforced the bounds.
        let time_limit_s = self.config.clamp_time_limit(submission.time_limit_s);
        let memory_limit_mb = self.config.clamp_memory_limit(submission.memory_limit_mb);

        let workdir = match WorkDir::create(&self.config.temp_dir).await {
            Ok(workdir) => workdir,
            Err(err) => {
                warn!(error = %err, "failed to prepare work directory");
                return Ok(internal_error_results(case_count, &format!("{err:#}")));
            }
        };

        let outcome = self
            .run_sandboxed(&workdir, language, &submission, time_limit_s, memory_limit_mb)
            .await;

        let results = match outcome {
            Ok(sandbox_exit) => collect_results(&workdir, case_count, sandbox_exit).await,
            Err(err) => {
                warn!(
                    language = %submission.language,
                    error = %err,
                    "sandbox execution failed"
                );
                internal_error_results(case_count, &format!("{err:#}"))
            }
        };

        workdir.cleanup().await;
        Ok(results)
    }

    async fn run_sandboxed(
        &self,
        workdir: &WorkDir,
        language: &LanguageSpec,
        submission: &Submission,
        time_limit_s: u64,
        memory_limit_mb: u64,
    ) -> Result<SandboxExit> {
        tokio::try_join!(
            workdir.write_source(language.source_file, &submission.source),
            workdir.write_inputs(&submission.inputs),
        )?;

        let case_count = submission.inputs.len();
        let wall_cap =
            Duration::from_secs(time_limit_s * case_count as u64 + WALL_CAP_GRACE_S);

        info!(
            language = language.tag,
            cases = case_count,
            time_limit_s,
            memory_limit_mb,
            "launching sandbox"
        );

        match &self.backend {
            Backend::Container(engine) => {
                engine
                    .launch(
                        workdir.path(),
                        language.tag,
                        time_limit_s,
                        case_count,
                        memory_limit_mb,
                        wall_cap,
                    )
                    .await
            }
            Backend::Process(engine) => {
                engine
                    .launch(workdir.path(), language.tag, time_limit_s, case_count, wall_cap)
                    .await
            }
        }
    }
}

fn internal_error_results(case_count: usize, message: &str) -> Vec<CaseResult> {
    (0..case_count)
        .map(|_| CaseResult::internal_error(message))
        .collect()
}

/// Read back `results/<i>.meta` for every case. A missing or verdict-less
/// record is attributed from the sandbox's own exit status. This is the only place
/// a per-case verdict is synthesised without runner evidence.
async fn collect_results(
    workdir: &WorkDir,
    case_count: usize,
    sandbox_exit: SandboxExit,
) -> Vec<CaseResult> {
    let mut results = Vec::with_capacity(case_count);
    for index in 1..=case_count {
        let stdout = read_truncated(&workdir.result_path(index, "out"), STDOUT_CAP_BYTES).await;
        let stderr = read_truncated(&workdir.result_path(index, "err"), STDERR_CAP_BYTES).await;
        let meta = fs::read_to_string(workdir.result_path(index, "meta"))
            .await
            .ok()
            .and_then(|content| MetaRecord::parse(&content));

        let result = match meta {
            Some(meta) => CaseResult {
                verdict: meta.verdict,
                stdout,
                stderr,
                execution_time_ms: meta.time_ms,
                peak_memory_kb: meta.memory_kb,
                exit_code: meta.exit_code,
                wall_time_ms: meta.time_ms,
            },
            None => CaseResult {
                verdict: attribute_unrecorded(sandbox_exit.status_code),
                stdout,
                stderr,
                execution_time_ms: 0,
                peak_memory_kb: 0,
                exit_code: sandbox_exit.status_code.unwrap_or(-1),
                wall_time_ms: 0,
            },
        };
        results.push(result);
    }
    results
}

async fn read_truncated(path: &Path, cap: usize) -> String {
    let Ok(bytes) = fs::read(path).await else {
        return String::new();
    };
    if bytes.len() <= cap {
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        let mut text = String::from_utf8_lossy(&bytes[..cap]).into_owned();
        text.push_str(TRUNCATION_MARKER);
        text
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounds enforced on a submission before it is admitted.
pub const MIN_TIME_LIMIT_S: u64 = 1;
pub const MIN_MEMORY_LIMIT_MB: u64 = 16;
pub const MAX_TEST_CASES: usize = 50;
pub const MAX_BATCH_SUBMISSIONS: usize = 10;

/// Outcome classification for a single test case or a whole submission.
///
/// `Ok` is produced only by the sandbox runner (program exited 0 in time);
/// `Accepted` / `WrongAnswer` come out of the verdict engine after output
/// comparison. The wire form is the short uppercase tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "AC")]
    Accepted,
    #[serde(rename = "WA")]
    WrongAnswer,
    #[serde(rename = "CE")]
    CompileError,
    #[serde(rename = "TLE")]
    TimeLimitExceeded,
    #[serde(rename = "MLE")]
    MemoryLimitExceeded,
    #[serde(rename = "RE")]
    RuntimeError,
    #[serde(rename = "IE")]
    InternalError,
}

impl Verdict {
    pub const ALL: [Verdict; 8] = [
        Verdict::Ok,
        Verdict::Accepted,
        Verdict::WrongAnswer,
        Verdict::CompileError,
        Verdict::TimeLimitExceeded,
        Verdict::MemoryLimitExceeded,
        Verdict::RuntimeError,
        Verdict::InternalError,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Verdict::Ok => "OK",
            Verdict::Accepted => "AC",
            Verdict::WrongAnswer => "WA",
            Verdict::CompileError => "CE",
            Verdict::TimeLimitExceeded => "TLE",
            Verdict::MemoryLimitExceeded => "MLE",
            Verdict::RuntimeError => "RE",
            Verdict::InternalError => "IE",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Verdict> {
        Verdict::ALL.iter().copied().find(|verdict| verdict.tag() == tag)
    }

    pub fn description(self) -> &'static str {
        match self {
            Verdict::Ok => "Program exited cleanly within the limits",
            Verdict::Accepted => "Output matched the expected output",
            Verdict::WrongAnswer => "Output did not match the expected output",
            Verdict::CompileError => "Source failed to compile",
            Verdict::TimeLimitExceeded => "Program exceeded the time limit",
            Verdict::MemoryLimitExceeded => "Program exceeded the memory limit",
            Verdict::RuntimeError => "Program exited abnormally",
            Verdict::InternalError => "The judge failed to execute the program",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Exit-status to verdict decision table. Signal deaths are reported as
/// `128 + signal` before the lookup, so SIGKILL lands on 137 and SIGSEGV on
/// 139. Exit 124 is the wall-clock `timeout` wrapper.
const EXIT_TABLE: &[(i64, Verdict, Option<&str>)] = &[
    (124, Verdict::TimeLimitExceeded, None),
    (137, Verdict::MemoryLimitExceeded, None),
    (139, Verdict::RuntimeError, Some("Segmentation fault")),
    (136, Verdict::RuntimeError, Some("Floating point exception")),
    (134, Verdict::RuntimeError, Some("Aborted")),
];

/// Classify a program's exit status. Returns the verdict and, for the known
/// fatal signals, a human-readable note to append to the captured stderr.
pub fn classify_exit(exit_code: i64) -> (Verdict, Option<&'static str>) {
    if exit_code == 0 {
        return (Verdict::Ok, None);
    }
    for &(code, verdict, note) in EXIT_TABLE {
        if code == exit_code {
            return (verdict, note);
        }
    }
    (Verdict::RuntimeError, None)
}

/// Attribute a verdict to a case the runner left no meta record for, from the
/// sandbox's own exit status. 137 means the sandbox itself was SIGKILLed
/// (OOM or wall cap); a clean or unknown exit with missing evidence is an
/// internal error.
pub fn attribute_unrecorded(sandbox_exit: Option<i64>) -> Verdict {
    match sandbox_exit {
        Some(137) => Verdict::MemoryLimitExceeded,
        Some(0) | None => Verdict::InternalError,
        Some(_) => Verdict::RuntimeError,
    }
}

/// One submission as the batch executor consumes it. The single-input
/// `execute` form is simply `inputs.len() == 1`.
#[derive(Debug, Clone)]
pub struct Submission {
    pub language: String,
    pub source: String,
    pub time_limit_s: u64,
    pub memory_limit_mb: u64,
    pub inputs: Vec<String>,
}

/// Raw result of running one test case, as collected from the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    pub verdict: Verdict,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: u64,
    pub peak_memory_kb: u64,
    pub exit_code: i64,
    pub wall_time_ms: u64,
}

impl CaseResult {
    pub fn internal_error(message: impl Into<String>) -> CaseResult {
        CaseResult {
            verdict: Verdict::InternalError,
            stdout: String::new(),
            stderr: message.into(),
            execution_time_ms: 0,
            peak_memory_kb: 0,
            exit_code: -1,
            wall_time_ms: 0,
        }
    }
}

/// One judged test case inside a submission result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgedCase {
    /// 1-based, matching the `testcases/<i>.in` naming.
    pub case_index: usize,
    pub verdict: Verdict,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: u64,
    pub peak_memory_kb: u64,
}

/// Submission-level result of judging N test cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeSummary {
    pub overall_verdict: Verdict,
    pub total_time_ms: u64,
    pub max_memory_kb: u64,
    pub total_cases: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub first_failed_index: Option<usize>,
    pub per_case: Vec<JudgedCase>,
}

//! Sandbox-side batch runner.
//!
//! Invoked exactly once per submission, inside the isolated execution
//! environment, as `gavel-runner <language> <time_limit_s> <n>` with the
//! mounted work directory as its current directory. Compiles (or
//! syntax-checks) `code/<source_file>` once, then runs the program against
//! each `testcases/<i>.in` under a per-case wall-clock cap, leaving
//! `results/<i>.out`, `results/<i>.err` and `results/<i>.meta` behind for the
//! host to collect.
//!
//! The runner never writes outside the work directory and never exits
//! non-zero while it can still emit meta records: the host reads a non-zero
//! runner exit as evidence about the submission, so internal failures here
//! are reported as `IE` meta entries instead.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use gavel_common::languages::{self, LanguageSpec};
use gavel_common::meta::MetaRecord;
use gavel_common::types::{classify_exit, Verdict};

fn main() {
    if let Err(err) = run() {
        // Nothing useful can be written at this point; the host attributes
        // the missing meta records from the runner's (zero) exit status.
        eprintln!("runner: {err:#}");
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        bail!("usage: gavel-runner <language> <time_limit_s> <n>");
    }
    let time_limit_s: u64 = args[2].parse().context("invalid time limit")?;
    let case_count: usize = args[3].parse().context("invalid case count")?;

    fs::create_dir_all("results").context("failed to create results directory")?;

    let Some(language) = languages::get(&args[1]) else {
        // The host validates the tag before launching; this is a last line
        // of defence against a stale image.
        emit_all(
            case_count,
            Verdict::InternalError,
            -1,
            &format!("unsupported language: {}", args[1]),
        );
        return Ok(());
    };

    if let Some(command) = language.compile_command {
        match compile_once(command) {
            Ok(None) => {}
            Ok(Some((compiler_output, exit_code))) => {
                emit_all(case_count, Verdict::CompileError, exit_code, &compiler_output);
                return Ok(());
            }
            Err(err) => {
                emit_all(case_count, Verdict::InternalError, -1, &format!("{err:#}"));
                return Ok(());
            }
        }
    }

    for index in 1..=case_count {
        if let Err(err) = run_case(language, time_limit_s, index) {
            write_error(index, &format!("{err:#}"));
            write_meta(
                index,
                &MetaRecord {
                    verdict: Verdict::InternalError,
                    time_ms: 0,
                    memory_kb: 0,
                    exit_code: -1,
                },
            );
        }
    }

    Ok(())
}

/// Compile or syntax-check the source once for the whole batch. Returns the
/// compiler's combined output and exit code on failure.
fn compile_once(command: &[&str]) -> Result<Option<(String, i64)>> {
    let output = Command::new(command[0])
        .args(&command[1..])
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("failed to spawn {}", command[0]))?;

    if output.status.success() {
        return Ok(None);
    }

    let mut message = String::from_utf8_lossy(&output.stderr).into_owned();
    if message.trim().is_empty() {
        message = String::from_utf8_lossy(&output.stdout).into_owned();
    }
    Ok(Some((message, effective_exit_code(output.status))))
}

fn run_case(language: &LanguageSpec, time_limit_s: u64, index: usize) -> Result<()> {
    // Missing input files fall back to empty stdin.
    let stdin = match File::open(format!("testcases/{index}.in")) {
        Ok(file) => Stdio::from(file),
        Err(_) => Stdio::null(),
    };
    let stdout = File::create(format!("results/{index}.out"))
        .with_context(|| format!("failed to create results/{index}.out"))?;
    let stderr = File::create(format!("results/{index}.err"))
        .with_context(|| format!("failed to create results/{index}.err"))?;

    let started = Instant::now();
    let status = Command::new("timeout")
        .arg(time_limit_s.to_string())
        .args(language.run_command)
        .stdin(stdin)
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .status()
        .context("failed to spawn program")?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let exit_code = effective_exit_code(status);
    let (verdict, note) = classify_exit(exit_code);
    if let Some(note) = note {
        append_error(index, note);
    }

    write_meta(
        index,
        &MetaRecord {
            verdict,
            time_ms: elapsed_ms,
            memory_kb: peak_memory_kb(),
            exit_code,
        },
    );
    Ok(())
}

/// The exit code as a shell would report it: signal deaths map to
/// `128 + signal`, so a SIGKILLed child lands on 137.
fn effective_exit_code(status: ExitStatus) -> i64 {
    status
        .code()
        .map(i64::from)
        .unwrap_or_else(|| 128 + i64::from(status.signal().unwrap_or(0)))
}

/// Memory accounting surfaces, most precise first: cgroup v2 peak, v2
/// current, then the v1 equivalents.
const MEMORY_SURFACES: &[&str] = &[
    "/sys/fs/cgroup/memory.peak",
    "/sys/fs/cgroup/memory.current",
    "/sys/fs/cgroup/memory/memory.max_usage_in_bytes",
    "/sys/fs/cgroup/memory/memory.usage_in_bytes",
];

fn peak_memory_kb() -> u64 {
    for surface in MEMORY_SURFACES {
        if let Some(kb) = fs::read_to_string(surface)
            .ok()
            .and_then(|raw| parse_memory_bytes(&raw))
        {
            return kb;
        }
    }
    0
}

fn parse_memory_bytes(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().map(|bytes| bytes / 1024)
}

fn write_meta(index: usize, record: &MetaRecord) {
    if let Err(err) = fs::write(format!("results/{index}.meta"), record.render()) {
        eprintln!("runner: failed to write results/{index}.meta: {err}");
    }
}

fn write_error(index: usize, message: &str) {
    if let Err(err) = fs::write(format!("results/{index}.err"), message) {
        eprintln!("runner: failed to write results/{index}.err: {err}");
    }
}

fn append_error(index: usize, note: &str) {
    let opened = OpenOptions::new()
        .create(true)
        .append(true)
        .open(format!("results/{index}.err"));
    match opened {
        Ok(mut file) => {
            let _ = writeln!(file, "{note}");
        }
        Err(err) => eprintln!("runner: failed to append to results/{index}.err: {err}"),
    }
}

/// Tag every case identically: used when compilation fails (all CE) or the
/// batch cannot run at all (all IE).
fn emit_all(case_count: usize, verdict: Verdict, exit_code: i64, message: &str) {
    for index in 1..=case_count {
        write_error(index, message);
        write_meta(
            index,
            &MetaRecord {
                verdict,
                time_ms: 0,
                memory_kb: 0,
                exit_code,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Raw wait statuses: a normal exit is `code << 8`, a signal death is the
    // signal number itself.
    #[test]
    fn effective_exit_code_normal_exit() {
        assert_eq!(effective_exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(effective_exit_code(ExitStatus::from_raw(124 << 8)), 124);
    }

    #[test]
    fn effective_exit_code_signal_death() {
        assert_eq!(effective_exit_code(ExitStatus::from_raw(9)), 137);
        assert_eq!(effective_exit_code(ExitStatus::from_raw(11)), 139);
    }

    #[test]
    fn signal_deaths_classify_through_the_table() {
        let (verdict, note) = classify_exit(effective_exit_code(ExitStatus::from_raw(11)));
        assert_eq!(verdict, Verdict::RuntimeError);
        assert_eq!(note, Some("Segmentation fault"));
    }

    #[test]
    fn memory_surface_parsing() {
        assert_eq!(parse_memory_bytes("1048576\n"), Some(1024));
        assert_eq!(parse_memory_bytes("  2048  "), Some(2));
        assert_eq!(parse_memory_bytes("max"), None);
        assert_eq!(parse_memory_bytes(""), None);
    }
}

//! Verdict engine: output comparison and submission-level aggregation.
//!
//! Pure functions from (batch results, expected outputs) to verdicts. Knows
//! nothing about sandboxes, queues or HTTP, which keeps judging deterministic
//! regardless of execution backend.

use gavel_common::types::{CaseResult, JudgeSummary, JudgedCase, Verdict};

/// Normalise output for comparison: unify CRLF to LF, strip trailing
/// whitespace from every line, strip trailing whitespace from the whole
/// string. Leading whitespace is significant and stays.
pub fn normalize_output(output: &str) -> String {
    let unified = output.replace("\r\n", "\n");
    let stripped: Vec<&str> = unified.lines().map(str::trim_end).collect();
    stripped.join("\n").trim_end().to_string()
}

/// Judge one case. Non-OK run verdicts (CE, TLE, MLE, RE, IE) propagate
/// unchanged; an OK run is compared against the expected output.
pub fn judge_case(run: &CaseResult, expected: &str) -> Verdict {
    match run.verdict {
        Verdict::Ok => {
            if normalize_output(&run.stdout) == normalize_output(expected) {
                Verdict::Accepted
            } else {
                Verdict::WrongAnswer
            }
        }
        other => other,
    }
}

/// Aggregate per-case verdicts into the submission-level result. The overall
/// verdict is AC iff every case is AC, otherwise the verdict of the first
/// failing case; `first_failed_index` is 1-based.
pub fn aggregate(results: &[CaseResult], expected: &[String]) -> JudgeSummary {
    debug_assert_eq!(results.len(), expected.len());

    let mut per_case = Vec::with_capacity(results.len());
    let mut overall = Verdict::Accepted;
    let mut first_failed_index = None;
    let mut total_time_ms = 0;
    let mut max_memory_kb = 0;

    for (index, (run, want)) in results.iter().zip(expected).enumerate() {
        let verdict = judge_case(run, want);
        total_time_ms += run.execution_time_ms;
        max_memory_kb = max_memory_kb.max(run.peak_memory_kb);
        if verdict != Verdict::Accepted && first_failed_index.is_none() {
            first_failed_index = Some(index + 1);
            overall = verdict;
        }
        per_case.push(JudgedCase {
            case_index: index + 1,
            verdict,
            stdout: run.stdout.clone(),
            stderr: run.stderr.clone(),
            execution_time_ms: run.execution_time_ms,
            peak_memory_kb: run.peak_memory_kb,
        });
    }

    let total_cases = per_case.len();
    let passed = per_case
        .iter()
        .filter(|case| case.verdict == Verdict::Accepted)
        .count();
    let failed = total_cases - passed;

    JudgeSummary {
        overall_verdict: overall,
        total_time_ms,
        max_memory_kb,
        total_cases,
        passed,
        failed,
        skipped: total_cases - passed - failed,
        first_failed_index,
        per_case,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_run(stdout: &str) -> CaseResult {
        CaseResult {
            verdict: Verdict::Ok,
            stdout: stdout.to_string(),
            stderr: String::new(),
            execution_time_ms: 10,
            peak_memory_kb: 1024,
            exit_code: 0,
            wall_time_ms: 10,
        }
    }

    fn failed_run(verdict: Verdict) -> CaseResult {
        CaseResult {
            verdict,
            stdout: String::new(),
            stderr: String::new(),
            execution_time_ms: 5,
            peak_memory_kb: 512,
            exit_code: 1,
            wall_time_ms: 5,
        }
    }

    fn expect(outputs: &[&str]) -> Vec<String> {
        outputs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_unifies_line_endings() {
        assert_eq!(normalize_output("a\r\nb\r\n"), "a\nb");
        assert_eq!(normalize_output("a\nb\n"), "a\nb");
    }

    #[test]
    fn normalize_strips_trailing_whitespace_per_line() {
        assert_eq!(normalize_output("a  \nb\t\nc"), "a\nb\nc");
    }

    #[test]
    fn normalize_strips_trailing_blank_lines() {
        assert_eq!(normalize_output("hello\n\n\n"), "hello");
        assert_eq!(normalize_output("   \n  \n"), "");
    }

    #[test]
    fn normalize_keeps_leading_whitespace() {
        assert_ne!(normalize_output("  hello"), normalize_output("hello"));
        assert_eq!(normalize_output("  hello  "), "  hello");
    }

    #[test]
    fn normalize_is_idempotent() {
        for sample in [
            "",
            "hello",
            "a \r\nb\t \n\n",
            "  leading\n mixed \r\n",
            "1\n2\n3\n",
        ] {
            let once = normalize_output(sample);
            assert_eq!(normalize_output(&once), once, "sample: {sample:?}");
        }
    }

    #[test]
    fn matching_output_is_accepted() {
        assert_eq!(judge_case(&ok_run("15\n"), "15"), Verdict::Accepted);
        assert_eq!(
            judge_case(&ok_run("Hello, World!\n"), "Hello, World!"),
            Verdict::Accepted
        );
    }

    #[test]
    fn mismatching_output_is_wrong_answer() {
        assert_eq!(judge_case(&ok_run("2"), "8"), Verdict::WrongAnswer);
    }

    #[test]
    fn case_matters() {
        assert_eq!(judge_case(&ok_run("hello"), "Hello"), Verdict::WrongAnswer);
    }

    #[test]
    fn run_verdicts_propagate_unchanged() {
        for verdict in [
            Verdict::CompileError,
            Verdict::TimeLimitExceeded,
            Verdict::MemoryLimitExceeded,
            Verdict::RuntimeError,
            Verdict::InternalError,
        ] {
            assert_eq!(judge_case(&failed_run(verdict), "anything"), verdict);
        }
    }

    #[test]
    fn aggregate_all_accepted() {
        let results = vec![ok_run("3"), ok_run("30"), ok_run("0"), ok_run("0")];
        let summary = aggregate(&results, &expect(&["3", "30", "0", "0"]));

        assert_eq!(summary.overall_verdict, Verdict::Accepted);
        assert_eq!(summary.total_cases, 4);
        assert_eq!(summary.passed, 4);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.first_failed_index, None);
        assert_eq!(summary.per_case.len(), 4);
        assert_eq!(summary.total_time_ms, 40);
        assert_eq!(summary.max_memory_kb, 1024);
    }

    #[test]
    fn aggregate_reports_first_failure() {
        // a-b submitted where a+b was expected: the first case fails, the
        // second (0, 0) accidentally passes.
        let results = vec![ok_run("2"), ok_run("0")];
        let summary = aggregate(&results, &expect(&["8", "0"]));

        assert_eq!(summary.overall_verdict, Verdict::WrongAnswer);
        assert_eq!(summary.first_failed_index, Some(1));
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn aggregate_overall_takes_first_failing_verdict() {
        let results = vec![
            ok_run("ok"),
            failed_run(Verdict::TimeLimitExceeded),
            failed_run(Verdict::RuntimeError),
        ];
        let summary = aggregate(&results, &expect(&["ok", "x", "y"]));

        assert_eq!(summary.overall_verdict, Verdict::TimeLimitExceeded);
        assert_eq!(summary.first_failed_index, Some(2));
    }

    #[test]
    fn aggregate_compile_error_batch() {
        let results = vec![
            failed_run(Verdict::CompileError),
            failed_run(Verdict::CompileError),
        ];
        let summary = aggregate(&results, &expect(&["a", "b"]));

        assert_eq!(summary.overall_verdict, Verdict::CompileError);
        assert_eq!(summary.passed, 0);
        assert_eq!(summary.failed, 2);
        assert!(summary
            .per_case
            .iter()
            .all(|case| case.verdict == Verdict::CompileError));
    }

    #[test]
    fn aggregate_counts_always_sum_to_total() {
        let results = vec![
            ok_run("right"),
            ok_run("wrong"),
            failed_run(Verdict::InternalError),
        ];
        let summary = aggregate(&results, &expect(&["right", "expected", "z"]));

        assert_eq!(
            summary.passed + summary.failed + summary.skipped,
            summary.total_cases
        );
        // Overall is AC iff every case is AC.
        assert_eq!(
            summary.overall_verdict == Verdict::Accepted,
            summary
                .per_case
                .iter()
                .all(|case| case.verdict == Verdict::Accepted)
        );
    }

    #[test]
    fn aggregate_case_indices_are_one_based() {
        let results = vec![ok_run("a"), ok_run("b")];
        let summary = aggregate(&results, &expect(&["a", "b"]));
        let indices: Vec<usize> = summary.per_case.iter().map(|c| c.case_index).collect();
        assert_eq!(indices, vec![1, 2]);
    }
}

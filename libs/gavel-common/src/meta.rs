//! Codec for the per-case records the sandbox runner leaves in
//! `results/<i>.meta`.
//!
//! The format is deliberately dumb: one `key=value` per line, written by the
//! runner inside the sandbox and parsed back on the host. The parser is
//! tolerant: unknown keys and malformed lines are skipped, and a record
//! without a verdict counts as missing so the executor attributes the case
//! from the sandbox's own exit status instead.

use crate::types::Verdict;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRecord {
    pub verdict: Verdict,
    /// Wall-clock duration of the run, milliseconds.
    pub time_ms: u64,
    /// Peak resident set, kilobytes.
    pub memory_kb: u64,
    pub exit_code: i64,
}

impl MetaRecord {
    pub fn render(&self) -> String {
        format!(
            "verdict={}\ntime={}\nmemory={}\nexitCode={}\n",
            self.verdict, self.time_ms, self.memory_kb, self.exit_code
        )
    }

    pub fn parse(content: &str) -> Option<MetaRecord> {
        let mut verdict = None;
        let mut time_ms = 0;
        let mut memory_kb = 0;
        let mut exit_code = 0;

        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "verdict" => verdict = Verdict::from_tag(value),
                "time" => time_ms = value.parse().unwrap_or(0),
                "memory" => memory_kb = value.parse().unwrap_or(0),
                "exitCode" => exit_code = value.parse().unwrap_or(0),
                _ => {}
            }
        }

        verdict.map(|verdict| MetaRecord {
            verdict,
            time_ms,
            memory_kb,
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_success_record() {
        let record = MetaRecord::parse("verdict=OK\ntime=15\nmemory=1024\nexitCode=0\n").unwrap();
        assert_eq!(record.verdict, Verdict::Ok);
        assert_eq!(record.time_ms, 15);
        assert_eq!(record.memory_kb, 1024);
        assert_eq!(record.exit_code, 0);
    }

    #[test]
    fn parse_tle_record() {
        let record = MetaRecord::parse("verdict=TLE\ntime=2004\nmemory=800\nexitCode=124\n").unwrap();
        assert_eq!(record.verdict, Verdict::TimeLimitExceeded);
        assert_eq!(record.exit_code, 124);
    }

    #[test]
    fn missing_verdict_is_missing_record() {
        assert_eq!(MetaRecord::parse("time=15\nmemory=1024\n"), None);
        assert_eq!(MetaRecord::parse(""), None);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let record =
            MetaRecord::parse("garbage\nverdict=RE\nnot a pair\ntime=7\nunknown=x\n").unwrap();
        assert_eq!(record.verdict, Verdict::RuntimeError);
        assert_eq!(record.time_ms, 7);
        assert_eq!(record.memory_kb, 0);
    }

    #[test]
    fn render_parse_round_trip() {
        let record = MetaRecord {
            verdict: Verdict::MemoryLimitExceeded,
            time_ms: 321,
            memory_kb: 262_144,
            exit_code: 137,
        };
        assert_eq!(MetaRecord::parse(&record.render()), Some(record));
    }
}

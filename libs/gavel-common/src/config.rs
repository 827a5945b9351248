//! Process-wide configuration, read once from the environment at boot.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::types::{MIN_MEMORY_LIMIT_MB, MIN_TIME_LIMIT_S};

/// Which batch-executor backend runs sandboxes. Fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Isolated container per submission (preferred).
    Container,
    /// Direct subprocess, for hosts without a container runtime.
    Process,
}

impl ExecutionMode {
    fn parse(raw: &str) -> Option<ExecutionMode> {
        match raw {
            "container" => Some(ExecutionMode::Container),
            "process" => Some(ExecutionMode::Process),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub execution_mode: ExecutionMode,
    pub max_concurrent: usize,
    pub max_queue_depth: usize,
    pub default_time_limit_s: u64,
    pub max_time_limit_s: u64,
    pub default_memory_limit_mb: u64,
    pub max_memory_limit_mb: u64,
    /// Shared cap for source, inputs and expected outputs, in bytes.
    pub max_code_size: usize,
    pub sandbox_image: String,
    /// Runner executable used by the process backend.
    pub runner_command: String,
    pub temp_dir: PathBuf,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max: u32,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            port: 3000,
            execution_mode: ExecutionMode::Container,
            max_concurrent: 2,
            max_queue_depth: 100,
            default_time_limit_s: 5,
            max_time_limit_s: 10,
            default_memory_limit_mb: 256,
            max_memory_limit_mb: 512,
            max_code_size: 65_536,
            sandbox_image: "judge-sandbox".to_string(),
            runner_command: "gavel-runner".to_string(),
            temp_dir: PathBuf::from("/tmp/judge"),
            rate_limit_window_ms: 60_000,
            rate_limit_max: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Config {
        let defaults = Config::default();
        let execution_mode = match env::var("EXECUTION_MODE") {
            Ok(raw) => ExecutionMode::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "invalid EXECUTION_MODE, using container");
                ExecutionMode::Container
            }),
            Err(_) => defaults.execution_mode,
        };

        Config {
            port: env_parse("PORT", defaults.port),
            execution_mode,
            max_concurrent: env_parse("MAX_CONCURRENT", defaults.max_concurrent),
            max_queue_depth: env_parse("MAX_QUEUE_DEPTH", defaults.max_queue_depth),
            default_time_limit_s: env_parse("DEFAULT_TIME_LIMIT", defaults.default_time_limit_s),
            max_time_limit_s: env_parse("MAX_TIME_LIMIT", defaults.max_time_limit_s),
            default_memory_limit_mb: env_parse(
                "DEFAULT_MEMORY_LIMIT",
                defaults.default_memory_limit_mb,
            ),
            max_memory_limit_mb: env_parse("MAX_MEMORY_LIMIT", defaults.max_memory_limit_mb),
            max_code_size: env_parse("MAX_CODE_SIZE", defaults.max_code_size),
            sandbox_image: env::var("SANDBOX_IMAGE").unwrap_or(defaults.sandbox_image),
            runner_command: env::var("RUNNER_COMMAND").unwrap_or(defaults.runner_command),
            temp_dir: env::var("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            rate_limit_window_ms: env_parse("RATE_LIMIT_WINDOW", defaults.rate_limit_window_ms),
            rate_limit_max: env_parse("RATE_LIMIT_MAX", defaults.rate_limit_max),
        }
    }

    /// Defence in depth: the validation layer already rejects out-of-range
    /// limits, but the executor clamps again before touching the sandbox.
    pub fn clamp_time_limit(&self, seconds: u64) -> u64 {
        seconds.clamp(MIN_TIME_LIMIT_S, self.max_time_limit_s)
    }

    pub fn clamp_memory_limit(&self, megabytes: u64) -> u64 {
        megabytes.clamp(MIN_MEMORY_LIMIT_MB, self.max_memory_limit_mb)
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, fallback = %default, "invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.execution_mode, ExecutionMode::Container);
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.default_time_limit_s, 5);
        assert_eq!(config.max_time_limit_s, 10);
        assert_eq!(config.default_memory_limit_mb, 256);
        assert_eq!(config.max_memory_limit_mb, 512);
        assert_eq!(config.max_code_size, 65_536);
        assert_eq!(config.sandbox_image, "judge-sandbox");
        assert_eq!(config.temp_dir, PathBuf::from("/tmp/judge"));
        assert_eq!(config.rate_limit_window_ms, 60_000);
        assert_eq!(config.rate_limit_max, 30);
    }

    #[test]
    fn execution_mode_parsing() {
        assert_eq!(ExecutionMode::parse("container"), Some(ExecutionMode::Container));
        assert_eq!(ExecutionMode::parse("process"), Some(ExecutionMode::Process));
        assert_eq!(ExecutionMode::parse("docker"), None);
    }

    #[test]
    fn limits_clamp_to_configured_range() {
        let config = Config::default();
        assert_eq!(config.clamp_time_limit(0), 1);
        assert_eq!(config.clamp_time_limit(5), 5);
        assert_eq!(config.clamp_time_limit(60), 10);
        assert_eq!(config.clamp_memory_limit(1), 16);
        assert_eq!(config.clamp_memory_limit(256), 256);
        assert_eq!(config.clamp_memory_limit(4096), 512);
    }
}

//! Environment variable support for [`RuntimeBuilder`](super::builder::RuntimeBuilder).
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic** — values set via builder methods after
//!    `with_env_overrides()` (`default_threads(4)`)
//! 2. **Environment variables** — values from `COSCOPE_*` env vars
//! 3. **Defaults** — built-in defaults from [`RuntimeConfig::default()`]
//!
//! The process-wide runtime behind [`global_scope`](crate::global_scope)
//! always applies these overrides.
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `COSCOPE_DEFAULT_THREADS` | `usize` | `default_threads` |
//! | `COSCOPE_IO_THREADS` | `usize` | `io_threads` |
//! | `COSCOPE_THREAD_STACK_SIZE` | `usize` | `thread_stack_size` |
//! | `COSCOPE_THREAD_NAME_PREFIX` | `String` | `thread_name_prefix` |
//! | `COSCOPE_IDLE_TIMEOUT_MS` | `u64` (0 = never retire) | `idle_timeout` |

use crate::runtime::builder::BuildError;
use crate::runtime::config::RuntimeConfig;
use std::time::Duration;

/// Environment variable name for the default pool size.
pub const ENV_DEFAULT_THREADS: &str = "COSCOPE_DEFAULT_THREADS";
/// Environment variable name for the I/O pool size.
pub const ENV_IO_THREADS: &str = "COSCOPE_IO_THREADS";
/// Environment variable name for thread stack size.
pub const ENV_THREAD_STACK_SIZE: &str = "COSCOPE_THREAD_STACK_SIZE";
/// Environment variable name for thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "COSCOPE_THREAD_NAME_PREFIX";
/// Environment variable name for the worker idle timeout in milliseconds.
pub const ENV_IDLE_TIMEOUT_MS: &str = "COSCOPE_IDLE_TIMEOUT_MS";

/// Apply environment variable overrides to a [`RuntimeConfig`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<(), BuildError> {
    if let Some(val) = read_env(ENV_DEFAULT_THREADS) {
        config.default_threads = parse_usize(ENV_DEFAULT_THREADS, &val)?;
    }
    if let Some(val) = read_env(ENV_IO_THREADS) {
        config.io_threads = parse_usize(ENV_IO_THREADS, &val)?;
    }
    if let Some(val) = read_env(ENV_THREAD_STACK_SIZE) {
        config.thread_stack_size = parse_usize(ENV_THREAD_STACK_SIZE, &val)?;
    }
    if let Some(val) = read_env(ENV_THREAD_NAME_PREFIX) {
        config.thread_name_prefix = val;
    }
    if let Some(val) = read_env(ENV_IDLE_TIMEOUT_MS) {
        let millis = parse_u64(ENV_IDLE_TIMEOUT_MS, &val)?;
        config.idle_timeout = (millis > 0).then(|| Duration::from_millis(millis));
    }
    Ok(())
}

/// Read an environment variable, returning `None` if unset.
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_usize(var: &'static str, val: &str) -> Result<usize, BuildError> {
    val.trim().parse::<usize>().map_err(|_| BuildError::InvalidEnv {
        var,
        value: val.to_string(),
        expected: "unsigned integer",
    })
}

fn parse_u64(var: &'static str, val: &str) -> Result<u64, BuildError> {
    val.trim().parse::<u64>().map_err(|_| BuildError::InvalidEnv {
        var,
        value: val.to_string(),
        expected: "milliseconds as unsigned integer",
    })
}

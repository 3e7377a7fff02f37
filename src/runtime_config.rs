//! Environment-driven runtime tuning.
//!
//! ## `PANELFORGE_STACK_SIZE`
//!
//! Stack size for handler coroutines, decimal (`65536`) or hex (`0x10000`).
//! Default: `0x10000` (64 KB). Generated-resource handlers run file I/O and
//! store round-trips on the coroutine stack, so the default is deliberately
//! roomier than a bare echo handler would need. Total memory is
//! `stack_size × concurrent_coroutines`; tune down for high-concurrency,
//! read-mostly deployments.

use std::env;

const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size for handler coroutines in bytes.
    pub stack_size: usize,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let stack_size = match env::var("PANELFORGE_STACK_SIZE") {
            Ok(val) => {
                if let Some(hex) = val.strip_prefix("0x") {
                    usize::from_str_radix(hex, 16).unwrap_or(DEFAULT_STACK_SIZE)
                } else {
                    val.parse().unwrap_or(DEFAULT_STACK_SIZE)
                }
            }
            Err(_) => DEFAULT_STACK_SIZE,
        };
        RuntimeConfig { stack_size }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

//! # Runtime Configuration Module
//!
//! Environment-driven settings for the `may` coroutine runtime that serves every
//! connection.
//!
//! ## Environment Variables
//!
//! ### `LIVEPREVIEW_STACK_SIZE`
//!
//! Stack size for connection coroutines. Middleware run on these stacks, so a chain
//! that formats large strings or recurses deeply may need more than the default.
//! Accepts decimal (`65536`) or hexadecimal (`0x10000`).
//!
//! Default: `0x10000` (64 KB)
//!
//! ```bash
//! export LIVEPREVIEW_STACK_SIZE=0x20000
//! livepreview serve _site
//! ```

use std::env;
use std::sync::Once;

const DEFAULT_STACK_SIZE: usize = 0x10000;

static APPLY: Once = Once::new();

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes (default: 64 KB / 0x10000)
    pub stack_size: usize,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let stack_size = match env::var("LIVEPREVIEW_STACK_SIZE") {
            Ok(val) => parse_size(&val).unwrap_or(DEFAULT_STACK_SIZE),
            Err(_) => DEFAULT_STACK_SIZE,
        };
        RuntimeConfig { stack_size }
    }

    /// Configure the `may` runtime. Only the first call in a process has an effect.
    pub fn apply_once(self) {
        APPLY.call_once(|| {
            may::config().set_stack_size(self.stack_size);
        });
    }
}

fn parse_size(val: &str) -> Option<usize> {
    let val = val.trim();
    match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("0x8000"), Some(0x8000));
        assert_eq!(parse_size("32768"), Some(32768));
        assert_eq!(parse_size("lots"), None);
    }
}

//! Base URL side channel.
//!
//! While a session with `inject_base_url_into_environment` is serving, its base URL is
//! exported as an environment variable so that anything else running in the process
//! (template helpers, plugins) can build absolute links.
//!
//! The environment is process-global. Only one publishing session may be active per
//! process at a time; running two at once leaves the variable holding whichever wrote
//! last. This is a caller constraint and is not arbitrated here.

use std::env;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

/// Single-writer owner of one environment variable.
#[derive(Debug)]
pub struct EnvPublisher {
    var: String,
    published: Mutex<Option<String>>,
}

impl EnvPublisher {
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            published: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn var(&self) -> &str {
        &self.var
    }

    /// Export `base_url`, replacing any value this publisher set earlier.
    pub fn publish(&self, base_url: &str) {
        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        env::set_var(&self.var, base_url);
        debug!(var = %self.var, base_url, "published base URL");
        *published = Some(base_url.to_string());
    }

    /// Remove the variable if it still holds what this publisher wrote.
    ///
    /// Returns `true` when the variable was removed. A publisher that never published
    /// does nothing.
    pub fn unpublish(&self) -> bool {
        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(ours) = published.take() else {
            return false;
        };
        match env::var(&self.var) {
            Ok(current) if current == ours => {
                env::remove_var(&self.var);
                debug!(var = %self.var, "unpublished base URL");
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_published(&self) -> bool {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

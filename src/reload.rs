//! # Live Reload Notifications
//!
//! [`ReloadHub`] is the meeting point between whatever detects changes (the directory
//! watcher in [`hot_reload`](crate::hot_reload), or the build tool calling
//! [`DevServer::reload`](crate::server::DevServer::reload)) and the browsers listening
//! on the event stream.
//!
//! Each notification bumps a generation counter. Browsers long-poll: a request carrying
//! `Last-Event-ID: n` parks its coroutine until the generation passes `n` (or a timeout
//! elapses) and is answered with a single Server-Sent Events frame. EventSource then
//! reconnects on its own, sending the new id.
//!
//! ## SSE Format
//!
//! ```text
//! retry: 250
//! id: 7
//! data: {"type":"reload","files":["index.html"]}
//!
//! ```

use may::sync::{Condvar, Mutex};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Reconnect delay (ms) suggested to EventSource clients.
pub const RETRY_MS: u64 = 250;

/// What a browser should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadKind {
    /// First frame of a stream: carries the baseline id, no action.
    Connected,
    /// Only stylesheets changed: refresh them in place.
    Css,
    /// Reload the page.
    Reload,
}

/// Payload of one event frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadEvent {
    #[serde(rename = "type")]
    pub kind: ReloadKind,
    pub files: Vec<String>,
}

impl ReloadEvent {
    /// Classify a change set.
    #[must_use]
    pub fn for_files(files: Vec<String>) -> Self {
        let css_only = !files.is_empty()
            && files
                .iter()
                .all(|f| f.to_ascii_lowercase().ends_with(".css"));
        Self {
            kind: if css_only {
                ReloadKind::Css
            } else {
                ReloadKind::Reload
            },
            files,
        }
    }
}

#[derive(Debug, Default)]
struct HubState {
    generation: u64,
    last: Option<ReloadEvent>,
}

/// Generation counter plus the most recent event, shared by every connection.
pub struct ReloadHub {
    state: Mutex<HubState>,
    changed: Condvar,
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReloadHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadHub")
            .field("generation", &self.generation())
            .finish()
    }
}

impl ReloadHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            changed: Condvar::new(),
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        match self.state.lock() {
            Ok(state) => state.generation,
            Err(poisoned) => poisoned.into_inner().generation,
        }
    }

    /// Record a change and wake every waiting browser. Returns the new generation.
    pub fn notify(&self, files: Vec<String>) -> u64 {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.generation += 1;
        state.last = Some(ReloadEvent::for_files(files));
        let generation = state.generation;
        drop(state);
        self.changed.notify_all();
        generation
    }

    /// Wait until the generation passes `since`, at most `timeout`.
    ///
    /// A client that missed more than one generation always gets a full reload, since
    /// the intermediate change sets are not kept.
    pub fn wait_newer(&self, since: u64, timeout: Duration) -> Option<(u64, ReloadEvent)> {
        let deadline = Instant::now() + timeout;
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        while state.generation <= since {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            state = match self.changed.wait_timeout(state, remaining) {
                Ok((state, _)) => state,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        let event = match &state.last {
            Some(last) if state.generation == since + 1 => last.clone(),
            Some(last) => ReloadEvent {
                kind: ReloadKind::Reload,
                files: last.files.clone(),
            },
            None => ReloadEvent::for_files(Vec::new()),
        };
        Some((state.generation, event))
    }
}

/// One `text/event-stream` frame carrying `event` under `id`.
#[must_use]
pub fn event_frame(id: u64, event: &ReloadEvent) -> String {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("retry: {RETRY_MS}\nid: {id}\ndata: {data}\n\n")
}

/// A comment-only frame that keeps the client's current id.
#[must_use]
pub fn keepalive_frame() -> String {
    format!("retry: {RETRY_MS}\n: keepalive\n\n")
}

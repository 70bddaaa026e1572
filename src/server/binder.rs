//! Listen-socket lifecycle for one serving session.
//!
//! ```text
//!   Unbound ──bind_with──▶ Binding{candidate, attempt}
//!                              │   ▲
//!                              │   └── AddrInUse: candidate + 1
//!                              ▼
//!              Bound(port) │ Failed(err)
//!                   │
//!                 close ──▶ Closed   (from any state)
//! ```
//!
//! Waiters in [`PortBinder::port`] sleep on a `may` condvar, so they park a coroutine
//! or a thread alike, and only wake on a final state.

use may::sync::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::ServeError;

/// An open listener, released by running its stop action.
pub struct Listening {
    stop: Option<Box<dyn FnOnce() + Send>>,
}

impl Listening {
    pub fn new(stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            stop: Some(Box::new(stop)),
        }
    }

    fn release(mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

impl fmt::Debug for Listening {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listening")
            .field("open", &self.stop.is_some())
            .finish()
    }
}

/// Where a session is in its bind sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindState {
    Unbound,
    Binding { candidate: u16, attempt: u32 },
    Bound(u16),
    Failed(ServeError),
    Closed,
}

impl BindState {
    fn is_final(&self) -> bool {
        !matches!(self, BindState::Unbound | BindState::Binding { .. })
    }

    fn outcome(&self) -> Option<Result<u16, ServeError>> {
        match self {
            BindState::Bound(port) => Some(Ok(*port)),
            BindState::Failed(err) => Some(Err(err.clone())),
            BindState::Closed => Some(Err(ServeError::Closed)),
            BindState::Unbound | BindState::Binding { .. } => None,
        }
    }
}

#[derive(Debug)]
struct Slot {
    state: BindState,
    listener: Option<Listening>,
}

/// Bind/retry state machine plus the listener it produced.
pub struct PortBinder {
    slot: Mutex<Slot>,
    settled: Condvar,
}

impl fmt::Debug for PortBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortBinder")
            .field("state", &self.state())
            .finish()
    }
}

impl Default for PortBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl PortBinder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: BindState::Unbound,
                listener: None,
            }),
            settled: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[must_use]
    pub fn state(&self) -> BindState {
        self.lock().state.clone()
    }

    /// Run the bind sequence starting at `initial`.
    ///
    /// `open` is asked for one candidate port at a time. An `AddrInUse` failure moves on
    /// to the next port, at most `retry_limit` times; any other failure is final.
    /// `on_bound` runs with the chosen port before `port()` waiters are released.
    pub fn bind_with<O, B>(
        &self,
        initial: u16,
        retry_limit: u32,
        mut open: O,
        on_bound: B,
    ) -> Result<u16, ServeError>
    where
        O: FnMut(u16) -> io::Result<Listening>,
        B: FnOnce(u16),
    {
        match self.lock().state {
            BindState::Unbound => {}
            BindState::Closed => return Err(ServeError::Closed),
            _ => return Err(ServeError::AlreadyServing),
        }

        let mut on_bound = Some(on_bound);
        let mut attempt: u32 = 0;
        loop {
            let Ok(candidate) = u16::try_from(u32::from(initial) + attempt) else {
                return self.fail(ServeError::PortExhausted {
                    first: initial,
                    last: u16::MAX,
                    attempts: attempt,
                });
            };

            {
                let mut slot = self.lock();
                if slot.state == BindState::Closed {
                    return Err(ServeError::Closed);
                }
                slot.state = BindState::Binding { candidate, attempt };
            }

            match open(candidate) {
                Ok(listening) => {
                    let mut slot = self.lock();
                    if slot.state == BindState::Closed {
                        drop(slot);
                        debug!(port = candidate, "bound after close; releasing listener");
                        listening.release();
                        return Err(ServeError::Closed);
                    }
                    if let Some(on_bound) = on_bound.take() {
                        on_bound(candidate);
                    }
                    slot.state = BindState::Bound(candidate);
                    slot.listener = Some(listening);
                    drop(slot);
                    self.settled.notify_all();
                    info!(port = candidate, attempts = attempt + 1, "listener bound");
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                    debug!(port = candidate, attempt, "port in use");
                    if attempt >= retry_limit {
                        return self.fail(ServeError::PortExhausted {
                            first: initial,
                            last: candidate,
                            attempts: attempt + 1,
                        });
                    }
                    attempt += 1;
                }
                Err(e) => return self.fail(ServeError::bind(candidate, &e)),
            }
        }
    }

    pub(crate) fn fail(&self, err: ServeError) -> Result<u16, ServeError> {
        let mut slot = self.lock();
        if slot.state == BindState::Closed {
            return Err(ServeError::Closed);
        }
        slot.state = BindState::Failed(err.clone());
        drop(slot);
        self.settled.notify_all();
        Err(err)
    }

    /// Wait for the bind sequence to settle.
    pub fn port(&self) -> Result<u16, ServeError> {
        let mut slot = self.lock();
        while !slot.state.is_final() {
            slot = match self.settled.wait(slot) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        slot.state.outcome().unwrap_or(Err(ServeError::Closed))
    }

    /// [`port`](Self::port), giving up with [`ServeError::Timeout`] after `timeout`.
    pub fn port_timeout(&self, timeout: Duration) -> Result<u16, ServeError> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        while !slot.state.is_final() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ServeError::Timeout);
            }
            slot = match self.settled.wait_timeout(slot, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        slot.state.outcome().unwrap_or(Err(ServeError::Closed))
    }

    /// Release the listener and wake every waiter. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        let mut slot = self.lock();
        if slot.state == BindState::Closed {
            return false;
        }
        slot.state = BindState::Closed;
        let listener = slot.listener.take();
        drop(slot);
        self.settled.notify_all();
        if let Some(listener) = listener {
            listener.release();
        }
        true
    }
}

/// Ask the OS for a free port on `addr` through a throwaway socket.
pub fn probe_free_port(addr: IpAddr) -> io::Result<u16> {
    let probe = TcpListener::bind(SocketAddr::new(addr, 0))?;
    Ok(probe.local_addr()?.port())
}

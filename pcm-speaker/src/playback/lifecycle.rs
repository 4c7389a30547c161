//! Speaker lifecycle state
//!
//! `Created -> Running -> Stopped(Completed | Cancelled)`, single use.
//!
//! The completion signal is single-assignment: whichever thread resolves it
//! first (the device callback on end of stream, or `stop()`) performs the
//! transition; everyone else sees it already resolved and does nothing.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tokio::sync::watch;

/// Why the stream stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    /// Every queued byte was played
    Completed,
    /// Stopped before the queue drained
    Cancelled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Completed => write!(f, "completed"),
            StopReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Running,
    Stopped(StopReason),
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Created => write!(f, "created"),
            EngineState::Running => write!(f, "running"),
            EngineState::Stopped(reason) => write!(f, "stopped ({})", reason),
        }
    }
}

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const CANCELLED: u8 = 2;

fn encode(reason: StopReason) -> u8 {
    match reason {
        StopReason::Completed => COMPLETED,
        StopReason::Cancelled => CANCELLED,
    }
}

fn decode(value: u8) -> Option<StopReason> {
    match value {
        COMPLETED => Some(StopReason::Completed),
        CANCELLED => Some(StopReason::Cancelled),
        _ => None,
    }
}

/// Single-assignment completion signal.
///
/// `resolve` is a compare-and-swap on an atomic; only the winner publishes
/// to the watch channel, so every waiter observes the same reason.
#[derive(Debug)]
pub struct CompletionSignal {
    resolved: AtomicU8,
    tx: watch::Sender<Option<StopReason>>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            resolved: AtomicU8::new(PENDING),
            tx,
        }
    }

    /// Resolve the signal. Returns `false` if it was already resolved.
    pub fn resolve(&self, reason: StopReason) -> bool {
        let won = self
            .resolved
            .compare_exchange(PENDING, encode(reason), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.tx.send_replace(Some(reason));
        }
        won
    }

    pub fn get(&self) -> Option<StopReason> {
        decode(self.resolved.load(Ordering::Acquire))
    }

    pub fn is_resolved(&self) -> bool {
        self.get().is_some()
    }

    /// Future that resolves with the stop reason.
    ///
    /// Independent of `self`'s lifetime; if the signal is dropped unresolved
    /// the waiter sees `Cancelled`.
    pub fn wait(&self) -> impl Future<Output = StopReason> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            match rx.wait_for(Option::is_some).await {
                Ok(value) => (*value).unwrap_or(StopReason::Cancelled),
                Err(_) => StopReason::Cancelled,
            }
        }
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// Lifecycle controller shared by the speaker handle and its device callback.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: AtomicU8,
    cancelled: AtomicBool,
    input_finished: AtomicBool,
    completion: CompletionSignal,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Created -> Running.
    pub fn begin(&self) -> Result<()> {
        match self
            .state
            .compare_exchange(CREATED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) if !self.completion.is_resolved() => Ok(()),
            Ok(_) | Err(STOPPED) => Err(Error::InvalidState(
                "speaker has already been used, create a new instance".to_string(),
            )),
            Err(_) => Err(Error::InvalidState("speaker is already running".to_string())),
        }
    }

    /// Transition to Stopped. Returns `true` only for the caller that
    /// performed the transition.
    ///
    /// Lock-free apart from the watch channel publish; callable from the
    /// real-time callback.
    pub fn finish(&self, reason: StopReason) -> bool {
        if !self.completion.resolve(reason) {
            return false;
        }
        self.cancelled.store(true, Ordering::Release);
        self.state.store(STOPPED, Ordering::Release);
        true
    }

    pub fn state(&self) -> EngineState {
        if let Some(reason) = self.completion.get() {
            return EngineState::Stopped(reason);
        }
        match self.state.load(Ordering::Acquire) {
            CREATED => EngineState::Created,
            RUNNING => EngineState::Running,
            // Resolution is published before the state store
            _ => EngineState::Stopped(StopReason::Cancelled),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Producer will not write any more chunks.
    pub fn finish_input(&self) {
        self.input_finished.store(true, Ordering::Release);
    }

    pub fn is_input_finished(&self) -> bool {
        self.input_finished.load(Ordering::Acquire)
    }

    pub fn completion(&self) -> &CompletionSignal {
        &self.completion
    }
}

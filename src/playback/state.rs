//! State shared between the control thread and the playback worker.
//!
//! Everything lives behind a single mutex; the condvar wakes the worker on new
//! commands and wakes consumers waiting for a frame.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::domain::model::{DecodedFrame, SeekRequest};

/// Externally visible playback phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    /// No worker thread
    Stopped,
    /// Worker alive and idle, waiting for a seek or step
    Paused,
    /// Worker decoding continuously at the frame interval
    Playing,
}

#[derive(Debug, Default)]
pub(crate) struct PlaybackState {
    pub is_playing: bool,
    pub position_ms: i64,
    /// Latest seek or step request; a newer one overwrites an unconsumed one
    pub pending_seek: Option<SeekRequest>,
    /// Last published frame, taken by the consumer
    pub frame: Option<DecodedFrame>,
    /// Incremented on shutdown and on every spawn. A worker whose generation no
    /// longer matches must exit without touching the state.
    pub generation: u64,
    /// A worker of the current generation is serving requests. Only cleared
    /// under the lock, and by a worker only when nothing is pending.
    pub worker_running: bool,
    /// Continuous playback ran off the end of the stream
    pub ended: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct SharedState {
    state: Mutex<PlaybackState>,
    wake: Condvar,
}

impl SharedState {
    /// Lock the state. A worker that panicked while holding the lock leaves
    /// plain data behind, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wait<'a>(&self, guard: MutexGuard<'a, PlaybackState>) -> MutexGuard<'a, PlaybackState> {
        self.wake.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wait_timeout<'a>(
        &self,
        guard: MutexGuard<'a, PlaybackState>,
        timeout: Duration,
    ) -> MutexGuard<'a, PlaybackState> {
        match self.wake.wait_timeout(guard, timeout) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    pub fn notify(&self) {
        self.wake.notify_all();
    }

    /// Whether the worker of `generation` has been superseded or stopped
    pub fn is_stale(&self, generation: u64) -> bool {
        self.lock().generation != generation
    }

    /// Replace the published frame and advance the position.
    ///
    /// Returns `false` without publishing when `generation` is stale.
    pub fn publish(&self, generation: u64, frame: DecodedFrame) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.position_ms = frame.position_ms;
        state.frame = Some(frame);
        drop(state);
        self.notify();
        true
    }

    /// Record a background failure and fall back to idling
    pub fn fail(&self, generation: u64, message: String) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        state.is_playing = false;
        state.last_error = Some(message);
        drop(state);
        self.notify();
    }

    /// Stop serving requests unless one is pending.
    ///
    /// Returns `true` when the worker of `generation` may exit. With a request
    /// pending the worker must stay and consume it.
    pub fn retire(&self, generation: u64, error: Option<String>) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return true;
        }
        if let Some(message) = error {
            state.last_error = Some(message);
        } else if state.pending_seek.is_some() {
            return false;
        }
        state.is_playing = false;
        state.worker_running = false;
        drop(state);
        self.notify();
        true
    }
}

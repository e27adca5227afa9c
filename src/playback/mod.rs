//! Background playback engine
//!
//! A single worker thread per source decodes frames while playing, or idles
//! and produces exactly one frame per seek or step while paused. The control
//! side never blocks on the worker except during the bounded join in
//! [`PlaybackEngine::shutdown`].

pub mod state;
mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::domain::model::{frame_interval_ms, DecodedFrame, SeekRequest, StepDirection};
use crate::error::{ResizerError, ResizerResult};
pub use state::PlaybackPhase;
use state::SharedState;
use worker::Worker;

/// Bounded join used when none is configured
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(2000);

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Control handle for the playback worker of one source
pub struct PlaybackEngine {
    path: PathBuf,
    interval_ms: i64,
    join_timeout: Duration,
    shared: Arc<SharedState>,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    /// Create a stopped engine for `path`. No thread is spawned until the first
    /// play, seek or step command.
    pub fn new(path: impl AsRef<Path>, frame_rate_hz: f64, join_timeout: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            interval_ms: frame_interval_ms(frame_rate_hz),
            join_timeout,
            shared: Arc::new(SharedState::default()),
            worker: None,
        }
    }

    /// Duration of one frame in whole milliseconds
    pub fn frame_interval_ms(&self) -> i64 {
        self.interval_ms
    }

    pub fn toggle_play_pause(&mut self) -> ResizerResult<()> {
        if self.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Start continuous playback from the current position. After the stream
    /// ran to its end, playback restarts from 0.
    pub fn play(&mut self) -> ResizerResult<()> {
        {
            let mut state = self.shared.lock();
            let alive = state.worker_running && self.handle_running();
            if state.ended {
                state.ended = false;
                state.position_ms = 0;
                state.pending_seek = Some(SeekRequest {
                    target_ms: 0,
                    single_frame: false,
                    step_direction: StepDirection::None,
                });
            } else if let Some(request) = state.pending_seek.as_mut() {
                request.single_frame = false;
            } else if !alive {
                // A fresh worker starts at 0; resume where the last one left off
                state.pending_seek = Some(SeekRequest {
                    target_ms: state.position_ms,
                    single_frame: false,
                    step_direction: StepDirection::None,
                });
            }
            state.is_playing = true;
        }
        info!("Playback started");
        self.ensure_worker()
    }

    pub fn pause(&self) {
        self.shared.lock().is_playing = false;
        self.shared.notify();
        info!("Playback paused");
    }

    /// Jump to `target_ms`. While paused exactly one frame is produced; while
    /// playing, playback continues from the new position.
    pub fn seek(&mut self, target_ms: i64) -> ResizerResult<()> {
        {
            let mut state = self.shared.lock();
            state.ended = false;
            state.pending_seek = Some(SeekRequest {
                target_ms: target_ms.max(0),
                single_frame: !state.is_playing,
                step_direction: StepDirection::None,
            });
        }
        debug!("Seek requested to {}ms", target_ms);
        self.ensure_worker()
    }

    /// Pause and advance by one frame
    pub fn step_forward(&mut self) -> ResizerResult<()> {
        self.request_step(StepDirection::Forward)
    }

    /// Pause and go back by one frame
    pub fn step_backward(&mut self) -> ResizerResult<()> {
        self.request_step(StepDirection::Backward)
    }

    fn request_step(&mut self, direction: StepDirection) -> ResizerResult<()> {
        {
            let mut state = self.shared.lock();
            let target_ms = match direction {
                StepDirection::Backward => state.position_ms - self.interval_ms,
                _ => state.position_ms + self.interval_ms,
            };
            state.is_playing = false;
            state.ended = false;
            state.pending_seek = Some(SeekRequest {
                target_ms,
                single_frame: true,
                step_direction: direction,
            });
            debug!("{:?} step requested to {}ms", direction, target_ms);
        }
        self.ensure_worker()
    }

    /// Take the most recently published frame, if one arrived since the last poll
    pub fn poll_frame(&self) -> Option<DecodedFrame> {
        self.shared.lock().frame.take()
    }

    /// Wait up to `timeout` for a frame to be published, then take it
    pub fn wait_for_frame(&self, timeout: Duration) -> Option<DecodedFrame> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if let Some(frame) = state.frame.take() {
                return Some(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = self.shared.wait_timeout(state, deadline - now);
        }
    }

    /// Timeline position of the last published frame
    pub fn position_ms(&self) -> i64 {
        self.shared.lock().position_ms
    }

    pub fn phase(&self) -> PlaybackPhase {
        if !self.worker_alive() {
            return PlaybackPhase::Stopped;
        }
        if self.shared.lock().is_playing {
            PlaybackPhase::Playing
        } else {
            PlaybackPhase::Paused
        }
    }

    pub fn is_playing(&self) -> bool {
        self.worker_alive() && self.shared.lock().is_playing
    }

    /// Most recent background failure, if any
    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    /// Stop the worker and wait for it for at most the join timeout.
    ///
    /// Pending requests and the published frame are dropped. The worker closes
    /// its decode resources on its own thread as soon as it observes the stop.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.is_playing = false;
            state.pending_seek = None;
            state.frame = None;
            state.worker_running = false;
        }
        self.shared.notify();

        let Some(handle) = self.worker.take() else {
            return;
        };
        self.join_bounded(handle);
    }

    fn worker_alive(&self) -> bool {
        self.shared.lock().worker_running && self.handle_running()
    }

    /// False once the thread returned, including by panic
    fn handle_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn a worker unless one is already serving requests.
    ///
    /// The decision is made under the state lock: a worker only clears
    /// `worker_running` while holding it and with nothing pending, so a request
    /// recorded before this call is either seen by the running worker or
    /// handed to a new one.
    fn ensure_worker(&mut self) -> ResizerResult<()> {
        let generation = {
            let mut state = self.shared.lock();
            if state.worker_running && self.handle_running() {
                drop(state);
                self.shared.notify();
                return Ok(());
            }
            state.generation += 1;
            state.last_error = None;
            state.worker_running = true;
            state.generation
        };

        // A retired worker is only releasing its decoder
        if let Some(previous) = self.worker.take() {
            self.join_bounded(previous);
        }

        let worker = Worker {
            shared: Arc::clone(&self.shared),
            path: self.path.clone(),
            generation,
            interval_ms: self.interval_ms,
        };

        let spawned = thread::Builder::new()
            .name("resizer-playback".to_string())
            .spawn(move || worker.run());
        match spawned {
            Ok(handle) => {
                debug!("Spawned playback worker {}", generation);
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.lock().worker_running = false;
                Err(ResizerError::PlaybackFailed {
                    message: e.to_string(),
                })
            }
        }
    }

    /// Join `handle`, giving up after the join timeout
    fn join_bounded(&self, handle: JoinHandle<()>) {
        let deadline = Instant::now() + self.join_timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        if handle.is_finished() {
            if handle.join().is_err() {
                warn!("Playback worker panicked");
            }
            debug!("Playback worker joined");
        } else {
            warn!(
                "Playback worker did not stop within {}ms; detaching",
                self.join_timeout.as_millis()
            );
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! Playback decode loop, run on the dedicated worker thread

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::state::SharedState;
use crate::decode::{FramePipeline, FrameSelect};
use crate::domain::model::{SeekRequest, StepDirection};

enum Command {
    Seek(SeekRequest),
    Advance,
    Exit,
}

pub(crate) struct Worker {
    pub shared: Arc<SharedState>,
    pub path: PathBuf,
    pub generation: u64,
    pub interval_ms: i64,
}

impl Worker {
    pub fn run(self) {
        let mut pipeline = match FramePipeline::open(&self.path) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                warn!("Playback worker could not open {}: {}", self.path.display(), e);
                self.shared.retire(self.generation, Some(e.to_string()));
                return;
            }
        };
        debug!("Playback worker {} started", self.generation);

        loop {
            match self.next_command() {
                Command::Exit => break,
                Command::Seek(request) => self.handle_seek(&mut pipeline, request),
                Command::Advance => {
                    if !self.advance(&mut pipeline) {
                        break;
                    }
                }
            }
        }

        debug!("Playback worker {} exiting", self.generation);
        // pipeline dropped here: demuxer, decoder and converter closed on this thread
    }

    /// Block until there is something to do
    fn next_command(&self) -> Command {
        let mut state = self.shared.lock();
        loop {
            if state.generation != self.generation {
                return Command::Exit;
            }
            if let Some(request) = state.pending_seek.take() {
                return Command::Seek(request);
            }
            if state.is_playing {
                return Command::Advance;
            }
            state = self.shared.wait(state);
        }
    }

    fn handle_seek(&self, pipeline: &mut FramePipeline, request: SeekRequest) {
        let (seek_ms, select) = match request.step_direction {
            StepDirection::Forward => (request.target_ms, FrameSelect::AtOrAfter(request.target_ms)),
            // Seek one more interval back so a keyframe before the target is reachable
            StepDirection::Backward => (
                (request.target_ms - self.interval_ms).max(0),
                FrameSelect::LastBefore(request.target_ms),
            ),
            StepDirection::None => (request.target_ms, FrameSelect::AtOrAfter(request.target_ms)),
        };
        debug!(
            "Seek request: target {}ms ({:?}, single frame: {}), seeking to {}ms",
            request.target_ms, request.step_direction, request.single_frame, seek_ms
        );

        if let Err(e) = pipeline.seek(seek_ms) {
            if e.is_fatal() {
                warn!("Seek failed: {}", e);
                self.shared.fail(self.generation, e.to_string());
                return;
            }
        }

        let shared = &self.shared;
        let generation = self.generation;
        let superseded = || {
            let state = shared.lock();
            state.generation != generation || state.pending_seek.is_some()
        };

        match pipeline.decode_until(select, superseded) {
            Ok(Some(frame)) => {
                debug!("Seek produced frame at {}ms", frame.position_ms);
                if self.shared.publish(self.generation, frame) && !request.single_frame {
                    self.pace();
                }
            }
            Ok(None) => debug!("Seek to {}ms produced no frame", request.target_ms),
            Err(e) => {
                warn!("Decode after seek failed: {}", e);
                self.shared.fail(self.generation, e.to_string());
            }
        }
    }

    /// Decode, publish and pace one frame of continuous playback.
    ///
    /// Returns `false` when the worker should exit.
    fn advance(&self, pipeline: &mut FramePipeline) -> bool {
        match pipeline.next_frame() {
            Ok(Some(frame)) => {
                if !self.shared.publish(self.generation, frame) {
                    return false;
                }
            }
            Ok(None) => {
                {
                    let mut state = self.shared.lock();
                    if state.generation != self.generation {
                        return false;
                    }
                    if state.pending_seek.is_some() {
                        debug!("Request arrived at end of stream; serving it");
                        return true;
                    }
                    info!("Playback reached end of stream at {}ms", state.position_ms);
                    state.ended = true;
                }
                // A request recorded after `ended` was set keeps the worker alive
                return !self.shared.retire(self.generation, None);
            }
            Err(e) => {
                warn!("Background decode failed: {}", e);
                self.shared.fail(self.generation, e.to_string());
                return true;
            }
        }

        self.pace();
        true
    }

    /// Wait one frame interval while playing; any command cuts the wait short
    fn pace(&self) {
        let interval = Duration::from_millis(self.interval_ms.max(1) as u64);
        let state = self.shared.lock();
        if state.generation == self.generation && state.is_playing && state.pending_seek.is_none() {
            let _state = self.shared.wait_timeout(state, interval);
        }
    }
}

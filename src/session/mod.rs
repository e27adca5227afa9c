//! One open source and the control surface driving it
//!
//! A [`Session`] owns everything tied to a single dropped file: its probe
//! result, the mid-clip preview, the playback engine and the in/out marks.
//! [`SessionHost`] swaps sessions on drop and routes UI commands to the
//! current one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::decode::still::extract_mid_frame;
use crate::domain::model::{DecodedFrame, ScaleFactor, SourceInfo, TimeWindow, TranscodeJob};
use crate::engine::{TranscodeEngine, TranscodeReport};
use crate::error::{ResizerError, ResizerResult};
use crate::output::derive_output_path;
use crate::playback::{PlaybackEngine, PlaybackPhase};
use crate::probe::probe;

/// State for one open source file
pub struct Session {
    info: SourceInfo,
    preview: DecodedFrame,
    playback: PlaybackEngine,
    mark_in: Option<f64>,
    mark_out: Option<f64>,
}

impl Session {
    /// Probe `path` and decode its preview frame. The playback worker is not
    /// started until the first playback command.
    pub fn open(path: impl AsRef<Path>, config: &AppConfig) -> ResizerResult<Self> {
        let path = path.as_ref();
        let info = probe(path)?;
        let preview = extract_mid_frame(path, info.duration_seconds)?;
        let playback = PlaybackEngine::new(
            path,
            info.frame_rate_hz,
            Duration::from_millis(config.playback.join_timeout_ms),
        );

        info!("Opened {}", info.summary());
        Ok(Self {
            info,
            preview,
            playback,
            mark_in: None,
            mark_out: None,
        })
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    /// Mid-clip still frame decoded on open
    pub fn preview(&self) -> &DecodedFrame {
        &self.preview
    }

    pub fn playback(&self) -> &PlaybackEngine {
        &self.playback
    }

    pub fn mark_in(&self) -> Option<f64> {
        self.mark_in
    }

    pub fn mark_out(&self) -> Option<f64> {
        self.mark_out
    }

    /// Window from the marks, with unset marks at the clip boundaries
    pub fn marked_window(&self) -> TimeWindow {
        TimeWindow::new(
            self.mark_in.unwrap_or(0.0),
            self.mark_out.unwrap_or(self.info.duration_seconds),
        )
    }

    fn position_seconds(&self) -> f64 {
        self.playback.position_ms() as f64 / 1000.0
    }

    /// Stop playback and release the worker's decode resources
    pub fn close(&mut self) {
        self.playback.shutdown();
    }
}

/// Routes the UI control surface to the current session
pub struct SessionHost {
    config: AppConfig,
    engine: TranscodeEngine,
    session: Option<Session>,
}

impl SessionHost {
    pub fn new(config: AppConfig) -> Self {
        Self {
            engine: TranscodeEngine::new(config.encoder.clone()),
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Open `path` as the new current session.
    ///
    /// The new source is probed and previewed before the old session is torn
    /// down, so a failure leaves the previous session in place.
    pub fn on_drop(&mut self, path: impl AsRef<Path>) -> ResizerResult<&Session> {
        let path = path.as_ref();
        let next = match Session::open(path, &self.config) {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not open {}: {}", path.display(), e);
                return Err(e);
            }
        };

        if let Some(mut previous) = self.session.take() {
            previous.close();
        }
        let current: &Session = self.session.insert(next);
        Ok(current)
    }

    pub fn on_play_pause_toggle(&mut self) -> ResizerResult<PlaybackPhase> {
        let session = self.current_mut()?;
        session.playback.toggle_play_pause()?;
        Ok(session.playback.phase())
    }

    pub fn on_seek(&mut self, target_ms: i64) -> ResizerResult<()> {
        self.current_mut()?.playback.seek(target_ms)
    }

    pub fn on_step_forward(&mut self) -> ResizerResult<()> {
        self.current_mut()?.playback.step_forward()
    }

    pub fn on_step_backward(&mut self) -> ResizerResult<()> {
        self.current_mut()?.playback.step_backward()
    }

    /// Record the current playback position as the window start
    pub fn on_mark_in(&mut self) -> ResizerResult<f64> {
        let session = self.current_mut()?;
        let seconds = session.position_seconds();
        session.mark_in = Some(seconds);
        info!("Mark in at {:.3}s", seconds);
        Ok(seconds)
    }

    /// Record the current playback position as the window end
    pub fn on_mark_out(&mut self) -> ResizerResult<f64> {
        let session = self.current_mut()?;
        let seconds = session.position_seconds();
        session.mark_out = Some(seconds);
        info!("Mark out at {:.3}s", seconds);
        Ok(seconds)
    }

    /// Latest published playback frame of the current session
    pub fn poll_frame(&self) -> Option<DecodedFrame> {
        self.session.as_ref().and_then(|s| s.playback.poll_frame())
    }

    /// Transcode the current source next to the input, named with the
    /// configured suffix.
    ///
    /// Without an explicit window the marks are used, and without marks the
    /// whole clip.
    pub fn on_start_transcode(
        &self,
        target_size_mb: f64,
        scale: ScaleFactor,
        window: Option<TimeWindow>,
    ) -> ResizerResult<TranscodeReport> {
        let session = self.current()?;
        let output = derive_output_path(&session.info.path, &self.config.output.suffix);
        self.transcode_to(target_size_mb, scale, window, output)
    }

    /// Like [`Self::on_start_transcode`] with an explicit output path
    pub fn transcode_to(
        &self,
        target_size_mb: f64,
        scale: ScaleFactor,
        window: Option<TimeWindow>,
        output: PathBuf,
    ) -> ResizerResult<TranscodeReport> {
        let session = self.current()?;
        let target_size_bytes = TranscodeJob::megabytes_to_bytes(target_size_mb)?;
        let window = window.unwrap_or_else(|| session.marked_window());
        window.validate(session.info.duration_seconds)?;

        let job = TranscodeJob::new(&session.info.path, output, target_size_bytes, scale, window);
        self.engine.transcode(&job)
    }

    /// Tear down the current session, if any
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
            info!("Closed {}", session.info.path.display());
        }
    }

    fn current(&self) -> ResizerResult<&Session> {
        self.session.as_ref().ok_or(ResizerError::NoSourceLoaded)
    }

    fn current_mut(&mut self) -> ResizerResult<&mut Session> {
        self.session.as_mut().ok_or(ResizerError::NoSourceLoaded)
    }
}

impl Drop for SessionHost {
    fn drop(&mut self) {
        self.close();
    }
}

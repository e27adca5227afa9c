//! Audio pass-through: compressed packets are copied, only timestamps change

use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::format::context::{Input, Output};
use ffmpeg::media::Type;
use ffmpeg::Packet;
use tracing::{debug, info};

use crate::domain::model::{TimeWindow, Timebase};
use crate::error::{ResizerError, ResizerResult};

/// Where a packet falls relative to the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketPlacement {
    Before,
    Inside,
    After,
}

/// Timestamp arithmetic for one audio stream, independent of any container
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioRebase {
    pub input_time_base: Timebase,
    pub window: TimeWindow,
    /// Window start in input ticks
    pub start_pts: i64,
}

impl AudioRebase {
    pub fn new(input_time_base: Timebase, window: TimeWindow) -> Self {
        Self {
            input_time_base,
            window,
            start_pts: input_time_base.seconds_to_pts(window.start_seconds),
        }
    }

    /// Fill a missing pts from dts or the other way round; `None` when both are
    /// missing
    pub fn complete_timestamps(pts: Option<i64>, dts: Option<i64>) -> Option<(i64, i64)> {
        match (pts, dts) {
            (Some(pts), Some(dts)) => Some((pts, dts)),
            (Some(pts), None) => Some((pts, pts)),
            (None, Some(dts)) => Some((dts, dts)),
            (None, None) => None,
        }
    }

    pub fn placement(&self, pts: i64) -> PacketPlacement {
        let seconds = self.input_time_base.pts_to_seconds(pts);
        if seconds < self.window.start_seconds {
            PacketPlacement::Before
        } else if seconds > self.window.end_seconds {
            PacketPlacement::After
        } else {
            PacketPlacement::Inside
        }
    }

    /// Re-based `(pts, dts)` in input ticks. Both take the re-based pts so the
    /// muxer never sees dts ahead of pts on the copied stream. Never negative.
    pub fn rebase(&self, pts: i64) -> (i64, i64) {
        let rel = (pts - self.start_pts).max(0);
        (rel, rel)
    }
}

/// Copies the first audio stream of the input into the output
pub struct AudioPassthrough {
    input_index: usize,
    output_index: usize,
    rebase: AudioRebase,
    output_time_base: Timebase,
    output_path: String,
    written: u64,
    finished: bool,
}

impl AudioPassthrough {
    /// Add an output stream mirroring the first input audio stream.
    ///
    /// Must run before the output header is written. A missing audio stream
    /// is reported as `NoAudioStream`, which callers treat as non-fatal.
    pub fn add_stream(
        input: &Input,
        output: &mut Output,
        output_path: &Path,
        window: TimeWindow,
    ) -> ResizerResult<Self> {
        let stream = input
            .streams()
            .find(|s| s.parameters().medium() == Type::Audio)
            .ok_or_else(|| ResizerError::NoAudioStream {
                message: "source has no audio stream".to_string(),
            })?;

        let input_time_base = Timebase::from(stream.time_base());
        let mut ost = output
            .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))
            .map_err(|e| ResizerError::NoAudioStream {
                message: format!("cannot create output audio stream: {}", e),
            })?;
        ost.set_parameters(stream.parameters());
        // Let the muxer pick the tag for its own container
        unsafe {
            (*ost.parameters().as_mut_ptr()).codec_tag = 0;
        }
        ost.set_time_base(stream.time_base());

        debug!(
            "Audio pass-through: input stream #{} -> output stream #{}",
            stream.index(),
            ost.index()
        );

        Ok(Self {
            input_index: stream.index(),
            output_index: ost.index(),
            rebase: AudioRebase::new(input_time_base, window),
            output_time_base: input_time_base,
            output_path: output_path.display().to_string(),
            written: 0,
            finished: false,
        })
    }

    /// Pick up the time base the muxer settled on in `write_header`
    pub fn bind_output(&mut self, output: &Output) {
        if let Some(stream) = output.stream(self.output_index) {
            self.output_time_base = Timebase::from(stream.time_base());
        }
    }

    pub fn input_index(&self) -> usize {
        self.input_index
    }

    /// Whether a packet past the window end has been seen
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Filter, re-base and write one demuxed packet. Packets of other streams
    /// are ignored.
    pub fn handle(&mut self, mut packet: Packet, output: &mut Output) -> ResizerResult<()> {
        if packet.stream() != self.input_index {
            return Ok(());
        }
        let Some((pts, _dts)) = AudioRebase::complete_timestamps(packet.pts(), packet.dts()) else {
            return Ok(());
        };

        match self.rebase.placement(pts) {
            PacketPlacement::Before => return Ok(()),
            PacketPlacement::After => {
                self.finished = true;
                return Ok(());
            }
            PacketPlacement::Inside => {}
        }

        let (pts, dts) = self.rebase.rebase(pts);
        packet.set_pts(Some(pts));
        packet.set_dts(Some(dts));
        packet.set_stream(self.output_index);
        packet.set_position(-1);
        packet.rescale_ts(self.rebase.input_time_base, self.output_time_base);

        packet
            .write_interleaved(output)
            .map_err(|e| ResizerError::IoFailure {
                path: self.output_path.clone(),
                message: format!("audio packet: {}", e),
            })?;
        self.written += 1;
        Ok(())
    }

    /// Log the pass-through summary
    pub fn finish(&self) {
        info!("Copied {} audio packets", self.written);
    }
}

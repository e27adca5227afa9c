//! Shared frame decode pipeline
//!
//! [`VideoSource`] owns one demuxer and the video decoder for its primary
//! stream. [`FramePipeline`] adds the RGB24 converter on top and is what the
//! still-frame extractor and the playback worker consume. The transcode engine
//! drives a [`VideoSource`] directly and feeds the raw frames to its encoder.
//!
//! Every handle is owned by the struct that opened it, so dropping a source or
//! pipeline releases the demuxer, decoder and converter on every exit path.

pub mod still;

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{context::Context as Scaler, flag::Flags};
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::Packet;
use tracing::{debug, warn};

use crate::domain::model::{frame_interval_ms, DecodedFrame, Timebase, DEFAULT_FRAME_RATE};
use crate::error::{ResizerError, ResizerResult};
use crate::probe::rational_hz;

/// Demuxer plus opened decoder for the first video stream of a file
pub struct VideoSource {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    stream_index: usize,
    time_base: Timebase,
    frame_rate: ffmpeg::Rational,
    /// End of input has been signalled to the decoder
    eof_sent: bool,
    /// At least one packet was read or a seek was issued
    touched: bool,
}

impl VideoSource {
    /// Open `path` and its primary video decoder
    pub fn open(path: impl AsRef<Path>) -> ResizerResult<Self> {
        let path = path.as_ref();
        let input = ffmpeg::format::input(&path).map_err(|e| ResizerError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let (stream_index, time_base, frame_rate, context) = {
            let stream = input
                .streams()
                .find(|s| s.parameters().medium() == Type::Video)
                .ok_or_else(|| ResizerError::NoVideoStream {
                    path: path.display().to_string(),
                })?;
            let frame_rate = [stream.avg_frame_rate(), stream.rate()]
                .into_iter()
                .find(|r| rational_hz(*r).is_some())
                .unwrap_or_else(|| ffmpeg::Rational::new(DEFAULT_FRAME_RATE as i32, 1));
            let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .map_err(|e| ResizerError::DecoderUnavailable {
                    message: e.to_string(),
                })?;
            (
                stream.index(),
                Timebase::from(stream.time_base()),
                frame_rate,
                context,
            )
        };

        let decoder = context
            .decoder()
            .video()
            .map_err(|e| ResizerError::DecoderUnavailable {
                message: e.to_string(),
            })?;

        debug!(
            "Opened video stream #{} of {} ({}x{}, tb {}/{})",
            stream_index,
            path.display(),
            decoder.width(),
            decoder.height(),
            time_base.num,
            time_base.den
        );

        Ok(Self {
            path: path.to_path_buf(),
            input,
            decoder,
            stream_index,
            time_base,
            frame_rate,
            eof_sent: false,
            touched: false,
        })
    }

    pub fn input(&self) -> &ffmpeg::format::context::Input {
        &self.input
    }

    pub fn decoder(&self) -> &ffmpeg::decoder::Video {
        &self.decoder
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Time base of the video stream
    pub fn time_base(&self) -> Timebase {
        self.time_base
    }

    /// Average frame rate, else the nominal rate, else 30/1
    pub fn frame_rate(&self) -> ffmpeg::Rational {
        self.frame_rate
    }

    pub fn frame_rate_hz(&self) -> f64 {
        rational_hz(self.frame_rate).unwrap_or(DEFAULT_FRAME_RATE)
    }

    /// Backward seek to the keyframe at or before `target_ms`, then flush the
    /// decoder.
    ///
    /// A seek to 0 on an untouched source is skipped since the demuxer already
    /// sits at the start. On failure the decoder is still flushed and decoding
    /// continues from wherever the demuxer is; the error is non-fatal.
    pub fn seek_to_millis(&mut self, target_ms: i64) -> ResizerResult<()> {
        let target_ms = target_ms.max(0);
        if target_ms == 0 && !self.touched {
            return Ok(());
        }
        self.touched = true;

        let ts = Timebase::millis().rescale_pts(target_ms, &Timebase::av_time_base());
        let result = self.input.seek(ts, ..=ts);

        self.decoder.flush();
        self.eof_sent = false;

        result.map_err(|e| {
            warn!(
                "Seek to {}ms failed in {}: {}; decoding from current position",
                target_ms,
                self.path.display(),
                e
            );
            ResizerError::SeekUnsupported {
                target_ms,
                message: e.to_string(),
            }
        })
    }

    /// Decode the next video frame into `frame`.
    ///
    /// Packets of other streams are handed to `on_other` in demux order.
    /// Returns `Ok(false)` once the decoder is fully drained.
    pub fn next_raw_frame<F>(&mut self, frame: &mut VideoFrame, mut on_other: F) -> ResizerResult<bool>
    where
        F: FnMut(Packet) -> ResizerResult<()>,
    {
        loop {
            match self.decoder.receive_frame(frame) {
                Ok(()) => return Ok(true),
                Err(ffmpeg::Error::Eof) => return Ok(false),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {}
                Err(e) => {
                    return Err(ResizerError::DecodeFailed {
                        message: e.to_string(),
                    })
                }
            }

            if self.eof_sent {
                return Ok(false);
            }

            self.touched = true;
            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() == self.stream_index {
                        if let Err(e) = self.decoder.send_packet(&packet) {
                            // Corrupt packets are dropped; the decoder resyncs at the next keyframe
                            debug!("Dropping undecodable packet: {}", e);
                        }
                    } else {
                        on_other(packet)?;
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    self.decoder
                        .send_eof()
                        .map_err(|e| ResizerError::DecodeFailed {
                            message: e.to_string(),
                        })?;
                    self.eof_sent = true;
                }
                Err(e) => {
                    return Err(ResizerError::DecodeFailed {
                        message: e.to_string(),
                    })
                }
            }
        }
    }

    /// Read the next demuxed packet without decoding it; `None` at end of input
    pub fn read_packet(&mut self) -> ResizerResult<Option<Packet>> {
        self.touched = true;
        let mut packet = Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => Ok(Some(packet)),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(ResizerError::DecodeFailed {
                message: e.to_string(),
            }),
        }
    }

    /// Presentation time of a decoded frame in stream ticks
    pub fn frame_pts(frame: &VideoFrame) -> Option<i64> {
        frame.timestamp().or_else(|| frame.pts())
    }
}

/// Stop condition for [`FramePipeline::decode_until`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSelect {
    /// The first frame that comes out of the decoder
    First,
    /// The first frame whose position is `>= target_ms`
    AtOrAfter(i64),
    /// The last frame whose position is `< target_ms`; if the first frame seen is
    /// already at or past the target, that frame instead
    LastBefore(i64),
}

/// What to do with an offered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Discard and keep decoding
    Skip,
    /// Keep as the current candidate and keep decoding
    Retain,
    /// Publish this frame
    Emit,
    /// Publish the previously retained candidate
    EmitRetained,
}

/// Evaluates decoded frame positions against a [`FrameSelect`]
#[derive(Debug, Clone)]
pub struct FrameSelector {
    select: FrameSelect,
    has_retained: bool,
}

impl FrameSelector {
    pub fn new(select: FrameSelect) -> Self {
        Self {
            select,
            has_retained: false,
        }
    }

    /// Verdict for a frame at `position_ms`
    pub fn offer(&mut self, position_ms: i64) -> Verdict {
        match self.select {
            FrameSelect::First => Verdict::Emit,
            FrameSelect::AtOrAfter(target) => {
                if position_ms >= target {
                    Verdict::Emit
                } else {
                    Verdict::Skip
                }
            }
            FrameSelect::LastBefore(target) => {
                if position_ms < target {
                    self.has_retained = true;
                    Verdict::Retain
                } else if self.has_retained {
                    Verdict::EmitRetained
                } else {
                    Verdict::Emit
                }
            }
        }
    }

    /// Verdict once the stream has ended
    pub fn finish(&self) -> Verdict {
        if self.has_retained {
            Verdict::EmitRetained
        } else {
            Verdict::Skip
        }
    }
}

/// [`VideoSource`] plus a converter to packed RGB24 at the source resolution
pub struct FramePipeline {
    source: VideoSource,
    scaler: Option<(Scaler, Pixel, u32, u32)>,
    decoded: VideoFrame,
    converted: VideoFrame,
    last_position_ms: Option<i64>,
    interval_ms: i64,
    /// Frame decoded past a retained candidate, served before decoding resumes
    lookahead: Option<(VideoFrame, i64)>,
}

impl FramePipeline {
    pub fn open(path: impl AsRef<Path>) -> ResizerResult<Self> {
        let source = VideoSource::open(path)?;
        let interval_ms = frame_interval_ms(source.frame_rate_hz());
        Ok(Self {
            source,
            scaler: None,
            decoded: VideoFrame::empty(),
            converted: VideoFrame::empty(),
            last_position_ms: None,
            interval_ms,
            lookahead: None,
        })
    }

    pub fn source(&self) -> &VideoSource {
        &self.source
    }

    /// Duration of one frame in whole milliseconds
    pub fn frame_interval_ms(&self) -> i64 {
        self.interval_ms
    }

    /// Backward seek to the keyframe at or before `target_ms`
    pub fn seek(&mut self, target_ms: i64) -> ResizerResult<()> {
        self.last_position_ms = None;
        self.lookahead = None;
        self.source.seek_to_millis(target_ms)
    }

    /// Decode and convert the next frame; `None` at end of stream
    pub fn next_frame(&mut self) -> ResizerResult<Option<DecodedFrame>> {
        let Some(position_ms) = self.pull_decoded()? else {
            return Ok(None);
        };
        Self::convert(&mut self.scaler, &mut self.converted, &self.decoded, position_ms).map(Some)
    }

    /// Decode forward until `select` is satisfied.
    ///
    /// `cancelled` is polled between frames; a cancelled or exhausted decode
    /// returns `None` unless a retained candidate is pending.
    pub fn decode_until<C>(&mut self, select: FrameSelect, cancelled: C) -> ResizerResult<Option<DecodedFrame>>
    where
        C: Fn() -> bool,
    {
        let mut selector = FrameSelector::new(select);
        let mut retained: Option<(VideoFrame, i64)> = None;

        loop {
            if cancelled() {
                return Ok(None);
            }
            let Some(position_ms) = self.pull_decoded()? else {
                return match (selector.finish(), retained) {
                    (Verdict::EmitRetained, Some((frame, position_ms))) => {
                        Self::convert(&mut self.scaler, &mut self.converted, &frame, position_ms)
                            .map(Some)
                    }
                    _ => Ok(None),
                };
            };

            match selector.offer(position_ms) {
                Verdict::Skip => {}
                Verdict::Retain => retained = Some((self.decoded.clone(), position_ms)),
                Verdict::Emit => {
                    return Self::convert(&mut self.scaler, &mut self.converted, &self.decoded, position_ms)
                        .map(Some);
                }
                Verdict::EmitRetained => {
                    if let Some((frame, retained_ms)) = retained.take() {
                        self.lookahead = Some((self.decoded.clone(), position_ms));
                        return Self::convert(&mut self.scaler, &mut self.converted, &frame, retained_ms)
                            .map(Some);
                    }
                }
            }
        }
    }

    /// Load the next frame into `self.decoded` and return its position;
    /// `None` at end of stream
    fn pull_decoded(&mut self) -> ResizerResult<Option<i64>> {
        if let Some((frame, position_ms)) = self.lookahead.take() {
            self.decoded = frame;
            self.last_position_ms = Some(position_ms);
            return Ok(Some(position_ms));
        }
        if !self.source.next_raw_frame(&mut self.decoded, |_| Ok(()))? {
            return Ok(None);
        }
        Ok(Some(self.position_of_decoded()))
    }

    /// Position of `self.decoded`; frames without a timestamp continue the
    /// previous position by one frame interval
    fn position_of_decoded(&mut self) -> i64 {
        let position_ms = match VideoSource::frame_pts(&self.decoded) {
            Some(pts) => self.source.time_base().pts_to_millis(pts),
            None => self
                .last_position_ms
                .map(|last| last + self.interval_ms)
                .unwrap_or(0),
        };
        self.last_position_ms = Some(position_ms);
        position_ms
    }

    fn convert(
        scaler_slot: &mut Option<(Scaler, Pixel, u32, u32)>,
        converted: &mut VideoFrame,
        frame: &VideoFrame,
        position_ms: i64,
    ) -> ResizerResult<DecodedFrame> {
        let (format, width, height) = (frame.format(), frame.width(), frame.height());

        let stale = match scaler_slot {
            Some((_, f, w, h)) => *f != format || *w != width || *h != height,
            None => true,
        };
        if stale {
            let scaler = Scaler::get(format, width, height, Pixel::RGB24, width, height, Flags::BILINEAR)
                .map_err(|e| ResizerError::DecodeFailed {
                    message: format!("pixel converter: {}", e),
                })?;
            *scaler_slot = Some((scaler, format, width, height));
        }

        let (scaler, _, _, _) = scaler_slot.as_mut().ok_or_else(|| ResizerError::DecodeFailed {
            message: "pixel converter missing".to_string(),
        })?;
        scaler
            .run(frame, converted)
            .map_err(|e| ResizerError::DecodeFailed {
                message: e.to_string(),
            })?;

        // Destripe: copy visible pixels only, not the stride padding
        let row_bytes = width as usize * DecodedFrame::BYTES_PER_PIXEL;
        let stride = converted.stride(0);
        let raw = converted.data(0);
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            pixels.extend_from_slice(&raw[start..start + row_bytes]);
        }

        Ok(DecodedFrame {
            pixels,
            width,
            height,
            position_ms,
        })
    }
}

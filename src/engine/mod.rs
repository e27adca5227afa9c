//! Segment transcoding engine
//!
//! Decodes the primary video stream of a window, rescales it, re-encodes it at
//! a bitrate derived from the target size and muxes it next to the untouched
//! audio packets. Both timelines are re-based so the output starts at zero.

pub mod audio;
pub mod bitrate;
pub mod encoder_selection;

use std::path::PathBuf;
use std::time::Instant;

use ffmpeg_next as ffmpeg;
use ffmpeg::codec;
use ffmpeg::format::{self, Pixel};
use ffmpeg::software::scaling::{context::Context as Scaler, flag::Flags};
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::{picture, Packet, Rational};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EncoderConfig;
use crate::decode::VideoSource;
use crate::domain::model::{ScaleFactor, Timebase, TranscodeJob};
use crate::error::{ResizerError, ResizerResult};
use crate::probe::probe;
use crate::utils::Utils;
use audio::AudioPassthrough;
use bitrate::target_bitrate_with_share;
use encoder_selection::{candidates, EncoderChoice};

/// Outcome of a successful transcode
#[derive(Debug, Clone, Serialize)]
pub struct TranscodeReport {
    pub output_path: PathBuf,
    pub encoder: String,
    pub bitrate: u64,
    pub width: u32,
    pub height: u32,
    pub frames_encoded: u64,
    pub has_audio: bool,
    pub output_size_bytes: u64,
}

/// Output dimensions for `scale`, rounded down to even values as 4:2:0
/// encoders require
pub fn encoder_dimensions(scale: ScaleFactor, width: u32, height: u32) -> (u32, u32) {
    let (w, h) = scale.output_dimensions(width, height);
    (w & !1, h & !1)
}

/// Synchronous transcoder; each call opens its own input and output
#[derive(Debug, Clone, Default)]
pub struct TranscodeEngine {
    settings: EncoderConfig,
}

struct OpenedEncoder {
    encoder: ffmpeg::encoder::Video,
    choice: EncoderChoice,
}

impl TranscodeEngine {
    pub fn new(settings: EncoderConfig) -> Self {
        Self { settings }
    }

    /// Run `job` to completion.
    ///
    /// The window and bitrate are validated before any decoder or encoder is
    /// opened. A failure after the output was created leaves the partial file
    /// in place.
    pub fn transcode(&self, job: &TranscodeJob) -> ResizerResult<TranscodeReport> {
        let started = Instant::now();
        info!(
            "Transcoding {} [{}] -> {}",
            job.input_path.display(),
            job.window,
            job.output_path.display()
        );

        let source_info = probe(&job.input_path)?;
        job.window.validate(source_info.duration_seconds)?;
        let bitrate = target_bitrate_with_share(job.target_size_bytes, &job.window, self.settings.size_headroom)?;
        info!(
            "Target bitrate {} for {} over {:.3}s",
            Utils::format_bitrate(bitrate),
            Utils::format_file_size(job.target_size_bytes),
            job.window.duration_seconds()
        );

        let choices = candidates(&self.settings);
        if choices.is_empty() {
            return Err(ResizerError::EncoderUnavailable {
                message: "no H.264 encoder is available".to_string(),
            });
        }

        let mut source = VideoSource::open(&job.input_path)?;
        let (width, height) = encoder_dimensions(job.scale, source.decoder().width(), source.decoder().height());
        if width == 0 || height == 0 {
            return Err(ResizerError::EncoderUnavailable {
                message: format!(
                    "{}x{} at scale {} leaves no picture",
                    source.decoder().width(),
                    source.decoder().height(),
                    job.scale
                ),
            });
        }

        let frame_rate = source.frame_rate();
        let encoder_tb = Timebase::from(frame_rate.invert());
        let output_failure = |e: ffmpeg::Error| ResizerError::IoFailure {
            path: job.output_path.display().to_string(),
            message: e.to_string(),
        };

        let mut octx = format::output(&job.output_path).map_err(output_failure)?;
        let global_header = octx.format().flags().contains(format::Flags::GLOBAL_HEADER);

        let mut opened = self.open_first_encoder(
            &choices,
            width,
            height,
            encoder_tb,
            frame_rate,
            bitrate,
            source.decoder().aspect_ratio(),
            global_header,
        )?;

        let video_out_index = {
            let mut ost = octx.add_stream(opened.choice.codec).map_err(output_failure)?;
            ost.set_parameters(&opened.encoder);
            ost.set_time_base(Rational::from(encoder_tb));
            ost.index()
        };

        let mut audio = match AudioPassthrough::add_stream(source.input(), &mut octx, &job.output_path, job.window) {
            Ok(audio) => Some(audio),
            Err(e) => {
                info!("Continuing video-only: {}", e);
                None
            }
        };

        octx.write_header().map_err(output_failure)?;
        let video_out_tb = octx
            .stream(video_out_index)
            .map(|s| Timebase::from(s.time_base()))
            .unwrap_or(encoder_tb);
        if let Some(audio) = audio.as_mut() {
            audio.bind_output(&octx);
        }

        let start_ms = (job.window.start_seconds * 1000.0).floor() as i64;
        if let Err(e) = source.seek_to_millis(start_ms) {
            if e.is_fatal() {
                return Err(e);
            }
        }

        let video_tb = source.time_base();
        let start_pts = video_tb.seconds_to_pts(job.window.start_seconds);
        let mut scaler: Option<(Scaler, Pixel, u32, u32)> = None;
        let mut decoded = VideoFrame::empty();
        let mut last_pts: Option<i64> = None;
        let mut frames_encoded = 0u64;

        loop {
            let got_frame = {
                let octx = &mut octx;
                let audio = &mut audio;
                source.next_raw_frame(&mut decoded, |packet| match audio.as_mut() {
                    Some(audio) => audio.handle(packet, octx),
                    None => Ok(()),
                })?
            };
            if !got_frame {
                break;
            }

            let Some(pts) = VideoSource::frame_pts(&decoded) else {
                debug!("Skipping frame without timestamp");
                continue;
            };
            let seconds = video_tb.pts_to_seconds(pts);
            if seconds < job.window.start_seconds {
                continue;
            }
            if seconds > job.window.end_seconds {
                debug!("Reached window end at {:.3}s", seconds);
                break;
            }

            // Re-base to zero; encoders reject non-increasing timestamps
            let rebased = video_tb.rescale_pts(pts - start_pts, &encoder_tb).max(0);
            let rebased = match last_pts {
                Some(last) if rebased <= last => last + 1,
                _ => rebased,
            };
            last_pts = Some(rebased);

            let mut scaled = Self::rescale(&mut scaler, &decoded, opened.choice.pixel_format(), width, height)?;
            scaled.set_pts(Some(rebased));
            scaled.set_kind(picture::Type::None);

            opened
                .encoder
                .send_frame(&scaled)
                .map_err(|e| ResizerError::EncoderUnavailable {
                    message: format!("{} rejected a frame: {}", opened.choice.name, e),
                })?;
            Self::drain_encoder(&mut opened.encoder, &mut octx, video_out_index, encoder_tb, video_out_tb)
                .map_err(output_failure)?;
            frames_encoded += 1;
        }

        // Audio interleaved after the last kept video frame still belongs to the window
        if let Some(audio) = audio.as_mut() {
            while !audio.finished() {
                match source.read_packet()? {
                    Some(packet) => audio.handle(packet, &mut octx)?,
                    None => break,
                }
            }
            audio.finish();
        }

        opened
            .encoder
            .send_eof()
            .map_err(|e| ResizerError::EncoderUnavailable {
                message: format!("flushing {}: {}", opened.choice.name, e),
            })?;
        Self::drain_encoder(&mut opened.encoder, &mut octx, video_out_index, encoder_tb, video_out_tb)
            .map_err(output_failure)?;
        octx.write_trailer().map_err(output_failure)?;

        if frames_encoded == 0 {
            return Err(ResizerError::DecodeFailed {
                message: format!("no video frames fell inside {}", job.window),
            });
        }

        let output_size_bytes = std::fs::metadata(&job.output_path).map(|m| m.len()).unwrap_or(0);
        info!(
            "Transcode completed in {:.2}s: {} frames, {} ({} target) with {}",
            started.elapsed().as_secs_f64(),
            frames_encoded,
            Utils::format_file_size(output_size_bytes),
            Utils::format_file_size(job.target_size_bytes),
            opened.choice.name
        );

        Ok(TranscodeReport {
            output_path: job.output_path.clone(),
            encoder: opened.choice.name.clone(),
            bitrate,
            width,
            height,
            frames_encoded,
            has_audio: audio.is_some(),
            output_size_bytes,
        })
    }

    /// Open the first candidate that accepts the configuration; a hardware
    /// encoder that is compiled in but has no device falls through to software
    #[allow(clippy::too_many_arguments)]
    fn open_first_encoder(
        &self,
        choices: &[EncoderChoice],
        width: u32,
        height: u32,
        time_base: Timebase,
        frame_rate: Rational,
        bitrate: u64,
        aspect_ratio: Rational,
        global_header: bool,
    ) -> ResizerResult<OpenedEncoder> {
        let mut failures = Vec::new();

        for choice in choices {
            let context = codec::context::Context::new_with_codec(choice.codec);
            let mut video = match context.encoder().video() {
                Ok(video) => video,
                Err(e) => {
                    failures.push(format!("{}: {}", choice.name, e));
                    continue;
                }
            };

            video.set_width(width);
            video.set_height(height);
            video.set_format(choice.pixel_format());
            video.set_time_base(Rational::from(time_base));
            video.set_frame_rate(Some(frame_rate));
            video.set_bit_rate(bitrate as usize);
            video.set_max_bit_rate(bitrate as usize);
            video.set_aspect_ratio(aspect_ratio);
            if global_header {
                video.set_flags(codec::Flags::GLOBAL_HEADER);
            }

            match video.open_with(choice.options(&self.settings.software_preset, bitrate)) {
                Ok(encoder) => {
                    info!(
                        "Using {} encoder {} ({}x{}, {:?})",
                        if choice.hardware { "hardware" } else { "software" },
                        choice.name,
                        width,
                        height,
                        choice.pixel_format()
                    );
                    return Ok(OpenedEncoder {
                        encoder,
                        choice: choice.clone(),
                    });
                }
                Err(e) => {
                    warn!("Could not open encoder {}: {}", choice.name, e);
                    failures.push(format!("{}: {}", choice.name, e));
                }
            }
        }

        Err(ResizerError::EncoderUnavailable {
            message: failures.join("; "),
        })
    }

    fn rescale(
        scaler_slot: &mut Option<(Scaler, Pixel, u32, u32)>,
        frame: &VideoFrame,
        format: Pixel,
        width: u32,
        height: u32,
    ) -> ResizerResult<VideoFrame> {
        let key = (frame.format(), frame.width(), frame.height());
        let stale = match scaler_slot {
            Some((_, f, w, h)) => (*f, *w, *h) != key,
            None => true,
        };
        if stale {
            let scaler = Scaler::get(key.0, key.1, key.2, format, width, height, Flags::BILINEAR).map_err(|e| {
                ResizerError::DecodeFailed {
                    message: format!("scaler: {}", e),
                }
            })?;
            *scaler_slot = Some((scaler, key.0, key.1, key.2));
        }

        let (scaler, _, _, _) = scaler_slot.as_mut().ok_or_else(|| ResizerError::DecodeFailed {
            message: "scaler missing".to_string(),
        })?;
        let mut scaled = VideoFrame::empty();
        scaler
            .run(frame, &mut scaled)
            .map_err(|e| ResizerError::DecodeFailed {
                message: e.to_string(),
            })?;
        Ok(scaled)
    }

    fn drain_encoder(
        encoder: &mut ffmpeg::encoder::Video,
        octx: &mut format::context::Output,
        stream_index: usize,
        encoder_tb: Timebase,
        stream_tb: Timebase,
    ) -> Result<(), ffmpeg::Error> {
        let mut packet = Packet::empty();
        while encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(stream_index);
            packet.rescale_ts(encoder_tb, stream_tb);
            packet.write_interleaved(octx)?;
        }
        Ok(())
    }
}

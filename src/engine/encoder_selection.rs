//! H.264 encoder selection: preferred hardware encoder, software fallback

use ffmpeg_next as ffmpeg;
use ffmpeg::codec::{self, encoder};
use ffmpeg::format::Pixel;
use ffmpeg::{Codec, Dictionary};
use tracing::debug;

use crate::config::EncoderConfig;

/// Name suffixes of hardware-backed encoders
const HARDWARE_SUFFIXES: &[&str] = &["_nvenc", "_qsv", "_amf", "_videotoolbox"];

/// Software encoder looked up by name before falling back to any H.264 encoder
const SOFTWARE_ENCODER: &str = "libx264";

/// Whether an encoder name denotes a hardware encoder
pub fn is_hardware_encoder(name: &str) -> bool {
    HARDWARE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// One encoder the transcode engine may try to open
#[derive(Clone)]
pub struct EncoderChoice {
    pub codec: Codec,
    pub name: String,
    pub hardware: bool,
}

impl std::fmt::Debug for EncoderChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderChoice")
            .field("name", &self.name)
            .field("hardware", &self.hardware)
            .finish()
    }
}

impl EncoderChoice {
    fn new(codec: Codec) -> Self {
        let name = codec.name().to_string();
        Self {
            codec,
            hardware: is_hardware_encoder(&name),
            name,
        }
    }

    /// Input pixel format: NV12 for hardware encoders, YUV420P otherwise
    pub fn pixel_format(&self) -> Pixel {
        if self.hardware {
            Pixel::NV12
        } else {
            Pixel::YUV420P
        }
    }

    /// Private and rate-control options for a constant-bitrate encode
    pub fn options(&self, software_preset: &str, bitrate: u64) -> Dictionary<'static> {
        let mut opts = Dictionary::new();
        let bitrate = bitrate.to_string();
        opts.set("bufsize", &bitrate);
        if self.hardware {
            if self.name.ends_with("_nvenc") {
                opts.set("rc", "cbr");
            }
        } else {
            opts.set("preset", software_preset);
            opts.set("nal-hrd", "cbr");
        }
        opts
    }
}

/// Encoders to try, in order.
///
/// The configured hardware encoder comes first when hardware is preferred and
/// the encoder is compiled in; the software H.264 encoder follows.
pub fn candidates(config: &EncoderConfig) -> Vec<EncoderChoice> {
    let mut choices = Vec::new();

    if config.prefer_hardware {
        match encoder::find_by_name(&config.hardware_encoder) {
            Some(codec) => choices.push(EncoderChoice::new(codec)),
            None => debug!("Hardware encoder {} not available", config.hardware_encoder),
        }
    }

    let software = encoder::find_by_name(SOFTWARE_ENCODER).or_else(|| encoder::find(codec::Id::H264));
    if let Some(codec) = software {
        let choice = EncoderChoice::new(codec);
        let hardware_excluded = choice.hardware && !config.prefer_hardware;
        if !hardware_excluded && !choices.iter().any(|c| c.name == choice.name) {
            choices.push(choice);
        }
    }

    debug!(
        "Encoder candidates: {:?}",
        choices.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
    );
    choices
}

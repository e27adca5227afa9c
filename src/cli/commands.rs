//! Command implementations

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::args::{PlayArgs, PreviewArgs, ProbeArgs, TranscodeArgs};
use crate::config::AppConfig;
use crate::decode::still::extract_mid_frame;
use crate::domain::model::{ScaleFactor, SourceInfo, TimeWindow, TranscodeJob};
use crate::engine::TranscodeEngine;
use crate::output::{derive_output_path, write_png};
use crate::probe::probe;
use crate::session::SessionHost;
use crate::utils::time::TimeParser;
use crate::utils::Utils;

/// How long a single step may take to deliver its frame
const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Execute the probe command
pub fn probe_command(args: ProbeArgs) -> Result<()> {
    let info = probe(&args.input).context("Failed to probe input file")?;

    if args.json {
        let json = serde_json::to_string_pretty(&info).context("Failed to serialize source info to JSON")?;
        println!("{}", json);
    } else {
        display_source_info(&info);
    }
    Ok(())
}

/// Execute the preview command
pub fn preview_command(args: PreviewArgs) -> Result<()> {
    let info = probe(&args.input).context("Failed to probe input file")?;
    let frame = extract_mid_frame(&args.input, info.duration_seconds).context("Failed to decode preview frame")?;
    write_png(&frame, &args.output).context("Failed to write preview")?;

    println!("{}", args.output.display());
    Ok(())
}

/// Execute the transcode command
pub fn transcode_command(args: TranscodeArgs, config: &AppConfig) -> Result<()> {
    let scale: ScaleFactor = args.scale.parse()?;
    let target_size_bytes = TranscodeJob::megabytes_to_bytes(args.size_mb)?;

    let info = probe(&args.input).context("Failed to probe input file")?;
    let window = resolve_window(&info, args.start.as_deref(), args.end.as_deref())?;

    let output = match args.output {
        Some(path) => path,
        None => {
            let suffix = args.suffix.as_deref().unwrap_or(&config.output.suffix);
            derive_output_path(&args.input, suffix)
        }
    };

    let mut settings = config.encoder.clone();
    if args.software {
        settings.prefer_hardware = false;
    }

    let job = TranscodeJob::new(&args.input, &output, target_size_bytes, scale, window);
    let report = TranscodeEngine::new(settings)
        .transcode(&job)
        .with_context(|| format!("Failed to transcode {}", args.input.display()))?;

    info!(
        "{} frames at {}x{}, {} with {}",
        report.frames_encoded,
        report.width,
        report.height,
        Utils::format_bitrate(report.bitrate),
        report.encoder
    );
    println!("{}", report.output_path.display());
    Ok(())
}

/// Execute the play command
pub fn play_command(args: PlayArgs, config: &AppConfig) -> Result<()> {
    let parser = TimeParser::new();
    let mut host = SessionHost::new(config.clone());
    host.on_drop(&args.input).context("Failed to open input file")?;

    if let Some(from) = &args.from {
        let target_ms = parser.parse_millis(from)?;
        host.on_seek(target_ms)?;
        report_frame(&host, "seek")?;
    }

    for _ in 0..args.step_forward {
        host.on_step_forward()?;
        report_frame(&host, "step forward")?;
    }
    for _ in 0..args.step_backward {
        host.on_step_backward()?;
        report_frame(&host, "step backward")?;
    }

    if args.for_ms > 0 {
        let tick = Duration::from_millis(args.tick_ms.max(1));
        let deadline = Instant::now() + Duration::from_millis(args.for_ms);
        let mut delivered = 0u64;

        host.on_play_pause_toggle()?;
        while Instant::now() < deadline {
            std::thread::sleep(tick);
            if let Some(frame) = host.poll_frame() {
                delivered += 1;
                debug!("Frame at {}ms", frame.position_ms);
            }
            let Some(session) = host.session() else { break };
            if !session.playback().is_playing() {
                info!("Playback stopped");
                break;
            }
        }
        info!("Delivered {} frames", delivered);
    }

    let position_ms = host
        .session()
        .map(|s| s.playback().position_ms())
        .unwrap_or_default();
    if let Some(error) = host.session().and_then(|s| s.playback().last_error()) {
        warn!("Playback reported: {}", error);
    }
    host.close();

    println!("{}", position_ms);
    Ok(())
}

/// Wait for the frame produced by a seek or step and log its position
fn report_frame(host: &SessionHost, what: &str) -> Result<()> {
    let session = host.session().context("No source loaded")?;
    match session.playback().wait_for_frame(STEP_TIMEOUT) {
        Some(frame) => {
            info!("{} -> {}ms", what, frame.position_ms);
            Ok(())
        }
        None => match session.playback().last_error() {
            Some(error) => anyhow::bail!("{} failed: {}", what, error),
            None => anyhow::bail!("{} produced no frame within {}s", what, STEP_TIMEOUT.as_secs()),
        },
    }
}

/// Window from optional start/end strings, defaulting to the whole clip
fn resolve_window(info: &SourceInfo, start: Option<&str>, end: Option<&str>) -> Result<TimeWindow> {
    let parser = TimeParser::new();
    let start = match start {
        Some(s) => parser.parse_time(s)?,
        None => 0.0,
    };
    let end = match end {
        Some(e) => parser.parse_time(e)?,
        None => info.duration_seconds,
    };

    let window = TimeWindow::new(start, end);
    window.validate(info.duration_seconds)?;
    Ok(window)
}

/// Display source information in human-readable format
fn display_source_info(info: &SourceInfo) {
    let parser = TimeParser::new();
    println!("File:       {}", info.path.display());
    println!("Duration:   {} ({:.3}s)", parser.format_time(info.duration_seconds), info.duration_seconds);
    println!("Resolution: {}x{}", info.width, info.height);
    println!("Frame rate: {:.3} fps", info.frame_rate_hz);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn info() -> SourceInfo {
        SourceInfo {
            path: PathBuf::from("clip.mp4"),
            duration_seconds: 30.0,
            width: 1280,
            height: 720,
            frame_rate_hz: 25.0,
        }
    }

    #[test]
    fn test_default_window_is_whole_clip() {
        assert_eq!(resolve_window(&info(), None, None).unwrap(), TimeWindow::new(0.0, 30.0));
    }

    #[test]
    fn test_window_from_strings() {
        let window = resolve_window(&info(), Some("5"), Some("00:20.5")).unwrap();
        assert_eq!(window, TimeWindow::new(5.0, 20.5));
    }

    #[test]
    fn test_window_rejected() {
        assert!(resolve_window(&info(), Some("20"), Some("10")).is_err());
        assert!(resolve_window(&info(), None, Some("31")).is_err());
        assert!(resolve_window(&info(), Some("abc"), None).is_err());
    }
}

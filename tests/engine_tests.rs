//! End-to-end tests against a clip synthesised with the ffmpeg CLI
//!
//! Every test returns early when the ffmpeg tool or an H.264 encoder is missing.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use resizer_cli::config::{AppConfig, EncoderConfig};
use resizer_cli::decode::still::extract_mid_frame;
use resizer_cli::decode::FramePipeline;
use resizer_cli::probe::probe;
use resizer_cli::*;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

mod test_utils {
    use super::*;
    use std::process::Command;

    /// 10 s of 320x240 test pattern at 25 fps with a keyframe every second and
    /// a sine tone, or `None` when the clip cannot be produced
    pub fn sample_clip() -> Option<(TempDir, PathBuf)> {
        resizer_cli::init().ok()?;
        let dir = TempDir::new().ok()?;
        let path = dir.path().join("sample.mp4");

        let status = Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "lavfi",
                "-i",
                "testsrc=duration=10:size=320x240:rate=25",
                "-f",
                "lavfi",
                "-i",
                "sine=frequency=1000:duration=10",
                "-c:v",
                "libx264",
                "-g",
                "25",
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "aac",
                "-shortest",
                "-y",
            ])
            .arg(&path)
            .status()
            .ok()?;

        if !status.success() {
            eprintln!("skipping: ffmpeg could not synthesise the sample clip");
            return None;
        }
        Some((dir, path))
    }

    pub fn software_only() -> EncoderConfig {
        EncoderConfig {
            prefer_hardware: false,
            ..EncoderConfig::default()
        }
    }

    pub fn first_frame_ms(path: &Path) -> Option<i64> {
        let mut pipeline = FramePipeline::open(path).ok()?;
        pipeline.next_frame().ok()?.map(|f| f.position_ms)
    }

    pub fn has_audio(path: &Path) -> bool {
        ffmpeg_next::format::input(&path)
            .map(|ictx| {
                ictx.streams()
                    .any(|s| s.parameters().medium() == ffmpeg_next::media::Type::Audio)
            })
            .unwrap_or(false)
    }

    /// Presentation times in seconds of every audio packet in `path`
    pub fn audio_packet_seconds(path: &Path) -> Vec<f64> {
        let Ok(mut ictx) = ffmpeg_next::format::input(&path) else {
            return Vec::new();
        };
        let Some((index, time_base)) = ictx
            .streams()
            .find(|s| s.parameters().medium() == ffmpeg_next::media::Type::Audio)
            .map(|s| (s.index(), f64::from(s.time_base())))
        else {
            return Vec::new();
        };

        let mut seconds = Vec::new();
        let mut packet = ffmpeg_next::Packet::empty();
        while packet.read(&mut ictx).is_ok() {
            if packet.stream() == index {
                if let Some(pts) = packet.pts() {
                    seconds.push(pts as f64 * time_base);
                }
            }
        }
        seconds
    }

    /// Frames published within `window`, in order
    pub fn collect_frames(engine: &PlaybackEngine, window: Duration) -> Vec<i64> {
        let mut positions = Vec::new();
        let deadline = Instant::now() + window;
        while Instant::now() < deadline {
            if let Some(frame) = engine.wait_for_frame(deadline.saturating_duration_since(Instant::now())) {
                positions.push(frame.position_ms);
            }
        }
        positions
    }

    pub fn wait_for_phase(engine: &PlaybackEngine, phase: PlaybackPhase) -> bool {
        let deadline = Instant::now() + STEP_TIMEOUT;
        while engine.phase() != phase {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }

    pub fn expect_frame(engine: &PlaybackEngine) -> DecodedFrame {
        match engine.wait_for_frame(STEP_TIMEOUT) {
            Some(frame) => frame,
            None => panic!("no frame published; last error: {:?}", engine.last_error()),
        }
    }
}

use test_utils::*;

#[test]
fn test_probe_sample() {
    let Some((_dir, path)) = sample_clip() else { return };

    let info = probe(&path).unwrap();
    assert_eq!((info.width, info.height), (320, 240));
    assert!((info.frame_rate_hz - 25.0).abs() < 0.01);
    assert!((info.duration_seconds - 10.0).abs() < 0.2, "duration {}", info.duration_seconds);
    assert_eq!(info.frame_interval_ms(), 40);
}

#[test]
fn test_mid_frame() {
    let Some((_dir, path)) = sample_clip() else { return };

    let frame = extract_mid_frame(&path, 10.0).unwrap();
    assert_eq!((frame.width, frame.height), (320, 240));
    assert_eq!(frame.pixels.len(), 320 * 240 * 3);
    // One keyframe interval of slack
    assert!((frame.position_ms - 5000).abs() <= 1000, "position {}", frame.position_ms);
}

#[test]
fn test_transcode_window_rebased_to_zero() {
    let Some((dir, path)) = sample_clip() else { return };
    let output = dir.path().join("out.mp4");

    let job = TranscodeJob::new(&path, &output, 512 * 1024, ScaleFactor::Half, TimeWindow::new(2.0, 6.0));
    let report = TranscodeEngine::new(software_only()).transcode(&job).unwrap();

    assert_eq!((report.width, report.height), (160, 120));
    assert!(report.frames_encoded >= 95, "frames {}", report.frames_encoded);
    assert!(report.has_audio);
    assert!(output.exists());

    let info = probe(&output).unwrap();
    assert_eq!((info.width, info.height), (160, 120));
    assert!(info.duration_seconds <= 4.0 + 0.1, "duration {}", info.duration_seconds);
    assert!(info.duration_seconds >= 3.5, "duration {}", info.duration_seconds);
    assert_eq!(first_frame_ms(&output), Some(0));
    assert!(has_audio(&output));

    let audio = audio_packet_seconds(&output);
    assert!(!audio.is_empty());
    assert!(audio[0].abs() < 0.1, "first audio packet at {}s", audio[0]);
    assert!(audio.iter().all(|&t| t > -0.1 && t <= 4.0 + 0.05), "audio {:?}", audio);
}

#[test]
fn test_transcode_rejects_window_before_writing() {
    let Some((dir, path)) = sample_clip() else { return };
    let output = dir.path().join("never.mp4");

    let job = TranscodeJob::new(&path, &output, 1024 * 1024, ScaleFactor::Full, TimeWindow::new(4.0, 30.0));
    let result = TranscodeEngine::new(software_only()).transcode(&job);

    assert!(matches!(result, Err(ResizerError::InvalidWindow { .. })));
    assert!(!output.exists());
}

#[test]
fn test_seek_then_step_forward_and_back() {
    let Some((_dir, path)) = sample_clip() else { return };
    let mut engine = PlaybackEngine::new(&path, 25.0, Duration::from_secs(2));

    engine.seek(2000).unwrap();
    let start = expect_frame(&engine);
    assert_eq!(start.position_ms, 2000);
    assert_eq!(engine.phase(), PlaybackPhase::Paused);

    let mut last = start.position_ms;
    for _ in 0..3 {
        engine.step_forward().unwrap();
        let frame = expect_frame(&engine);
        assert!(frame.position_ms >= last + engine.frame_interval_ms());
        last = frame.position_ms;
    }
    assert_eq!(last, 2120);

    engine.step_backward().unwrap();
    let back = expect_frame(&engine);
    // Strictly before one interval back from 2120, and before the frame the
    // last forward step started from
    assert!(back.position_ms < 2080, "{}", back.position_ms);
    assert_eq!(back.position_ms, 2040);

    engine.shutdown();
    assert_eq!(engine.phase(), PlaybackPhase::Stopped);
}

#[test]
fn test_step_backward_across_keyframe() {
    let Some((_dir, path)) = sample_clip() else { return };
    let mut engine = PlaybackEngine::new(&path, 25.0, Duration::from_secs(2));

    // 3000 is a keyframe; the answer lives in the preceding GOP
    engine.seek(3000).unwrap();
    assert_eq!(expect_frame(&engine).position_ms, 3000);

    engine.step_backward().unwrap();
    assert_eq!(expect_frame(&engine).position_ms, 2920);
}

#[test]
fn test_step_backward_at_start_stays_at_first_frame() {
    let Some((_dir, path)) = sample_clip() else { return };
    let mut engine = PlaybackEngine::new(&path, 25.0, Duration::from_secs(2));

    engine.step_backward().unwrap();
    assert_eq!(expect_frame(&engine).position_ms, 0);
}

#[test]
fn test_play_after_step_backward_continues_with_next_frame() {
    let Some((_dir, path)) = sample_clip() else { return };
    let mut engine = PlaybackEngine::new(&path, 25.0, Duration::from_secs(2));

    engine.seek(2120).unwrap();
    assert_eq!(expect_frame(&engine).position_ms, 2120);
    engine.step_backward().unwrap();
    assert_eq!(expect_frame(&engine).position_ms, 2040);

    engine.play().unwrap();
    assert_eq!(expect_frame(&engine).position_ms, 2080);
    assert!(expect_frame(&engine).position_ms >= 2120);
}

#[test]
fn test_latest_seek_wins() {
    let Some((_dir, path)) = sample_clip() else { return };
    let mut engine = PlaybackEngine::new(&path, 25.0, Duration::from_secs(2));

    engine.seek(1000).unwrap();
    engine.seek(3000).unwrap();

    let deadline = Instant::now() + STEP_TIMEOUT;
    let mut seen = Vec::new();
    while seen.last() != Some(&3000) && Instant::now() < deadline {
        if let Some(frame) = engine.wait_for_frame(Duration::from_millis(100)) {
            seen.push(frame.position_ms);
        }
    }
    assert_eq!(seen.last(), Some(&3000), "frames {:?}", seen);
    // Nothing from the superseded request shows up afterwards
    assert!(engine.wait_for_frame(Duration::from_millis(300)).is_none());
    assert_eq!(engine.position_ms(), 3000);
    assert_eq!(engine.phase(), PlaybackPhase::Paused);
}

#[test]
fn test_seek_while_playing_keeps_playing_from_target() {
    let Some((_dir, path)) = sample_clip() else { return };
    let mut engine = PlaybackEngine::new(&path, 25.0, Duration::from_secs(2));

    engine.play().unwrap();
    let before = collect_frames(&engine, Duration::from_millis(200));
    assert!(!before.is_empty());

    engine.seek(6000).unwrap();
    let after = collect_frames(&engine, Duration::from_millis(500));
    // Drop frames that were already in flight when the seek landed
    let Some(first) = after.iter().position(|&ms| ms >= 6000) else {
        panic!("no frame at or after the seek target: {:?}", after);
    };
    let resumed = &after[first..];
    assert_eq!(resumed[0], 6000);
    assert!(resumed.len() >= 3, "frames {:?}", resumed);
    assert!(resumed.windows(2).all(|w| w[0] < w[1]), "frames {:?}", resumed);
    assert_eq!(engine.phase(), PlaybackPhase::Playing);
}

#[test]
fn test_play_after_end_restarts_from_start() {
    let Some((_dir, path)) = sample_clip() else { return };
    let mut engine = PlaybackEngine::new(&path, 25.0, Duration::from_secs(2));

    engine.seek(9800).unwrap();
    expect_frame(&engine);
    engine.play().unwrap();
    assert!(wait_for_phase(&engine, PlaybackPhase::Stopped));
    assert!(engine.position_ms() >= 9900, "stopped at {}", engine.position_ms());
    engine.poll_frame();

    engine.play().unwrap();
    let frame = expect_frame(&engine);
    assert!(frame.position_ms < 1000, "restarted at {}", frame.position_ms);
    assert_eq!(engine.phase(), PlaybackPhase::Playing);
}

#[test]
fn test_seek_at_end_of_stream_is_served() {
    let Some((_dir, path)) = sample_clip() else { return };
    let mut engine = PlaybackEngine::new(&path, 25.0, Duration::from_secs(2));

    engine.seek(9800).unwrap();
    expect_frame(&engine);
    engine.play().unwrap();

    // Issue the seek while the worker is running out of frames
    let deadline = Instant::now() + STEP_TIMEOUT;
    loop {
        let last = engine.wait_for_frame(Duration::from_millis(5));
        if last.is_some_and(|f| f.position_ms >= 9960) || engine.phase() == PlaybackPhase::Stopped {
            break;
        }
        assert!(Instant::now() < deadline, "playback never reached the end");
    }
    engine.seek(2000).unwrap();

    let deadline = Instant::now() + STEP_TIMEOUT;
    let mut seen = Vec::new();
    while !seen.iter().any(|&ms| (2000..3000).contains(&ms)) && Instant::now() < deadline {
        if let Some(frame) = engine.wait_for_frame(Duration::from_millis(100)) {
            seen.push(frame.position_ms);
        }
    }
    assert!(
        seen.iter().any(|&ms| (2000..3000).contains(&ms)),
        "seek lost at end of stream; frames {:?}, error {:?}",
        seen,
        engine.last_error()
    );
}

#[test]
fn test_play_publishes_increasing_positions_and_stops_quickly() {
    let Some((_dir, path)) = sample_clip() else { return };
    let mut engine = PlaybackEngine::new(&path, 25.0, Duration::from_secs(2));

    engine.play().unwrap();
    assert_eq!(engine.phase(), PlaybackPhase::Playing);

    let mut positions = Vec::new();
    let deadline = Instant::now() + Duration::from_millis(600);
    while Instant::now() < deadline {
        if let Some(frame) = engine.wait_for_frame(Duration::from_millis(100)) {
            positions.push(frame.position_ms);
        }
    }
    assert!(positions.len() >= 3, "positions {:?}", positions);
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "positions {:?}", positions);

    let started = Instant::now();
    engine.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(engine.phase(), PlaybackPhase::Stopped);
    assert!(engine.poll_frame().is_none());
}

#[test]
fn test_session_marks_drive_transcode() {
    let Some((dir, path)) = sample_clip() else { return };
    let mut config = AppConfig::default();
    config.encoder.prefer_hardware = false;
    config.output.suffix = "SMALL".to_string();

    let mut host = SessionHost::new(config);
    let session = host.on_drop(&path).unwrap();
    assert_eq!(session.info().width, 320);
    assert_eq!(session.preview().width, 320);

    host.on_seek(1000).unwrap();
    expect_frame(host.session().unwrap().playback());
    assert_eq!(host.on_mark_in().unwrap(), 1.0);

    host.on_seek(3000).unwrap();
    expect_frame(host.session().unwrap().playback());
    assert_eq!(host.on_mark_out().unwrap(), 3.0);

    let report = host.on_start_transcode(1.0, ScaleFactor::Quarter, None).unwrap();
    assert_eq!(report.output_path, dir.path().join("sample_SMALL.mp4"));
    assert_eq!((report.width, report.height), (80, 60));

    let info = probe(&report.output_path).unwrap();
    assert!(info.duration_seconds <= 2.1, "duration {}", info.duration_seconds);

    // A bad drop keeps the current session
    assert!(host.on_drop(dir.path().join("missing.mp4")).is_err());
    assert_eq!(host.session().unwrap().info().path, path);
    host.close();
    assert!(host.session().is_none());
}

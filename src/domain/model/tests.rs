// Unit tests for domain models

use super::*;

#[test]
fn test_scale_factor_dimensions() {
    assert_eq!(ScaleFactor::Full.output_dimensions(1920, 1080), (1920, 1080));
    assert_eq!(ScaleFactor::Half.output_dimensions(1920, 1080), (960, 540));
    assert_eq!(ScaleFactor::Quarter.output_dimensions(1920, 1080), (480, 270));
}

#[test]
fn test_scale_factor_parse() {
    assert_eq!("1".parse::<ScaleFactor>().unwrap(), ScaleFactor::Full);
    assert_eq!("half".parse::<ScaleFactor>().unwrap(), ScaleFactor::Half);
    assert_eq!("Quarter".parse::<ScaleFactor>().unwrap(), ScaleFactor::Quarter);
    assert_eq!(ScaleFactor::from_divisor(4).unwrap(), ScaleFactor::Quarter);
    assert!("3".parse::<ScaleFactor>().is_err());
    assert!(ScaleFactor::from_divisor(8).is_err());
}

#[test]
fn test_time_window_valid() {
    let window = TimeWindow::new(0.0, 20.0);
    assert!(window.validate(20.0).is_ok());
    assert_eq!(window.duration_seconds(), 20.0);

    let inner = TimeWindow::new(2.5, 7.5);
    assert!(inner.validate(10.0).is_ok());
    assert!(inner.contains(2.5));
    assert!(inner.contains(7.5));
    assert!(!inner.contains(7.6));
}

#[test]
fn test_time_window_rejections() {
    // end <= start
    assert!(TimeWindow::new(5.0, 5.0).validate(10.0).is_err());
    assert!(TimeWindow::new(6.0, 5.0).validate(10.0).is_err());
    // end > duration
    assert!(TimeWindow::new(0.0, 10.5).validate(10.0).is_err());
    // start < 0
    assert!(TimeWindow::new(-1.0, 5.0).validate(10.0).is_err());
    // unknown duration
    assert!(TimeWindow::new(0.0, 1.0).validate(0.0).is_err());

    match TimeWindow::new(-1.0, 5.0).validate(10.0) {
        Err(ResizerError::InvalidWindow { start, end, duration }) => {
            assert_eq!(start, -1.0);
            assert_eq!(end, 5.0);
            assert_eq!(duration, 10.0);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_frame_interval() {
    assert_eq!(frame_interval_ms(30.0), 33);
    assert_eq!(frame_interval_ms(25.0), 40);
    assert_eq!(frame_interval_ms(23.976), 41);
    assert_eq!(frame_interval_ms(60.0), 16);
    assert_eq!(frame_interval_ms(5000.0), 1);
    assert_eq!(frame_interval_ms(0.0), 33);
    assert_eq!(frame_interval_ms(f64::NAN), 33);
}

#[test]
fn test_megabytes_to_bytes() {
    assert_eq!(TranscodeJob::megabytes_to_bytes(10.0).unwrap(), 10 * 1024 * 1024);
    assert_eq!(TranscodeJob::megabytes_to_bytes(0.5).unwrap(), 512 * 1024);
    assert!(TranscodeJob::megabytes_to_bytes(0.0).is_err());
    assert!(TranscodeJob::megabytes_to_bytes(-3.0).is_err());
    assert!(TranscodeJob::megabytes_to_bytes(f64::INFINITY).is_err());
}

#[test]
fn test_timebase_creation() {
    let timebase = Timebase::new(1, 30).unwrap();
    assert_eq!(timebase.num, 1);
    assert_eq!(timebase.den, 30);
    assert_eq!(timebase.to_seconds(), 1.0 / 30.0);
    assert!(Timebase::new(1, 0).is_err());
}

#[test]
fn test_timebase_pts_conversion() {
    let timebase = Timebase::new(1, 90000).unwrap();
    assert_eq!(timebase.pts_to_seconds(180000), 2.0);
    assert_eq!(timebase.seconds_to_pts(2.0), 180000);
    assert_eq!(timebase.pts_to_millis(3003), 33);
    assert_eq!(timebase.pts_to_millis(-1), -1);
}

#[test]
fn test_timebase_rescale() {
    let stream = Timebase::new(1, 90000).unwrap();
    let encoder = Timebase::new(1001, 30000).unwrap();
    // one NTSC frame
    assert_eq!(stream.rescale_pts(3003, &encoder), 1);
    assert_eq!(stream.rescale_pts(30030, &encoder), 10);
    assert_eq!(encoder.rescale_pts(10, &stream), 30030);
    assert_eq!(stream.rescale_pts(-3003, &encoder), -1);
    assert_eq!(stream.rescale_pts(42, &stream), 42);
}

#[test]
fn test_source_info_helpers() {
    let info = SourceInfo {
        path: PathBuf::from("/videos/holiday.mp4"),
        duration_seconds: 12.5,
        width: 1280,
        height: 720,
        frame_rate_hz: 25.0,
    };
    assert_eq!(info.frame_interval_ms(), 40);
    assert_eq!(info.full_window(), TimeWindow::new(0.0, 12.5));
    assert_eq!(info.summary(), "holiday.mp4 (1280x720, 12.500s @ 25.000 fps)");
}

#[test]
fn test_decoded_frame_debug_omits_pixels() {
    let frame = DecodedFrame {
        pixels: vec![0; 4 * 2 * 3],
        width: 4,
        height: 2,
        position_ms: 120,
    };
    assert_eq!(frame.row_bytes(), 12);
    let debug = format!("{:?}", frame);
    assert!(debug.contains("bytes: 24"));
    assert!(!debug.contains("pixels"));
}

//! End-to-end analysis of synthetic tracks
//!
//! Tracks are written with hound, so the parser sees the same header layout a
//! real encoder produces.

use std::time::Duration;
use tokio::sync::mpsc;
use tracklens_analysis::{
    analyze, AnalysisConfig, AnalysisError, AnalysisReport, Band, CancellationToken, FormatError,
    RmsProgress, TrackAnalyzer,
};

use test_helpers::{init_tracing, tone_burst_wav, write_wav};

const RATE: u32 = 44100;

/// 12 s track, 1 kHz at half amplitude from 5 s to 10 s
fn reference_track() -> Vec<u8> {
    tone_burst_wav(RATE, 12.0, 5.0..10.0, 1000.0, 0.5)
}

#[tokio::test]
async fn test_reference_track_report() {
    init_tracing();

    let mut config = AnalysisConfig::default();
    config.spectrum.enabled = true;

    let report = analyze(&reference_track(), config, None, &CancellationToken::new())
        .await
        .expect("Analysis failed");

    // Segment overlaps the tone
    let segment = report.the_loudest_segment;
    assert!(segment.start < 10.0 && segment.end > 5.0, "{:?}", segment);
    assert!((segment.end - segment.start - 10.0).abs() < 1e-6);
    assert!((report.duration_seconds - 12.0).abs() < 0.01);

    // 1 kHz lives in the low-mid band
    let low_mid = report.rms.low_mid.interval.percentile_high;
    let bass = report.rms.bass.interval.percentile_high;
    let high_mid = report.rms.high_mid.interval.percentile_high;
    assert!(low_mid > bass + 6.0, "low-mid {} vs bass {}", low_mid, bass);
    assert!(
        low_mid > high_mid + 6.0,
        "low-mid {} vs high-mid {}",
        low_mid,
        high_mid
    );

    // Unfiltered level of a half-amplitude sine: 20·log10(0.5/√2)
    assert!((report.rms.all.interval.percentile_high + 9.03).abs() < 0.1);
    assert!(report.rms.all.interval.percentile_low <= report.rms.all.interval.percentile_high);

    // Silent windows come back as -inf after a JSON round trip
    assert!(report
        .rms
        .all
        .interval
        .raw_series
        .contains(&f64::NEG_INFINITY));
    let json = serde_json::to_string(&report).unwrap();
    let restored: AnalysisReport = serde_json::from_str(&json).expect("Report did not parse back");
    assert_eq!(restored.rms, report.rms);
    assert_eq!(restored.spectrum.is_some(), report.spectrum.is_some());

    // Frames fully inside the tone peak within one bin of 1 kHz
    let spectrum = report.spectrum.expect("Spectrum enabled");
    let resolution = spectrum.nyquist_frequency / spectrum.bin_count as f64;
    let hop = 441;
    let burst_start = ((5.0 - segment.start) * f64::from(RATE)).max(0.0) as usize;
    let burst_end = ((10.0 - segment.start) * f64::from(RATE)) as usize;

    let mut checked = 0;
    for (i, frame) in spectrum.frames.iter().enumerate() {
        let offset = i * hop;
        if offset < burst_start || offset + 1024 > burst_end {
            continue;
        }
        let (bin, _) = frame
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        let frequency = spectrum.bin_frequency(bin);
        assert!(
            (frequency - 1000.0).abs() <= resolution,
            "frame {} peaks at {} Hz",
            i,
            frequency
        );
        checked += 1;
    }
    assert!(checked > 100, "only {} frames inside the tone", checked);
}

#[tokio::test]
async fn test_report_serializes_to_camel_case_json() {
    let config = AnalysisConfig {
        segment_seconds: 1.0,
        ..AnalysisConfig::default()
    };
    let bytes = tone_burst_wav(RATE, 3.0, 1.0..2.0, 1000.0, 0.5);

    let report = analyze(&bytes, config, None, &CancellationToken::new())
        .await
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert!(json.get("theLoudestSegment").is_some());
    assert!(json.get("durationSeconds").is_some());
    assert!(json.get("timeToProcessMs").is_some());
    assert_eq!(json["rms"]["lowMid"]["range"]["from"], "100");
    assert_eq!(json["rms"]["lowMid"]["range"]["to"], "2000");
    assert!(json["rms"]["highMid"]["interval"]["percentileHigh"].is_number());
    assert!(json["spectrum"].is_null());
}

#[tokio::test]
async fn test_progress_reaches_completion_for_every_band() {
    init_tracing();

    let mut config = AnalysisConfig {
        segment_seconds: 1.0,
        ..AnalysisConfig::default()
    };
    config.rms.batch_size = 4;

    let bytes = tone_burst_wav(RATE, 3.0, 1.0..2.0, 1000.0, 0.5);
    let (tx, mut rx) = mpsc::channel::<RmsProgress>(8);

    let handle = tokio::spawn(async move {
        analyze(&bytes, config, Some(tx), &CancellationToken::new()).await
    });

    let mut last = std::collections::HashMap::new();
    while let Some(update) = rx.recv().await {
        let previous = last.insert(update.band, update.progress).unwrap_or(0.0);
        assert!(update.progress > previous, "progress went backwards");
    }

    handle.await.unwrap().expect("Analysis failed");

    for band in Band::ALL {
        assert_eq!(last.get(&band).copied(), Some(1.0), "band {}", band);
    }
}

#[tokio::test]
async fn test_cancel_during_rms() {
    let mut config = AnalysisConfig {
        segment_seconds: 1.0,
        ..AnalysisConfig::default()
    };
    config.rms.batch_size = 1;

    let bytes = tone_burst_wav(RATE, 3.0, 1.0..2.0, 1000.0, 0.5);
    let (tx, mut rx) = mpsc::channel::<RmsProgress>(1);
    let cancel = CancellationToken::new();

    let run = cancel.clone();
    let handle = tokio::spawn(async move { analyze(&bytes, config, Some(tx), &run).await });

    rx.recv().await.expect("No progress before cancel");
    cancel.cancel();
    while rx.recv().await.is_some() {}

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(AnalysisError::Cancelled)));
}

#[tokio::test]
async fn test_dropped_analysis_stops_band_tasks() {
    let mut config = AnalysisConfig {
        segment_seconds: 1.0,
        ..AnalysisConfig::default()
    };
    config.rms.batch_size = 1;

    let bytes = tone_burst_wav(RATE, 3.0, 1.0..2.0, 1000.0, 0.5);
    let (tx, mut rx) = mpsc::channel::<RmsProgress>(1);

    // Nobody drains the channel, so the bands block and the deadline wins
    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        analyze(&bytes, config, Some(tx), &CancellationToken::new()),
    )
    .await;
    assert!(outcome.is_err(), "analysis finished with a full channel");

    // One buffered update plus at most one pending send per band
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        count
    })
    .await
    .expect("band tasks kept running after the analysis was dropped");
    assert!(drained <= 1 + Band::ALL.len(), "{} updates after drop", drained);
}

#[test]
fn test_staged_api_on_hound_file() {
    init_tracing();

    let config = AnalysisConfig {
        segment_seconds: 2.0,
        ..AnalysisConfig::default()
    };
    let bytes = tone_burst_wav(48000, 6.0, 3.0..5.0, 500.0, 0.25);
    let mut analyzer = TrackAnalyzer::new(config).unwrap();

    let header = analyzer.parse(&bytes).unwrap();
    assert_eq!(header.sample_rate.hz(), 48000);
    assert_eq!(header.byte_rate, 192000);

    let segment = analyzer.locate_segment().unwrap();
    let seconds = segment.to_seconds(48000);
    assert!((seconds.start - 3.0).abs() < 0.01, "{:?}", seconds);
    assert_eq!(segment.len(), 96000);

    assert_eq!(analyzer.extract_segment().unwrap().len(), 96000);

    // 500 Hz sits in low-mid as well
    let low_mid = analyzer.rms_for_band(Band::LowMid).unwrap();
    let high = analyzer.rms_for_band(Band::High).unwrap();
    assert!(low_mid.interval.percentile_high > high.interval.percentile_high + 6.0);
}

#[test]
fn test_rejects_mono_file() {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(std::io::Cursor::new(&mut bytes), spec).unwrap();
        for i in 0..1000 {
            writer.write_sample((i % 100) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    let mut analyzer = TrackAnalyzer::new(AnalysisConfig::default()).unwrap();
    assert!(matches!(
        analyzer.parse(&bytes),
        Err(AnalysisError::Format(FormatError::UnsupportedChannelCount(1)))
    ));
}

#[test]
fn test_rejects_unsupported_rate() {
    let bytes = write_wav(22050, &[(0, 0); 100]);
    let mut analyzer = TrackAnalyzer::new(AnalysisConfig::default()).unwrap();
    assert!(matches!(
        analyzer.parse(&bytes),
        Err(AnalysisError::Format(FormatError::UnsupportedSampleRate(
            22050
        )))
    ));
}

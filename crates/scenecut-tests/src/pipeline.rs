//! End-to-end detection scenarios.
//!
//! Exercises scenecut-media sources through the scene manager and every
//! detector kind in scenecut-detect.

use crate::support::{
    cut_frames, fade_source, hard_cut_source, manager_with, scene_frames, FailingSource,
};
use scenecut_core::{FrameBuffer, FrameRate, PixelFormat, ScenecutError, Timecode};
use scenecut_detect::{
    AdaptiveContentConfig, ContentConfig, CutKind, DetectError, DetectorConfig, DissolveConfig,
    EdgeConfig, FadeBias, FramePosition, ManagerState, SceneManager, SceneManagerConfig,
    ThresholdConfig,
};
use scenecut_media::SyntheticSource;

fn content() -> DetectorConfig {
    DetectorConfig::Content(ContentConfig::default())
}

fn threshold(fade_bias: FadeBias) -> DetectorConfig {
    DetectorConfig::Threshold(ThresholdConfig {
        fade_bias,
        ..Default::default()
    })
}

// ── Hard cuts ──────────────────────────────────────────────────

#[test]
fn hard_luma_cut_splits_video_in_two() {
    let mut manager = manager_with(vec![content()]);
    let stats = manager
        .detect_scenes(&mut hard_cut_source(40, 100), 0u64, None)
        .unwrap();

    assert_eq!(stats.frames_processed, 100);
    assert_eq!(stats.cuts_found, 1);
    assert_eq!(cut_frames(&manager), vec![40]);
    assert_eq!(
        scene_frames(&manager.get_scene_list(15, false).unwrap()),
        vec![(0, 40), (40, 100)]
    );
}

#[test]
fn cut_list_is_expressed_at_stream_rate() {
    let mut manager = manager_with(vec![content()]);
    manager
        .detect_scenes(&mut hard_cut_source(40, 100), 0u64, None)
        .unwrap();
    let cuts = manager.cut_list().unwrap();
    assert_eq!(cuts.len(), 1);
    assert_eq!(cuts[0].frame_rate(), FrameRate::FPS_25);
    assert_eq!(cuts[0].seconds(), 1.6);
}

#[test]
fn short_first_scene_is_merged_when_dropping() {
    let mut manager = manager_with(vec![content()]);
    manager
        .detect_scenes(&mut hard_cut_source(10, 100), 0u64, None)
        .unwrap();

    assert_eq!(
        scene_frames(&manager.get_scene_list(50, true).unwrap()),
        vec![(0, 100)]
    );
    assert_eq!(
        scene_frames(&manager.get_scene_list(50, false).unwrap()),
        vec![(0, 10), (10, 100)]
    );
}

#[test]
fn video_shorter_than_min_scene_is_one_scene() {
    let mut manager = manager_with(vec![content()]);
    manager
        .detect_scenes(&mut hard_cut_source(5, 12), 0u64, None)
        .unwrap();
    assert_eq!(
        scene_frames(&manager.get_scene_list(15, true).unwrap()),
        vec![(0, 12)]
    );
}

#[test]
fn detectors_agreeing_on_a_frame_collapse_to_one_cut() {
    let mut manager = manager_with(vec![content(), threshold(FadeBias::Mid)]);
    let stats = manager
        .detect_scenes(&mut hard_cut_source(40, 100), 0u64, None)
        .unwrap();
    assert_eq!(stats.cuts_found, 1);
    let events: Vec<_> = manager.cut_events().collect();
    assert_eq!(events[0].frame, 40);
    assert_eq!(events[0].kind, CutKind::HardCut);
}

// ── Fades ──────────────────────────────────────────────────────

#[test]
fn fade_bias_places_the_cut_inside_the_fade() {
    for (bias, expected) in [(FadeBias::In, 100), (FadeBias::Mid, 110), (FadeBias::Out, 120)] {
        let mut manager = manager_with(vec![threshold(bias)]);
        manager
            .detect_scenes(&mut fade_source(100..120, 200), 0u64, None)
            .unwrap();
        assert_eq!(cut_frames(&manager), vec![expected], "bias {bias}");
        assert_eq!(
            scene_frames(&manager.get_scene_list(15, false).unwrap()),
            vec![(0, expected), (expected, 200)]
        );
    }
}

#[test]
fn content_detector_ignores_slow_fade() {
    let mut manager = manager_with(vec![content()]);
    let mut source = SyntheticSource::new(25.0, (32, 32), Some(120), |f| {
        FrameBuffer::gray(32, 32, (f * 2) as u8)
    });
    let stats = manager.detect_scenes(&mut source, 0u64, None).unwrap();
    assert_eq!(stats.cuts_found, 0);
    assert_eq!(
        scene_frames(&manager.get_scene_list(15, false).unwrap()),
        vec![(0, 120)]
    );
}

#[test]
fn final_fade_out_adds_a_scene() {
    let mut manager = manager_with(vec![DetectorConfig::Threshold(ThresholdConfig {
        add_final_scene: true,
        ..Default::default()
    })]);
    manager
        .detect_scenes(&mut fade_source(80..100, 100), 0u64, None)
        .unwrap();
    let events: Vec<_> = manager.cut_events().collect();
    assert_eq!(events.len(), 1);
    assert_eq!((events[0].frame, events[0].kind), (80, CutKind::FadeOut));
}

// ── Other detectors ────────────────────────────────────────────

#[test]
fn edge_detector_finds_structural_cut() {
    let stripes = |vertical: bool| {
        let mut frame = FrameBuffer::new(64, 64, PixelFormat::Gray8);
        for y in 0..64u32 {
            for (x, px) in frame.row_mut(y).iter_mut().enumerate() {
                let band = if vertical { x / 16 } else { y as usize / 16 };
                *px = if band % 2 == 0 { 0 } else { 255 };
            }
        }
        frame
    };
    let mut source = SyntheticSource::new(25.0, (64, 64), Some(60), move |f| stripes(f < 30));
    let mut manager = manager_with(vec![DetectorConfig::Edge(EdgeConfig::default())]);
    manager.detect_scenes(&mut source, 0u64, None).unwrap();
    assert_eq!(cut_frames(&manager), vec![30]);
}

#[test]
fn dissolve_detector_reports_one_cut_per_dissolve() {
    let mut source = SyntheticSource::new(25.0, (16, 16), Some(80), |f| {
        let level = match f {
            0..=19 => 50,
            20..=39 => (50 + (f - 20) * 7) as u8,
            _ => 200,
        };
        FrameBuffer::gray(16, 16, level)
    });
    let mut manager = manager_with(vec![
        content(),
        DetectorConfig::Dissolve(DissolveConfig::default()),
    ]);
    manager.detect_scenes(&mut source, 0u64, None).unwrap();
    let events: Vec<_> = manager.cut_events().collect();
    assert_eq!(events.len(), 1);
    assert_eq!((events[0].frame, events[0].kind), (31, CutKind::Dissolve));
}

#[test]
fn adaptive_content_detector_decides_after_the_stream() {
    let mut manager = manager_with(vec![
        DetectorConfig::AdaptiveContent(AdaptiveContentConfig::default()),
        content(),
    ]);
    let stats = manager
        .detect_scenes(&mut hard_cut_source(40, 100), 30u64, None)
        .unwrap();
    assert_eq!(stats.cuts_found, 1);
    assert_eq!(
        scene_frames(&manager.get_scene_list(15, false).unwrap()),
        vec![(30, 40), (40, 100)]
    );
    assert_eq!(manager.metric_cache().get(40, "adaptive_content_val"), Some(50.0));
}

// ── Ranges & seeking ───────────────────────────────────────────

#[test]
fn start_given_as_timecode_at_another_rate() {
    let mut manager = manager_with(vec![content()]);
    let one_second = Timecode::from_frames(50, FrameRate::FPS_50);
    let stats = manager
        .detect_scenes(&mut hard_cut_source(40, 100), one_second, None)
        .unwrap();

    assert_eq!(stats.frames_processed, 75);
    assert_eq!(cut_frames(&manager), vec![40]);
    assert_eq!(
        scene_frames(&manager.get_scene_list(15, false).unwrap()),
        vec![(25, 40), (40, 100)]
    );
}

#[test]
fn end_given_as_timecode_is_exclusive() {
    let mut manager = manager_with(vec![content()]);
    let end = Timecode::from_seconds(2.0, FrameRate::FPS_25).unwrap();
    let stats = manager
        .detect_scenes(&mut hard_cut_source(40, 100), 0u64, Some(FramePosition::from(end)))
        .unwrap();
    assert_eq!(stats.frames_processed, 50);
    assert_eq!(
        scene_frames(&manager.get_scene_list(15, false).unwrap()),
        vec![(0, 40), (40, 50)]
    );
}

#[test]
fn non_seekable_source_must_start_at_its_cursor() {
    let mut manager = manager_with(vec![content()]);
    let mut source = hard_cut_source(40, 100).non_seekable();
    let err = manager.detect_scenes(&mut source, 10u64, None).unwrap_err();
    assert!(matches!(err, DetectError::Core(ScenecutError::Seek(_))));
    assert_eq!(manager.state(), ManagerState::Idle);

    let stats = manager.detect_scenes(&mut source, 0u64, None).unwrap();
    assert_eq!(stats.frames_processed, 100);
}

// ── Lifecycle & failures ───────────────────────────────────────

#[test]
fn cancelled_run_finalizes_with_frames_seen() {
    let mut manager = manager_with(vec![content()]);
    let handle = manager.cancel_handle();
    let mut fired = false;
    let mut source = SyntheticSource::new(25.0, (32, 18), None, move |f| {
        if f == 30 && !fired {
            fired = true;
            handle.cancel();
        }
        FrameBuffer::gray(32, 18, 80)
    });

    let stats = manager.detect_scenes(&mut source, 0u64, None).unwrap();
    assert_eq!(stats.frames_processed, 31);
    assert_eq!(manager.state(), ManagerState::Finalized);
    assert!(!manager.cancel_handle().is_cancelled());
    assert_eq!(
        scene_frames(&manager.get_scene_list(15, false).unwrap()),
        vec![(0, 31)]
    );
}

#[test]
fn read_error_resets_the_manager() {
    let mut manager = manager_with(vec![content()]);
    let mut source = FailingSource {
        inner: hard_cut_source(10, 100),
        fail_at: 60,
    };
    let err = manager.detect_scenes(&mut source, 0u64, None).unwrap_err();
    assert!(matches!(err, DetectError::Core(ScenecutError::Decoder(_))));
    assert_eq!(manager.state(), ManagerState::Idle);
    assert_eq!(manager.cut_events().count(), 0);
    assert!(matches!(
        manager.get_scene_list(15, false),
        Err(DetectError::NotReady(_))
    ));
}

#[test]
fn colliding_detectors_are_rejected_up_front() {
    let err = SceneManager::new(SceneManagerConfig {
        detectors: vec![content(), content()],
        ..Default::default()
    })
    .err()
    .unwrap();
    assert!(matches!(err, DetectError::DetectorCollision { .. }));
}

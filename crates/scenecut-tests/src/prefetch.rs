//! Overlapped decoding through the prefetch queue.

use crate::support::{cut_frames, init_tracing, scene_frames, FailingSource};
use scenecut_core::{FrameBuffer, ScenecutError};
use scenecut_detect::{
    ContentConfig, DetectError, DetectorConfig, DissolveConfig, ManagerState, SceneManager,
    SceneManagerConfig, ThresholdConfig,
};
use scenecut_media::{PrefetchConfig, SyntheticSource};

/// Black frames over 60..75, a hard cut at 120 and a dissolve over
/// 160..181.
fn busy_source(count: Option<u64>) -> SyntheticSource {
    SyntheticSource::new(25.0, (48, 27), count, |f| {
        let level = match f {
            60..=74 => 0,
            0..=119 => 60,
            120..=159 => 180,
            160..=179 => (180 - (f - 159) * 7) as u8,
            _ => 30,
        };
        FrameBuffer::gray(48, 27, level)
    })
}

fn manager(prefetch: Option<PrefetchConfig>) -> SceneManager {
    init_tracing();
    SceneManager::new(SceneManagerConfig {
        prefetch,
        detectors: vec![
            DetectorConfig::Content(ContentConfig::default()),
            DetectorConfig::Threshold(ThresholdConfig::default()),
            DetectorConfig::Dissolve(DissolveConfig::default()),
        ],
        ..Default::default()
    })
    .unwrap()
}

fn tiny_queue() -> Option<PrefetchConfig> {
    Some(PrefetchConfig {
        max_frames: 2,
        ..Default::default()
    })
}

#[test]
fn prefetch_matches_inline_reads() {
    let mut inline = manager(None);
    let inline_stats = inline
        .detect_scenes(&mut busy_source(Some(240)), 0u64, None)
        .unwrap();

    for prefetch in [Some(PrefetchConfig::default()), tiny_queue()] {
        let mut overlapped = manager(prefetch);
        let stats = overlapped
            .detect_scenes(&mut busy_source(Some(240)), 0u64, None)
            .unwrap();
        assert_eq!(stats, inline_stats);
        assert_eq!(
            overlapped.cut_events().collect::<Vec<_>>(),
            inline.cut_events().collect::<Vec<_>>()
        );
        assert_eq!(
            overlapped.get_scene_list(15, true).unwrap(),
            inline.get_scene_list(15, true).unwrap()
        );
    }
    assert_eq!(cut_frames(&inline), vec![68, 120, 171]);
}

#[test]
fn end_bound_stops_endless_source() {
    let mut manager = manager(tiny_queue());
    let stats = manager
        .detect_scenes(&mut busy_source(None), 0u64, Some(140u64.into()))
        .unwrap();
    assert_eq!(stats.frames_processed, 140);
    assert_eq!(
        scene_frames(&manager.get_scene_list(15, false).unwrap()),
        vec![(0, 68), (68, 120), (120, 140)]
    );
}

#[test]
fn cancel_stops_the_producer() {
    let mut manager = manager(tiny_queue());
    let handle = manager.cancel_handle();
    let mut source = SyntheticSource::new(25.0, (16, 16), None, move |f| {
        if f == 50 {
            handle.cancel();
        }
        FrameBuffer::gray(16, 16, 60)
    });
    let stats = manager.detect_scenes(&mut source, 0u64, None).unwrap();
    assert!(stats.frames_processed <= 51);
    assert_eq!(manager.state(), ManagerState::Finalized);
}

#[test]
fn read_error_arrives_after_queued_frames() {
    let mut manager = manager(tiny_queue());
    let mut source = FailingSource {
        inner: busy_source(Some(240)),
        fail_at: 130,
    };
    let err = manager.detect_scenes(&mut source, 0u64, None).unwrap_err();
    assert!(matches!(err, DetectError::Core(ScenecutError::Decoder(_))));
    assert_eq!(manager.state(), ManagerState::Idle);

    // The source can be rewound and analysed again.
    source.fail_at = u64::MAX;
    manager.detect_scenes(&mut source, 0u64, None).unwrap();
    assert_eq!(cut_frames(&manager), vec![68, 120, 171]);
}

//! Metric cache persistence across scene manager sessions.

use crate::support::{cut_frames, hard_cut_source, init_tracing, scene_frames};
use scenecut_core::FrameBuffer;
use scenecut_detect::{DetectError, SceneManager, SceneManagerConfig};
use scenecut_media::SyntheticSource;
use std::fs;
use tempfile::TempDir;

fn cached_manager(dir: &TempDir) -> Result<SceneManager, DetectError> {
    init_tracing();
    SceneManager::new(SceneManagerConfig::default())?.with_cache_path(dir.path().join("metrics.csv"))
}

/// Same geometry as `hard_cut_source`, but every frame is black.
fn blank_source(count: u64) -> SyntheticSource {
    SyntheticSource::new(25.0, (64, 36), Some(count), |_| FrameBuffer::gray(64, 36, 0))
}

#[test]
fn run_writes_cache_file() {
    let dir = TempDir::new().unwrap();
    let mut manager = cached_manager(&dir).unwrap();
    manager
        .detect_scenes(&mut hard_cut_source(40, 100), 0u64, None)
        .unwrap();

    let text = fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("Scenecut Metrics,1,Frame Rate:,25.0000000000"));
    assert_eq!(
        lines.next(),
        Some("Frame Number,content_val,delta_hue,delta_sat,delta_lum")
    );
    // Frame 0 has no predecessor, so rows start at frame 1.
    assert_eq!(lines.next(), Some("1,0,0,0,0"));
    assert!(lines.any(|line| line == "40,50,0,0,150"));
    assert!(!manager.metric_cache().is_save_required());
}

#[test]
fn second_session_reuses_cached_metrics() {
    let dir = TempDir::new().unwrap();
    let mut first = cached_manager(&dir).unwrap();
    first
        .detect_scenes(&mut hard_cut_source(40, 100), 0u64, None)
        .unwrap();

    let mut second = cached_manager(&dir).unwrap();
    assert_eq!(second.metric_cache().frame_count(), 99);
    // The cached deltas decide the cuts; the black frames are never compared.
    second.detect_scenes(&mut blank_source(100), 0u64, None).unwrap();
    assert_eq!(cut_frames(&second), vec![40]);
    assert_eq!(
        scene_frames(&second.get_scene_list(15, false).unwrap()),
        vec![(0, 40), (40, 100)]
    );
    assert!(!second.save_cache().unwrap());
}

#[test]
fn interrupted_run_resumes_from_partial_cache() {
    let dir = TempDir::new().unwrap();
    let mut first = cached_manager(&dir).unwrap();
    first
        .detect_scenes(&mut hard_cut_source(70, 100), 0u64, Some(50u64.into()))
        .unwrap();
    assert_eq!(first.metric_cache().frame_count(), 49);

    let mut second = cached_manager(&dir).unwrap();
    second
        .detect_scenes(&mut hard_cut_source(70, 100), 0u64, None)
        .unwrap();
    assert_eq!(cut_frames(&second), vec![70]);
    assert_eq!(second.metric_cache().frame_count(), 99);
    assert_eq!(second.metric_cache().get(70, "content_val"), Some(50.0));
}

#[test]
fn corrupt_cache_is_reported_and_can_be_discarded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.csv");
    fs::write(
        &path,
        "Scenecut Metrics,1,Frame Rate:,25.0000000000\n\
         Frame Number,content_val,delta_hue,delta_sat,delta_lum\n\
         1,0,0,0\n",
    )
    .unwrap();

    let err = cached_manager(&dir).err().unwrap();
    assert!(matches!(err, DetectError::CacheCorrupt { line: 3, .. }));

    fs::remove_file(&path).unwrap();
    let mut manager = cached_manager(&dir).unwrap();
    manager
        .detect_scenes(&mut hard_cut_source(40, 100), 0u64, None)
        .unwrap();
    assert_eq!(cut_frames(&manager), vec![40]);
    assert!(path.exists());
}

#[test]
fn cache_from_another_frame_rate_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut first = cached_manager(&dir).unwrap();
    first
        .detect_scenes(&mut hard_cut_source(40, 100), 0u64, None)
        .unwrap();

    let mut second = cached_manager(&dir).unwrap();
    let mut source =
        SyntheticSource::new(30.0, (64, 36), Some(100), |_| FrameBuffer::gray(64, 36, 0));
    let err = second.detect_scenes(&mut source, 0u64, None).unwrap_err();
    match err {
        DetectError::CacheFrameRateMismatch { expected, found } => {
            assert_eq!(expected, 30.0);
            assert_eq!(found, 25.0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#![cfg(feature = "mock-audio")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use audio_backend::{create_audio_backend, is_mock_backend_enabled, AudioBackend};

#[test]
fn mock_backend_is_selected_under_the_feature() {
    assert!(is_mock_backend_enabled());
}

#[test]
fn create_audio_backend_reports_device_info() {
    let backend = create_audio_backend().expect("mock backend always opens");
    assert_eq!(backend.channels(), 2);
    assert!(backend.sample_rate() > 0);
}

#[test]
fn start_then_stop_toggles_render_callback() {
    let mut backend = create_audio_backend().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_for_cb = calls.clone();
    backend
        .start(Arc::new(move |out: &mut [i16], _sr, _frames| {
            calls_for_cb.fetch_add(1, Ordering::Relaxed);
            out.fill(1);
        }))
        .unwrap();
    assert_eq!(backend.frames_since_start(), 0);
    backend.stop().unwrap();
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::DeviceInfoProvider;
use crate::{AudioBackend, BackendError, DeviceInfo, DiagnosticsCb, RenderFn};

/// A backend that never touches hardware: `start`/`stop` just stash or
/// clear the render function. Tests call [`MockAudioBackend::render`]
/// directly to drive the callback on their own schedule.
pub struct MockAudioBackend {
    info: DeviceInfo,
    render: Mutex<Option<RenderFn>>,
    frames: AtomicU64,
    diagnostics: Option<DiagnosticsCb>,
}

impl MockAudioBackend {
    pub fn new() -> Self {
        Self {
            info: DeviceInfo {
                sample_rate: 48_000,
                buffer_size: 256,
                channels: 2,
                device_name: Some("mock-device".to_string()),
            },
            render: Mutex::new(None),
            frames: AtomicU64::new(0),
            diagnostics: None,
        }
    }

    /// Drive the stored render function as if the device thread had
    /// woken up, writing `frames` stereo frames into `out`.
    pub fn render(&self, out: &mut [i16], frames: usize) {
        if let Some(render) = self.render.lock().unwrap().as_ref() {
            render(out, self.info.sample_rate, frames);
        } else {
            out.fill(0);
        }
        self.frames.fetch_add(frames as u64, Ordering::Relaxed);
    }
}

impl Default for MockAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for MockAudioBackend {
    fn start(&mut self, render: RenderFn) -> Result<(), BackendError> {
        *self.render.lock().unwrap() = Some(render);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        *self.render.lock().unwrap() = None;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    fn buffer_size(&self) -> usize {
        self.info.buffer_size
    }

    fn channels(&self) -> u16 {
        self.info.channels
    }

    fn frames_since_start(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn set_diagnostics_callback(&mut self, cb: Option<DiagnosticsCb>) {
        self.diagnostics = cb;
    }

    fn as_device_info_provider(&self) -> Option<&dyn DeviceInfoProvider> {
        Some(self)
    }
}

impl DeviceInfoProvider for MockAudioBackend {
    fn get_device_name(&self) -> Option<&str> {
        self.info.device_name.as_deref()
    }
}

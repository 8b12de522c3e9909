//! Device-callback adapter (§4.J): wraps a platform audio device and
//! calls into a [`RenderFn`] on its real-time thread to fill 16-bit PCM
//! buffers.
//!
//! The trait composition here mirrors the mixing engine's own design:
//! one small `AudioBackend` contract, a worker-thread-backed `cpal`
//! implementation for real devices, and a `mock-audio` feature swapping
//! in a backend that never touches hardware, for engine-audio's tests.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

#[cfg(feature = "mock-audio")]
pub mod mock_backend;

#[cfg(not(feature = "mock-audio"))]
pub mod cpal_backend;

/// Errors raised opening or driving the output device.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("no output device found")]
    DeviceNotFound,
    #[error("device does not support the requested format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to create the audio stream")]
    StreamCreationFailed,
    #[error("playback error: {0}")]
    PlaybackError(String),
    #[error("{0}")]
    Other(String),
}

/// The render callback invoked on the real-time audio thread to fill the
/// output buffer. `data` is interleaved 16-bit PCM; `sample_rate` and
/// `frames` (== `data.len() / channels`) are provided so the callback
/// doesn't need to know its own device config. Must be `Send + Sync`
/// since the worker thread owns it, not the caller.
pub type RenderFn = Arc<dyn Fn(&mut [i16], u32, usize) + Send + Sync + 'static>;

/// Diagnostics events emitted off the real-time thread.
#[derive(Debug, Clone)]
pub enum DiagnosticEvent {
    XRun { count: u32 },
    DeviceRemoved,
    BufferSizeChanged { frames: usize },
    Other(String),
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticEvent::XRun { count } => write!(f, "XRun(count={count})"),
            DiagnosticEvent::DeviceRemoved => write!(f, "DeviceRemoved"),
            DiagnosticEvent::BufferSizeChanged { frames } => write!(f, "BufferSizeChanged(frames={frames})"),
            DiagnosticEvent::Other(s) => write!(f, "Other({s})"),
        }
    }
}

pub type DiagnosticsCb = Arc<dyn Fn(DiagnosticEvent) + Send + Sync + 'static>;

/// Effective configuration of an opened output device.
pub struct DeviceInfo {
    pub sample_rate: u32,
    pub buffer_size: usize,
    pub channels: u16,
    pub device_name: Option<String>,
}

pub trait DeviceInfoProvider {
    fn get_device_name(&self) -> Option<&str>;
}

/// The contract every backend implementation satisfies.
pub trait AudioBackend {
    fn start(&mut self, render: RenderFn) -> Result<(), BackendError>;
    fn stop(&mut self) -> Result<(), BackendError>;
    fn sample_rate(&self) -> u32;
    fn buffer_size(&self) -> usize;
    fn channels(&self) -> u16;
    /// Frames written since the stream started. 0 if not running.
    fn frames_since_start(&self) -> u64;
    fn set_diagnostics_callback(&mut self, cb: Option<DiagnosticsCb>);
    fn as_device_info_provider(&self) -> Option<&dyn DeviceInfoProvider>;
}

#[cfg(not(feature = "mock-audio"))]
pub fn create_audio_backend() -> Result<Box<dyn AudioBackend>, BackendError> {
    let backend = cpal_backend::CpalAudioBackend::new()?;
    tracing::debug!(
        sample_rate = backend.sample_rate(),
        buffer_size = backend.buffer_size(),
        channels = backend.channels(),
        device = backend.as_device_info_provider().and_then(|d| d.get_device_name()).unwrap_or("<unknown>"),
        "opened audio output device"
    );
    Ok(Box::new(backend))
}

#[cfg(feature = "mock-audio")]
pub fn create_audio_backend() -> Result<Box<dyn AudioBackend>, BackendError> {
    let backend = mock_backend::MockAudioBackend::new();
    tracing::debug!(
        sample_rate = backend.sample_rate(),
        buffer_size = backend.buffer_size(),
        channels = backend.channels(),
        "opened mock audio backend"
    );
    Ok(Box::new(backend))
}

/// True if this crate was compiled with the `mock-audio` feature.
pub fn is_mock_backend_enabled() -> bool {
    cfg!(feature = "mock-audio")
}

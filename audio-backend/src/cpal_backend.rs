use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{error, warn};

use crate::{AudioBackend, BackendError, DeviceInfo, DeviceInfoProvider, DiagnosticEvent, DiagnosticsCb, RenderFn};

/// Worker-thread-backed `cpal` backend. The public handle is `Send`-safe
/// and talks to a worker thread over a control channel; the worker owns
/// the actual `cpal::Stream` (which is not `Send` on every platform) so
/// nothing non-`Send` ever crosses into `CpalAudioBackend` itself.
pub struct CpalAudioBackend {
    inner: Arc<CpalBackendInner>,
}

struct CpalBackendInner {
    info: DeviceInfo,
    render: Mutex<Option<RenderFn>>,
    frames: AtomicU64,
    ctrl_tx: Sender<CtrlMsg>,
}

enum CtrlMsg {
    SetRender(Option<RenderFn>),
    Start,
    Stop,
    SetDiagnostics(Option<DiagnosticsCb>),
    Shutdown,
}

impl CpalAudioBackend {
    pub fn new() -> Result<Self, BackendError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(BackendError::DeviceNotFound)?;

        let mut supported_configs = device
            .supported_output_configs()
            .map_err(|e| BackendError::Other(e.to_string()))?
            .collect::<Vec<_>>();

        if supported_configs.is_empty() {
            return Err(BackendError::UnsupportedFormat("no supported configs".into()));
        }

        // Prefer I16 interleaved, stereo, at the device's maximum sample rate;
        // the mixer kernel only ever produces i16 PCM.
        let chosen = supported_configs
            .iter()
            .rev()
            .find(|c| c.sample_format() == SampleFormat::I16 && c.channels() >= 2)
            .cloned()
            .or_else(|| supported_configs.pop())
            .ok_or(BackendError::UnsupportedFormat("no i16 stereo config available".into()))?;

        let config = chosen.with_max_sample_rate().config();

        let buffer_frames = match config.buffer_size {
            cpal::BufferSize::Fixed(n) => n as usize,
            cpal::BufferSize::Default => 0,
        };

        let info = DeviceInfo {
            sample_rate: config.sample_rate.0,
            buffer_size: buffer_frames,
            channels: config.channels,
            device_name: device.name().ok(),
        };

        let (tx, rx) = unbounded::<CtrlMsg>();

        let inner = Arc::new(CpalBackendInner {
            info,
            render: Mutex::new(None),
            frames: AtomicU64::new(0),
            ctrl_tx: tx,
        });

        let inner_worker = inner.clone();
        thread::spawn(move || worker_loop(device, config, rx, inner_worker));

        Ok(Self { inner })
    }
}

fn worker_loop(device: Device, config: StreamConfig, rx: Receiver<CtrlMsg>, inner: Arc<CpalBackendInner>) {
    let channels = config.channels as usize;
    let mut diagnostics: Option<DiagnosticsCb> = None;
    let mut stream_opt: Option<cpal::Stream> = None;

    loop {
        while let Ok(msg) = rx.try_recv() {
            match msg {
                CtrlMsg::SetRender(opt) => {
                    *inner.render.lock().unwrap() = opt;
                }
                CtrlMsg::Start => {
                    if stream_opt.is_none() {
                        let inner_for_cb = inner.clone();
                        let sample_rate = config.sample_rate.0;
                        let diagnostics_for_err_cb = diagnostics.clone();

                        let err_cb = move |err| {
                            error!(%err, "cpal stream error");
                            if let Some(cb) = &diagnostics_for_err_cb {
                                let cb = cb.clone();
                                thread::spawn(move || cb(DiagnosticEvent::XRun { count: 1 }));
                            }
                        };

                        let data_cb = move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                            let render = inner_for_cb.render.lock().unwrap().clone();
                            if let Some(render) = render {
                                let frames = data.len() / channels;
                                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                                    render(data, sample_rate, frames);
                                }));
                                if result.is_err() {
                                    data.fill(0);
                                }
                            } else {
                                data.fill(0);
                            }
                            let frames_written = (data.len() / channels) as u64;
                            inner_for_cb.frames.fetch_add(frames_written, Ordering::Relaxed);
                        };

                        match device.build_output_stream(&config, data_cb, err_cb, None) {
                            Ok(stream) => {
                                if let Err(e) = stream.play() {
                                    error!(%e, "failed to start cpal stream");
                                } else {
                                    stream_opt = Some(stream);
                                }
                            }
                            Err(e) => {
                                warn!(%e, "failed to build cpal stream");
                                if let Some(cb) = &diagnostics {
                                    let cb = cb.clone();
                                    let message = e.to_string();
                                    thread::spawn(move || cb(DiagnosticEvent::Other(format!("stream build failed: {message}"))));
                                }
                            }
                        }
                    }
                }
                CtrlMsg::Stop => {
                    stream_opt = None;
                }
                CtrlMsg::SetDiagnostics(cb) => {
                    diagnostics = cb;
                }
                CtrlMsg::Shutdown => return,
            }
        }
        thread::sleep(Duration::from_millis(2));
    }
}

impl AudioBackend for CpalAudioBackend {
    fn start(&mut self, render: RenderFn) -> Result<(), BackendError> {
        self.inner
            .ctrl_tx
            .send(CtrlMsg::SetRender(Some(render)))
            .map_err(|_| BackendError::Other("control channel closed".into()))?;
        self.inner
            .ctrl_tx
            .send(CtrlMsg::Start)
            .map_err(|_| BackendError::Other("control channel closed".into()))
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.inner
            .ctrl_tx
            .send(CtrlMsg::Stop)
            .map_err(|_| BackendError::Other("control channel closed".into()))?;
        self.inner
            .ctrl_tx
            .send(CtrlMsg::SetRender(None))
            .map_err(|_| BackendError::Other("control channel closed".into()))
    }

    fn sample_rate(&self) -> u32 {
        self.inner.info.sample_rate
    }

    fn buffer_size(&self) -> usize {
        self.inner.info.buffer_size
    }

    fn channels(&self) -> u16 {
        self.inner.info.channels
    }

    fn frames_since_start(&self) -> u64 {
        self.inner.frames.load(Ordering::Relaxed)
    }

    fn set_diagnostics_callback(&mut self, cb: Option<DiagnosticsCb>) {
        self.inner.ctrl_tx.send(CtrlMsg::SetDiagnostics(cb)).ok();
    }

    fn as_device_info_provider(&self) -> Option<&dyn DeviceInfoProvider> {
        None
    }
}

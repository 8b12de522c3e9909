//! Wires the mixing engine to an output device: owns an [`Engine`] and a
//! running [`AudioBackend`], and bridges the backend's `RenderFn` (i16
//! PCM, `(data, sample_rate, frames)`) to `Engine::render` (§4.J).
//!
//! This is the crate a game loop actually depends on. It does not add
//! any mixing logic of its own — `audio-engine` owns every invariant
//! about what gets mixed and how; this crate's job ends at "open a
//! device and keep calling `render`".

use std::sync::Arc;

use asset_manager::AudioSource;
use audio_backend::{AudioBackend, BackendError};
use audio_engine::{Engine, EngineConfig, EngineError, PlayParams};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Error, Debug)]
pub enum GameAudioError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Decode(#[from] asset_manager::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Owns the mixing engine and the open audio device that drives it.
pub struct GameAudio {
    engine: Arc<Engine>,
    backend: Box<dyn AudioBackend>,
}

impl GameAudio {
    /// Open the default output device and start pulling mixed audio from
    /// a freshly created [`Engine`] sized to match the device's buffer.
    #[instrument(skip_all)]
    pub fn new() -> Result<Self, GameAudioError> {
        let backend = audio_backend::create_audio_backend()?;
        let max_block_frames = if backend.buffer_size() > 0 { backend.buffer_size() * 4 } else { 4096 };
        let engine = Arc::new(Engine::new(EngineConfig {
            sample_rate: backend.sample_rate(),
            max_block_frames,
            ..EngineConfig::default()
        }));
        Self::with_engine_and_backend(engine, backend)
    }

    /// Wire a pre-built engine to a pre-opened backend directly — the
    /// path tests and the mock backend use.
    pub fn with_engine_and_backend(engine: Arc<Engine>, mut backend: Box<dyn AudioBackend>) -> Result<Self, GameAudioError> {
        let channels = backend.channels() as usize;
        let render_engine = engine.clone();
        backend.start(Arc::new(move |data: &mut [i16], _sample_rate, frames| {
            if channels == 2 {
                render_engine.render(frames, data);
            } else {
                // Mono or >2-channel devices: mix to stereo in scratch space
                // then fold down / duplicate into the device's layout.
                let mut stereo = vec![0i16; frames * 2];
                render_engine.render(frames, &mut stereo);
                for f in 0..frames {
                    let (l, r) = (stereo[f * 2], stereo[f * 2 + 1]);
                    let mixed = ((l as i32 + r as i32) / 2) as i16;
                    for c in 0..channels {
                        data[f * channels + c] = mixed;
                    }
                }
            }
        }))?;
        info!(sample_rate = backend.sample_rate(), channels = backend.channels(), "game audio started");
        Ok(Self { engine, backend })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Decode a WAV file's bytes and register it with the engine,
    /// returning a source handle usable with `play_sound`/`play_music`.
    pub fn load_wav(&self, bytes: &[u8]) -> Result<u64, GameAudioError> {
        let source = asset_manager::decode_wav(bytes)?;
        Ok(self.engine.register_source(source))
    }

    /// Decode already-PCM-decoded Ogg Vorbis samples (upstream decode is
    /// out of scope for this crate) and register them.
    pub fn load_ogg_decoded(&self, interleaved: &[i16], sample_count: usize, channel_count: u16, sample_rate: u32) -> Result<u64, GameAudioError> {
        let source: AudioSource = asset_manager::ogg::from_ogg_decoded(interleaved, sample_count, channel_count, sample_rate)?;
        Ok(self.engine.register_source(source))
    }

    pub fn play_sound(&self, handle: u64, params: PlayParams) -> Option<u64> {
        self.engine.play_sound(handle, params)
    }

    pub fn shutdown(&mut self) -> Result<(), GameAudioError> {
        self.engine.shutdown();
        self.backend.stop()?;
        Ok(())
    }
}

/// Decode a WAV file's bytes without opening a device — headless tools
/// (asset pipelines, CLIs) that never construct a `GameAudio` can still
/// validate or pre-warm sources through this crate.
pub fn decode_wav_bytes(bytes: &[u8]) -> Result<AudioSource, asset_manager::Error> {
    asset_manager::decode_wav(bytes)
}

//! Real-time audio mixing engine: a fixed-capacity pool of concurrently
//! playing instances, mixed into 16-bit PCM under a single lock shared
//! with the device callback.
//!
//! Everything that needs to be touched from both the calling thread
//! (`play_sound`, `set_volume`, ...) and the device thread (`render`) is
//! guarded by one `parking_lot::Mutex<EngineInner>`. There is no
//! separate lock-free path: the device callback takes the same lock
//! everything else does and is expected to win the race quickly because
//! nothing held under it ever blocks or allocates on the hot path after
//! warm-up.

pub mod controller;
pub mod error;
pub mod idmap;
pub mod instance;
pub mod mixer;
pub mod music;
pub mod pool;
pub mod resampler;
pub mod simd;

use std::collections::HashMap;
use std::sync::Arc;

use asset_manager::AudioSource;
use parking_lot::Mutex;
use tracing::{debug, instrument, trace, warn};

pub use error::EngineError;
pub use instance::PlayParams;

use idmap::IdMap;
use music::{MusicEvent, MusicMachine};
use pool::Pool;

/// Invoked with a sound or music instance's id when it finishes (runs
/// off the end of a non-looped source, or is explicitly stopped). Called
/// from whichever thread drove the stop — including the device thread —
/// so it must not block or call back into the engine.
pub type FinishCallback = Arc<dyn Fn(u64) + Send + Sync + 'static>;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Largest frame count `render` will ever be asked for in one call;
    /// sizes the float accumulator scratch buffers up front so the
    /// device thread never allocates.
    pub max_block_frames: usize,
    pub pool_page_size: usize,
    pub id_map_initial_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            max_block_frames: 4096,
            pool_page_size: 64,
            id_map_initial_capacity: 128,
        }
    }
}

struct EngineInner {
    sample_rate: u32,
    running: bool,
    paused: bool,
    global_volume: f32,
    global_pan: f32,
    sound_volume: f32,
    music_volume: f32,

    next_id: u64,
    pool: Pool,
    idmap: IdMap,

    music: MusicMachine,
    /// Id of the currently playing music instance, 0 if none.
    music_playing: u64,
    /// Id of the instance fading/switching in underneath `music_playing`,
    /// 0 if none.
    music_next: u64,

    sources: HashMap<u64, Arc<AudioSource>>,
    next_source_id: u64,

    acc_a: Vec<f32>,
    acc_b: Vec<f32>,

    sound_finish: Option<FinishCallback>,
    music_finish: Option<FinishCallback>,
}

impl EngineInner {
    fn new(config: &EngineConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            running: true,
            paused: false,
            global_volume: 1.0,
            global_pan: 0.5,
            sound_volume: 1.0,
            music_volume: 1.0,
            next_id: 1,
            pool: Pool::new(config.pool_page_size),
            idmap: IdMap::with_capacity(config.id_map_initial_capacity),
            music: MusicMachine::default(),
            music_playing: 0,
            music_next: 0,
            sources: HashMap::new(),
            next_source_id: 1,
            acc_a: vec![0.0; config.max_block_frames],
            acc_b: vec![0.0; config.max_block_frames],
            sound_finish: None,
            music_finish: None,
        }
    }

    fn playing_volume_of(&mut self, id: u64) -> Option<&mut f32> {
        let idx = self.idmap.get(id)?;
        Some(&mut self.pool.instance_mut(idx).volume)
    }
}

/// The mixing engine. Cheap to clone via `Arc` at the call site; every
/// method takes `&self` and locks internally.
pub struct Engine {
    inner: Mutex<EngineInner>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        debug!(sample_rate = config.sample_rate, max_block_frames = config.max_block_frames, "engine initialized");
        Self {
            inner: Mutex::new(EngineInner::new(&config)),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.lock().sample_rate
    }

    /// Stop every active instance and mark the engine as shut down. The
    /// next `render` call drains remaining refcounts and produces
    /// silence; after that the engine is inert.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.running = false;
        let sound_finish = inner.sound_finish.clone();
        let music_finish = inner.music_finish.clone();
        {
            let EngineInner { pool, idmap, .. } = &mut *inner;
            controller::stop_all_playing_sounds(pool, idmap, &sound_finish, &music_finish);
        }
        if inner.music_playing != 0 {
            let id = inner.music_playing;
            controller::stop_by_id(&mut inner.pool, &mut inner.idmap, &sound_finish, &music_finish, id);
        }
        if inner.music_next != 0 {
            let id = inner.music_next;
            controller::stop_by_id(&mut inner.pool, &mut inner.idmap, &sound_finish, &music_finish, id);
        }
        inner.music_playing = 0;
        inner.music_next = 0;
        debug!("engine shut down");
    }

    pub fn set_sound_finish_callback(&self, cb: impl Fn(u64) + Send + Sync + 'static) {
        self.inner.lock().sound_finish = Some(Arc::new(cb));
    }

    pub fn set_music_finish_callback(&self, cb: impl Fn(u64) + Send + Sync + 'static) {
        self.inner.lock().music_finish = Some(Arc::new(cb));
    }

    // -- global controls ---------------------------------------------

    pub fn set_global_volume(&self, volume: f32) {
        self.inner.lock().global_volume = volume.max(0.0);
    }

    pub fn global_volume(&self) -> f32 {
        self.inner.lock().global_volume
    }

    pub fn set_global_pan(&self, pan: f32) {
        self.inner.lock().global_pan = pan.clamp(0.0, 1.0);
    }

    pub fn global_pan(&self) -> f32 {
        self.inner.lock().global_pan
    }

    pub fn set_sound_volume(&self, volume: f32) {
        self.inner.lock().sound_volume = volume.max(0.0);
    }

    pub fn sound_volume(&self) -> f32 {
        self.inner.lock().sound_volume
    }

    pub fn set_music_volume(&self, volume: f32) {
        self.inner.lock().music_volume = volume.max(0.0);
    }

    pub fn music_volume(&self) -> f32 {
        self.inner.lock().music_volume
    }

    pub fn pause(&self) {
        self.inner.lock().paused = true;
    }

    pub fn resume(&self) {
        self.inner.lock().paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    // -- source registry ------------------------------------------------

    /// Take ownership of a decoded source, returning a handle. Sources
    /// are refcounted by how many instances currently reference them
    /// (`AudioSource::playing_count`); `free_audio_source` only actually
    /// drops the registry's strong reference once nothing is playing it.
    pub fn register_source(&self, source: AudioSource) -> u64 {
        let mut inner = self.inner.lock();
        let id = inner.next_source_id;
        inner.next_source_id += 1;
        inner.sources.insert(id, Arc::new(source));
        id
    }

    pub fn free_audio_source(&self, handle: u64) -> bool {
        let mut inner = self.inner.lock();
        match inner.sources.get(&handle) {
            Some(source) if source.is_unreferenced() => {
                inner.sources.remove(&handle);
                true
            }
            Some(_) => {
                warn!(handle, "free_audio_source called on a source still playing");
                false
            }
            None => false,
        }
    }

    pub fn source_sample_rate(&self, handle: u64) -> Option<u32> {
        self.inner.lock().sources.get(&handle).map(|s| s.sample_rate)
    }

    // -- sound playback -----------------------------------------------

    #[instrument(skip(self, params))]
    pub fn play_sound(&self, handle: u64, params: PlayParams) -> Option<u64> {
        let mut inner = self.inner.lock();
        let audio = inner.sources.get(&handle)?.clone();
        let EngineInner { pool, idmap, next_id, .. } = &mut *inner;
        let id = controller::play(pool, idmap, next_id, audio, &params);
        trace!(id, handle, "sound started");
        Some(id)
    }

    pub fn stop_sound(&self, id: u64) -> bool {
        let mut inner = self.inner.lock();
        let sound_finish = inner.sound_finish.clone();
        let music_finish = inner.music_finish.clone();
        controller::stop_by_id(&mut inner.pool, &mut inner.idmap, &sound_finish, &music_finish, id)
    }

    pub fn stop_all_playing_sounds(&self) {
        let mut inner = self.inner.lock();
        let sound_finish = inner.sound_finish.clone();
        let music_finish = inner.music_finish.clone();
        controller::stop_all_playing_sounds(&mut inner.pool, &mut inner.idmap, &sound_finish, &music_finish);
    }

    pub fn set_playing_sounds_volume(&self, volume: f32) {
        controller::set_playing_sounds_volume(&mut self.inner.lock().pool, volume);
    }

    pub fn is_playing(&self, id: u64) -> bool {
        self.inner.lock().idmap.contains(id)
    }

    pub fn set_volume(&self, id: u64, volume: f32) -> bool {
        let mut inner = self.inner.lock();
        controller::set_volume(&mut inner.pool, &inner.idmap, id, volume)
    }

    pub fn volume(&self, id: u64) -> Option<f32> {
        let inner = self.inner.lock();
        controller::get_volume(&inner.pool, &inner.idmap, id)
    }

    pub fn set_pan(&self, id: u64, pan: f32) -> bool {
        let mut inner = self.inner.lock();
        controller::set_pan(&mut inner.pool, &inner.idmap, id, pan)
    }

    pub fn pan(&self, id: u64) -> Option<f32> {
        let inner = self.inner.lock();
        controller::get_pan(&inner.pool, &inner.idmap, id)
    }

    pub fn set_pitch(&self, id: u64, pitch: f32) -> bool {
        let mut inner = self.inner.lock();
        controller::set_pitch(&mut inner.pool, &inner.idmap, id, pitch)
    }

    pub fn pitch(&self, id: u64) -> Option<f32> {
        let inner = self.inner.lock();
        controller::get_pitch(&inner.pool, &inner.idmap, id)
    }

    pub fn set_looped(&self, id: u64, looped: bool) -> bool {
        let mut inner = self.inner.lock();
        controller::set_looped(&mut inner.pool, &inner.idmap, id, looped)
    }

    pub fn looped(&self, id: u64) -> Option<bool> {
        let inner = self.inner.lock();
        controller::get_looped(&inner.pool, &inner.idmap, id)
    }

    pub fn set_sound_paused(&self, id: u64, paused: bool) -> bool {
        let mut inner = self.inner.lock();
        controller::set_paused(&mut inner.pool, &inner.idmap, id, paused)
    }

    pub fn sound_paused(&self, id: u64) -> Option<bool> {
        let inner = self.inner.lock();
        controller::get_paused(&inner.pool, &inner.idmap, id)
    }

    pub fn set_time(&self, id: u64, seconds: f32) -> Result<bool, EngineError> {
        let mut inner = self.inner.lock();
        controller::set_time(&mut inner.pool, &inner.idmap, id, seconds)
    }

    pub fn time(&self, id: u64) -> Option<f32> {
        let inner = self.inner.lock();
        controller::get_time(&inner.pool, &inner.idmap, id)
    }

    // -- music --------------------------------------------------------

    /// Start `handle` as the music channel, fading in from silence over
    /// `fade_in` seconds. Stops and replaces any currently playing music
    /// instance immediately (without its own fade-out).
    #[instrument(skip(self))]
    pub fn play_music(&self, handle: u64, fade_in: f32, looped: bool) -> Option<u64> {
        let mut inner = self.inner.lock();
        let audio = inner.sources.get(&handle)?.clone();
        if inner.music_playing != 0 {
            let sound_finish = inner.sound_finish.clone();
            let music_finish = inner.music_finish.clone();
            let old = inner.music_playing;
            controller::stop_by_id(&mut inner.pool, &mut inner.idmap, &sound_finish, &music_finish, old);
        }
        let params = PlayParams { is_music: true, volume: 0.0, looped, ..PlayParams::default() };
        let EngineInner { pool, idmap, next_id, .. } = &mut *inner;
        let id = controller::play(pool, idmap, next_id, audio, &params);
        inner.music_playing = id;
        inner.music_next = 0;
        inner.music.start_fade_in(fade_in, 0.0);
        Some(id)
    }

    pub fn music_fade_out(&self, fade: f32) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if inner.music.is_paused() {
            return Err(EngineError::CannotFadeOutWhileMusicPaused);
        }
        let playing = inner.music_playing;
        let current = inner.playing_volume_of(playing).map(|v| *v).unwrap_or(0.0);
        let event = inner.music.start_fade_out(fade, current);
        apply_music_event(&mut inner, event);
        Ok(())
    }

    /// Fade `music_playing` out over `fade_out` seconds, then fade
    /// `handle` in over `fade_in` seconds (with a silent gap in
    /// between, not an overlap — use `music_crossfade` for that).
    pub fn music_switch(&self, handle: u64, fade_out: f32, fade_in: f32) -> Result<Option<u64>, EngineError> {
        let mut inner = self.inner.lock();
        if inner.music.is_paused() {
            return Err(EngineError::CannotSwitchMusicWhilePaused);
        }
        let Some(audio) = inner.sources.get(&handle).cloned() else {
            return Ok(None);
        };
        let playing = inner.music_playing;
        let current = inner.playing_volume_of(playing).map(|v| *v).unwrap_or(0.0);
        let params = PlayParams { is_music: true, volume: 0.0, paused: true, ..PlayParams::default() };
        let EngineInner { pool, idmap, next_id, .. } = &mut *inner;
        let next_id_val = controller::play(pool, idmap, next_id, audio, &params);
        inner.music_next = next_id_val;
        let event = inner.music.start_switch(fade_out, fade_in, current);
        apply_music_event(&mut inner, event);
        Ok(Some(next_id_val))
    }

    /// Fade `music_playing` out while fading `handle` in at the same
    /// time, both over `fade` seconds.
    pub fn music_crossfade(&self, handle: u64, fade: f32) -> Result<Option<u64>, EngineError> {
        let mut inner = self.inner.lock();
        if inner.music.is_paused() {
            return Err(EngineError::CannotCrossfadeWhileMusicPaused);
        }
        let Some(audio) = inner.sources.get(&handle).cloned() else {
            return Ok(None);
        };
        let playing = inner.music_playing;
        let current = inner.playing_volume_of(playing).map(|v| *v).unwrap_or(0.0);
        let params = PlayParams { is_music: true, volume: 0.0, ..PlayParams::default() };
        let EngineInner { pool, idmap, next_id, .. } = &mut *inner;
        let next_id_val = controller::play(pool, idmap, next_id, audio, &params);
        inner.music_next = next_id_val;
        let event = inner.music.start_crossfade(fade, current);
        apply_music_event(&mut inner, event);
        Ok(Some(next_id_val))
    }

    pub fn music_pause(&self) {
        self.inner.lock().music.pause();
    }

    pub fn music_resume(&self) {
        self.inner.lock().music.resume();
    }

    pub fn music_is_paused(&self) -> bool {
        self.inner.lock().music.is_paused()
    }

    pub fn music_playing_id(&self) -> Option<u64> {
        let inner = self.inner.lock();
        (inner.music_playing != 0).then_some(inner.music_playing)
    }

    /// Advance fades, crossfades, and switch gaps by `dt` seconds. Call
    /// this once per game tick, independently of the audio device's own
    /// callback cadence.
    #[instrument(skip(self))]
    pub fn update(&self, dt: f32) {
        let mut inner = self.inner.lock();
        if inner.music.is_idle() {
            return;
        }
        let music_volume = inner.music_volume;
        let playing = inner.music_playing;
        let next = inner.music_next;
        let mut playing_volume = inner.playing_volume_of(playing).map(|v| *v).unwrap_or(0.0);
        let mut next_volume = inner.playing_volume_of(next).map(|v| *v).unwrap_or(0.0);
        let event = inner.music.advance(dt, music_volume, &mut playing_volume, &mut next_volume);
        if let Some(v) = inner.playing_volume_of(playing) {
            *v = playing_volume;
        }
        if let Some(v) = inner.playing_volume_of(next) {
            *v = next_volume;
        }
        apply_music_event(&mut inner, event);
    }

    // -- device callback ------------------------------------------------

    /// Render `frames` stereo frames of 16-bit PCM into `out`
    /// (interleaved, `out.len() >= frames * 2`). This is the function
    /// the audio backend's device callback calls on every wakeup; it
    /// takes the same lock every other `Engine` method does.
    pub fn render(&self, frames: usize, out: &mut [i16]) {
        let mut inner = self.inner.lock();
        debug_assert!(frames <= inner.acc_a.len(), "render() called with more frames than max_block_frames");
        let frames = frames.min(inner.acc_a.len());
        let EngineInner {
            pool,
            idmap,
            acc_a,
            acc_b,
            running,
            paused,
            global_volume,
            global_pan,
            music_volume,
            sound_volume,
            sound_finish,
            music_finish,
            ..
        } = &mut *inner;
        mixer::mix(
            pool,
            idmap,
            acc_a,
            acc_b,
            out,
            frames,
            *running,
            *paused,
            *global_volume,
            *global_pan,
            *music_volume,
            *sound_volume,
            sound_finish,
            music_finish,
        );
    }
}

fn apply_music_event(inner: &mut EngineInner, event: MusicEvent) {
    let sound_finish = inner.sound_finish.clone();
    let music_finish = inner.music_finish.clone();
    match event {
        MusicEvent::None => {}
        MusicEvent::FadeOutComplete => {
            if inner.music_playing != 0 {
                let id = inner.music_playing;
                controller::stop_by_id(&mut inner.pool, &mut inner.idmap, &sound_finish, &music_finish, id);
            }
            inner.music_playing = 0;
        }
        MusicEvent::SwitchGapComplete => {
            // Only the outgoing track is deactivated here; `music_next`
            // keeps its own slot until `SwitchOrCrossfadeComplete`
            // promotes it, since the state machine's `SwitchTo1` phase
            // still writes its fade-in volume through the "next" slot.
            if inner.music_playing != 0 {
                let id = inner.music_playing;
                controller::stop_by_id(&mut inner.pool, &mut inner.idmap, &sound_finish, &music_finish, id);
            }
            inner.music_playing = 0;
            if inner.music_next != 0 {
                let id = inner.music_next;
                controller::set_paused(&mut inner.pool, &inner.idmap, id, false);
            }
        }
        MusicEvent::SwitchOrCrossfadeComplete => {
            if inner.music_playing != 0 && inner.music_playing != inner.music_next {
                let id = inner.music_playing;
                controller::stop_by_id(&mut inner.pool, &mut inner.idmap, &sound_finish, &music_finish, id);
            }
            inner.music_playing = inner.music_next;
            inner.music_next = 0;
            // `music_switch` starts its incoming instance paused (it only
            // unpauses at the `SwitchGapComplete` midpoint); a zero/zero
            // switch collapses straight to this arm without ever passing
            // through that midpoint, so unpause unconditionally here too.
            // A no-op for the crossfade path, whose instance was never
            // paused to begin with.
            if inner.music_playing != 0 {
                let id = inner.music_playing;
                controller::set_paused(&mut inner.pool, &inner.idmap, id, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_manager::AlignedF32Buffer;

    fn source(samples: &[f32]) -> AudioSource {
        let mut buf = AlignedF32Buffer::zeroed(samples.len());
        buf.copy_from_slice(samples);
        AudioSource::new(44_100, 1, vec![buf])
    }

    #[test]
    fn play_and_render_produces_audio() {
        let engine = Engine::new(EngineConfig::default());
        let handle = engine.register_source(source(&[10_000.0; 8]));
        let id = engine.play_sound(handle, PlayParams::default()).unwrap();
        assert!(engine.is_playing(id));
        let mut out = vec![0i16; 16];
        engine.render(4, &mut out);
        assert!(out.iter().any(|&s| s != 0));
    }

    #[test]
    fn free_audio_source_refuses_while_playing() {
        let engine = Engine::new(EngineConfig::default());
        let handle = engine.register_source(source(&[1.0; 8]));
        let _id = engine.play_sound(handle, PlayParams::default()).unwrap();
        assert!(!engine.free_audio_source(handle));
    }

    #[test]
    fn play_music_then_fade_out_eventually_stops() {
        let engine = Engine::new(EngineConfig::default());
        let handle = engine.register_source(source(&[1.0; 44_100]));
        engine.play_music(handle, 0.0, true);
        let id = engine.music_playing_id().unwrap();
        assert!(engine.is_playing(id));
        engine.music_fade_out(0.5).unwrap();
        for _ in 0..10 {
            engine.update(0.1);
        }
        assert!(!engine.is_playing(id));
        assert_eq!(engine.music_playing_id(), None);
    }

    #[test]
    fn shutdown_stops_everything_and_render_is_silent() {
        let engine = Engine::new(EngineConfig::default());
        let handle = engine.register_source(source(&[1.0; 8]));
        let id = engine.play_sound(handle, PlayParams::default()).unwrap();
        engine.shutdown();
        assert!(!engine.is_playing(id));
        let mut out = vec![1i16; 8];
        engine.render(4, &mut out);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn pause_silences_without_advancing_position() {
        let engine = Engine::new(EngineConfig::default());
        let handle = engine.register_source(source(&[1.0; 8]));
        let id = engine.play_sound(handle, PlayParams::default()).unwrap();
        engine.pause();
        let mut out = vec![0i16; 8];
        engine.render(4, &mut out);
        assert!(out.iter().all(|&s| s == 0));
        assert_eq!(engine.time(id), Some(0.0));
    }
}

use std::sync::Arc;

use asset_manager::AudioSource;

/// Parameters supplied to [`crate::controller::play`].
#[derive(Debug, Clone)]
pub struct PlayParams {
    pub is_music: bool,
    pub volume: f32,
    /// 0.0 = full left, 1.0 = full right, 0.5 = centre.
    pub pan: f32,
    /// 1.0 = unity speed, negative = reverse, 0.0 = silent.
    pub pitch: f32,
    pub looped: bool,
    pub paused: bool,
    /// Start offset, in seconds, converted to a source-sample start index
    /// using the source's own sample rate.
    pub start_time: f32,
}

impl Default for PlayParams {
    fn default() -> Self {
        Self {
            is_music: false,
            volume: 1.0,
            pan: 0.5,
            pitch: 1.0,
            looped: false,
            paused: false,
            start_time: 0.0,
        }
    }
}

/// A playing occurrence of a source (§3 "Sound instance").
///
/// `active` iff the owning slot is linked into the active list and present
/// in the id map; `!active` iff it is on the free list and absent from the
/// map. Both transitions only ever happen while holding the engine lock.
pub struct Instance {
    pub id: u64,
    pub is_music: bool,
    pub active: bool,
    pub paused: bool,
    pub looped: bool,
    pub volume: f32,
    pub pan_left: f32,
    pub pan_right: f32,
    pub pitch: f32,
    /// Source-relative read position in samples; fractional under
    /// pitch != 1.0, and may be negative momentarily under reverse
    /// playback before the end test wraps or stops it.
    pub sample_index: f32,
    pub audio: Option<Arc<AudioSource>>,
}

impl Instance {
    pub(crate) fn free() -> Self {
        Self {
            id: 0,
            is_music: false,
            active: false,
            paused: false,
            looped: false,
            volume: 1.0,
            pan_left: 0.5,
            pan_right: 0.5,
            pitch: 1.0,
            sample_index: 0.0,
            audio: None,
        }
    }

    pub(crate) fn fill_from_params(&mut self, id: u64, audio: Arc<AudioSource>, params: &PlayParams) {
        self.id = id;
        self.is_music = params.is_music;
        self.active = true;
        self.paused = params.paused;
        self.looped = params.looped;
        self.volume = params.volume;
        self.set_pan(params.pan);
        self.pitch = params.pitch;
        self.sample_index = params.start_time * audio.sample_rate as f32;
        self.audio = Some(audio);
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan_left = 1.0 - pan;
        self.pan_right = pan;
    }

    pub fn pan(&self) -> f32 {
        self.pan_right
    }
}

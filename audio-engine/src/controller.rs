//! Playing-instance controller (§4.H): play/stop/set/get, all operating
//! under the already-held engine lock.
//!
//! Id-based mutators on a stale or unknown id are defined no-ops (they
//! return `false`/`None`, never an error) — only parameter-range and
//! music state-machine violations are `EngineError`s.

use std::sync::Arc;

use asset_manager::AudioSource;

use crate::idmap::IdMap;
use crate::instance::PlayParams;
use crate::pool::Pool;
use crate::FinishCallback;

/// Allocate a slot, fill it from `params`, link it active and map its id.
/// `next_id` is the caller's monotonic id generator (never 0).
pub fn play(pool: &mut Pool, idmap: &mut IdMap, next_id: &mut u64, audio: Arc<AudioSource>, params: &PlayParams) -> u64 {
    audio.incr_playing();
    let id = *next_id;
    *next_id += 1;
    let idx = pool.alloc();
    pool.instance_mut(idx).fill_from_params(id, audio, params);
    pool.link_active(idx);
    idmap.insert(id, idx);
    id
}

/// Deactivate and free the slot at `idx`, firing whichever finish
/// callback matches its category. Shared by the explicit `stop` entry
/// point and by the mixer when a non-looped instance runs off the end
/// of its source.
pub fn stop_slot(
    pool: &mut Pool,
    idmap: &mut IdMap,
    sound_finish: &Option<FinishCallback>,
    music_finish: &Option<FinishCallback>,
    idx: u32,
) {
    let (id, is_music) = {
        let inst = pool.instance_mut(idx);
        let id = inst.id;
        let is_music = inst.is_music;
        inst.active = false;
        if let Some(audio) = inst.audio.take() {
            audio.decr_playing();
        }
        (id, is_music)
    };
    pool.unlink_active(idx);
    idmap.remove(id);
    pool.release(idx);
    let cb = if is_music { music_finish } else { sound_finish };
    if let Some(cb) = cb {
        cb(id);
    }
}

pub fn stop_by_id(
    pool: &mut Pool,
    idmap: &mut IdMap,
    sound_finish: &Option<FinishCallback>,
    music_finish: &Option<FinishCallback>,
    id: u64,
) -> bool {
    match idmap.get(id) {
        Some(idx) => {
            stop_slot(pool, idmap, sound_finish, music_finish, idx);
            true
        }
        None => false,
    }
}

pub fn stop_all_playing_sounds(pool: &mut Pool, idmap: &mut IdMap, sound_finish: &Option<FinishCallback>, music_finish: &Option<FinishCallback>) {
    let mut cur = pool.active_head();
    while let Some(idx) = cur {
        let next = pool.next_active(idx);
        if !pool.instance(idx).is_music {
            stop_slot(pool, idmap, sound_finish, music_finish, idx);
        }
        cur = next;
    }
}

pub fn set_volume(pool: &mut Pool, idmap: &IdMap, id: u64, volume: f32) -> bool {
    with_instance_mut(pool, idmap, id, |inst| inst.volume = volume.max(0.0))
}

pub fn get_volume(pool: &Pool, idmap: &IdMap, id: u64) -> Option<f32> {
    with_instance(pool, idmap, id, |inst| inst.volume)
}

pub fn set_pan(pool: &mut Pool, idmap: &IdMap, id: u64, pan: f32) -> bool {
    with_instance_mut(pool, idmap, id, |inst| inst.set_pan(pan.clamp(0.0, 1.0)))
}

pub fn get_pan(pool: &Pool, idmap: &IdMap, id: u64) -> Option<f32> {
    with_instance(pool, idmap, id, |inst| inst.pan())
}

pub fn set_pitch(pool: &mut Pool, idmap: &IdMap, id: u64, pitch: f32) -> bool {
    with_instance_mut(pool, idmap, id, |inst| inst.pitch = pitch)
}

pub fn get_pitch(pool: &Pool, idmap: &IdMap, id: u64) -> Option<f32> {
    with_instance(pool, idmap, id, |inst| inst.pitch)
}

pub fn set_looped(pool: &mut Pool, idmap: &IdMap, id: u64, looped: bool) -> bool {
    with_instance_mut(pool, idmap, id, |inst| inst.looped = looped)
}

pub fn get_looped(pool: &Pool, idmap: &IdMap, id: u64) -> Option<bool> {
    with_instance(pool, idmap, id, |inst| inst.looped)
}

pub fn set_paused(pool: &mut Pool, idmap: &IdMap, id: u64, paused: bool) -> bool {
    with_instance_mut(pool, idmap, id, |inst| inst.paused = paused)
}

pub fn get_paused(pool: &Pool, idmap: &IdMap, id: u64) -> Option<bool> {
    with_instance(pool, idmap, id, |inst| inst.paused)
}

pub fn is_playing(idmap: &IdMap, id: u64) -> bool {
    idmap.contains(id)
}

/// Seek to `seconds`, converted to a source-sample index with the
/// instance's own source sample rate. `index == sample_count` is
/// accepted (the instance will end on its next mix, same as reaching
/// that position by playback); only strictly past the end is
/// `SampleIndexOutOfRange`.
pub fn set_time(pool: &mut Pool, idmap: &IdMap, id: u64, seconds: f32) -> Result<bool, crate::error::EngineError> {
    let Some(idx) = idmap.get(id) else {
        return Ok(false);
    };
    let inst = pool.instance_mut(idx);
    // An id present in the map always names a live, audio-bearing
    // instance (invariant 1); a `None` here means the map and the pool
    // have drifted apart, not that the caller passed a stale id.
    let Some(audio) = &inst.audio else {
        return Err(crate::error::EngineError::ImplementationError);
    };
    let index = seconds * audio.sample_rate as f32;
    if index < 0.0 || index > audio.sample_count as f32 {
        return Err(crate::error::EngineError::SampleIndexOutOfRange);
    }
    inst.sample_index = index;
    Ok(true)
}

pub fn get_time(pool: &Pool, idmap: &IdMap, id: u64) -> Option<f32> {
    let idx = idmap.get(id)?;
    let inst = pool.instance(idx);
    let audio = inst.audio.as_ref()?;
    Some(inst.sample_index / audio.sample_rate as f32)
}

/// Set the volume of every currently playing non-music instance, leaving
/// per-instance volumes set afterward unaffected by later calls.
pub fn set_playing_sounds_volume(pool: &mut Pool, volume: f32) {
    let mut cur = pool.active_head();
    while let Some(idx) = cur {
        cur = pool.next_active(idx);
        if !pool.instance(idx).is_music {
            pool.instance_mut(idx).volume = volume.max(0.0);
        }
    }
}

fn with_instance<T>(pool: &Pool, idmap: &IdMap, id: u64, f: impl FnOnce(&crate::instance::Instance) -> T) -> Option<T> {
    let idx = idmap.get(id)?;
    Some(f(pool.instance(idx)))
}

fn with_instance_mut(pool: &mut Pool, idmap: &IdMap, id: u64, f: impl FnOnce(&mut crate::instance::Instance)) -> bool {
    match idmap.get(id) {
        Some(idx) => {
            f(pool.instance_mut(idx));
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_manager::AlignedF32Buffer;

    fn source() -> Arc<AudioSource> {
        Arc::new(AudioSource::new(44100, 1, vec![AlignedF32Buffer::zeroed(4)]))
    }

    #[test]
    fn play_assigns_id_and_stop_frees_it() {
        let mut pool = Pool::new(4);
        let mut idmap = IdMap::with_capacity(8);
        let mut next_id = 1u64;
        let audio = source();
        let id = play(&mut pool, &mut idmap, &mut next_id, audio.clone(), &PlayParams::default());
        assert!(is_playing(&idmap, id));
        assert_eq!(audio.playing_count(), 1);
        assert!(stop_by_id(&mut pool, &mut idmap, &None, &None, id));
        assert!(!is_playing(&idmap, id));
        assert_eq!(audio.playing_count(), 0);
    }

    #[test]
    fn unknown_id_mutators_are_noops() {
        let mut pool = Pool::new(4);
        let idmap = IdMap::with_capacity(8);
        assert!(!set_volume(&mut pool, &idmap, 999, 0.5));
        assert_eq!(get_volume(&pool, &idmap, 999), None);
    }

    #[test]
    fn set_time_rejects_out_of_range() {
        let mut pool = Pool::new(4);
        let mut idmap = IdMap::with_capacity(8);
        let mut next_id = 1u64;
        let audio = source();
        let id = play(&mut pool, &mut idmap, &mut next_id, audio, &PlayParams::default());
        assert!(set_time(&mut pool, &idmap, id, 0.0).unwrap());
        assert_eq!(set_time(&mut pool, &idmap, id, 10.0), Err(crate::error::EngineError::SampleIndexOutOfRange));
    }

    #[test]
    fn set_time_reports_implementation_error_on_a_map_pool_mismatch() {
        // Manufacture the otherwise-unreachable state invariant 1 rules
        // out: an id mapped to a slot that was never filled with audio.
        let mut pool = Pool::new(4);
        let mut idmap = IdMap::with_capacity(8);
        let idx = pool.alloc();
        idmap.insert(42, idx);
        assert_eq!(
            set_time(&mut pool, &idmap, 42, 0.0),
            Err(crate::error::EngineError::ImplementationError)
        );
    }

    #[test]
    fn stop_all_playing_sounds_spares_music() {
        let mut pool = Pool::new(4);
        let mut idmap = IdMap::with_capacity(8);
        let mut next_id = 1u64;
        let sfx = play(&mut pool, &mut idmap, &mut next_id, source(), &PlayParams::default());
        let music_params = PlayParams { is_music: true, ..PlayParams::default() };
        let music = play(&mut pool, &mut idmap, &mut next_id, source(), &music_params);
        stop_all_playing_sounds(&mut pool, &mut idmap, &None, &None);
        assert!(!is_playing(&idmap, sfx));
        assert!(is_playing(&idmap, music));
    }
}

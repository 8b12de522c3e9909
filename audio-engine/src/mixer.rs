//! The mixer kernel (§4.F): the device callback's inner loop.
//!
//! Runs entirely under the engine lock. Walks the active list once,
//! mixing each instance into a pair of float accumulators, then packs
//! the accumulators down to interleaved saturated int16. An instance
//! that has nothing left to play (missing source, inactive, or the
//! engine shutting down) is stopped in place rather than skipped, so a
//! single pass both mixes and reaps.

use crate::controller::stop_slot;
use crate::idmap::IdMap;
use crate::pool::Pool;
use crate::resampler::{mix_pitched, mix_simple, Channels};
use crate::simd;
use crate::FinishCallback;

#[allow(clippy::too_many_arguments)]
pub fn mix(
    pool: &mut Pool,
    idmap: &mut IdMap,
    acc_a: &mut [f32],
    acc_b: &mut [f32],
    out: &mut [i16],
    frames: usize,
    running: bool,
    engine_paused: bool,
    global_volume: f32,
    global_pan: f32,
    music_volume: f32,
    sound_volume: f32,
    sound_finish: &Option<FinishCallback>,
    music_finish: &Option<FinishCallback>,
) {
    simd::clear_groups(acc_a, frames);
    simd::clear_groups(acc_b, frames);

    if engine_paused && running {
        simd::pack_saturating_i16(acc_a, acc_b, frames, out);
        return;
    }

    if !running {
        // Still drain the active list so every instance's refcount and
        // finish callback fire, but produce silence.
        let mut cur = pool.active_head();
        while let Some(idx) = cur {
            let next = pool.next_active(idx);
            stop_slot(pool, idmap, sound_finish, music_finish, idx);
            cur = next;
        }
        simd::pack_saturating_i16(acc_a, acc_b, frames, out);
        return;
    }

    let gpan_l = 1.0 - global_pan;
    let gpan_r = global_pan;

    let mut cur = pool.active_head();
    while let Some(idx) = cur {
        let next = pool.next_active(idx);

        let has_source = pool.instance(idx).audio.is_some() && pool.instance(idx).active;
        if !has_source {
            stop_slot(pool, idmap, sound_finish, music_finish, idx);
            cur = next;
            continue;
        }

        let (paused, pitch) = {
            let inst = pool.instance(idx);
            (inst.paused, inst.pitch)
        };
        if paused || pitch == 0.0 {
            cur = next;
            continue;
        }

        let audio = pool.instance(idx).audio.clone().unwrap();
        let channels = Channels::of(&audio);
        let sample_count = audio.sample_count;

        let category_volume = if pool.instance(idx).is_music { music_volume } else { sound_volume };
        let (volume, pan_left, pan_right) = {
            let inst = pool.instance(idx);
            (inst.volume, inst.pan_left, inst.pan_right)
        };
        let gain_a = volume * pan_left * gpan_l * global_volume * category_volume;
        let gain_b = volume * pan_right * gpan_r * global_volume * category_volume;

        let mut write_offset = 0usize;
        let mut remaining = frames;
        loop {
            if remaining == 0 {
                break;
            }
            let (looped, sample_index) = {
                let inst = pool.instance(idx);
                (inst.looped, inst.sample_index)
            };
            let ended = if pitch >= 0.0 {
                sample_index >= sample_count as f32
            } else {
                sample_index <= 0.0
            };
            if ended {
                if looped && sample_count > 0 {
                    let wrapped = if pitch >= 0.0 {
                        sample_index - sample_count as f32
                    } else {
                        sample_index + sample_count as f32
                    };
                    pool.instance_mut(idx).sample_index = wrapped;
                } else {
                    stop_slot(pool, idmap, sound_finish, music_finish, idx);
                    break;
                }
            }

            let sample_index = pool.instance(idx).sample_index;

            let clamp_needed = !(looped && pitch != 1.0);
            let mut frames_writable = remaining;
            if clamp_needed {
                let remaining_input = if pitch > 0.0 {
                    ((sample_count as f32 - sample_index) / pitch).floor()
                } else {
                    (sample_index / (-pitch)).floor()
                };
                let remaining_input = remaining_input.max(0.0) as usize;
                frames_writable = frames_writable.min(remaining_input);
            }
            if frames_writable == 0 {
                break;
            }

            if pitch == 1.0 {
                mix_simple(
                    &channels,
                    sample_count,
                    looped,
                    sample_index as usize,
                    frames_writable,
                    acc_a,
                    acc_b,
                    write_offset,
                    gain_a,
                    gain_b,
                );
            } else {
                mix_pitched(
                    &channels,
                    sample_count,
                    looped,
                    sample_index,
                    pitch,
                    frames_writable,
                    acc_a,
                    acc_b,
                    write_offset,
                    gain_a,
                    gain_b,
                );
            }

            pool.instance_mut(idx).sample_index = sample_index + frames_writable as f32 * pitch;
            write_offset += frames_writable;
            remaining -= frames_writable;
        }

        cur = next;
    }

    simd::pack_saturating_i16(acc_a, acc_b, frames, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::play;
    use crate::instance::PlayParams;
    use asset_manager::{AlignedF32Buffer, AudioSource};
    use std::sync::Arc;

    fn mono_source(samples: &[f32]) -> Arc<AudioSource> {
        let mut buf = AlignedF32Buffer::zeroed(samples.len());
        buf.copy_from_slice(samples);
        Arc::new(AudioSource::new(44100, 1, vec![buf]))
    }

    #[test]
    fn silence_with_no_active_instances() {
        let mut pool = Pool::new(4);
        let mut idmap = IdMap::with_capacity(8);
        let mut a = vec![0.0; 4];
        let mut b = vec![0.0; 4];
        let mut out = vec![0i16; 8];
        mix(&mut pool, &mut idmap, &mut a, &mut b, &mut out, 4, true, false, 1.0, 0.5, 1.0, 1.0, &None, &None);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn non_looped_instance_stops_itself_at_end_of_buffer() {
        let mut pool = Pool::new(4);
        let mut idmap = IdMap::with_capacity(8);
        let mut next_id = 1u64;
        let audio = mono_source(&[1.0, 1.0]);
        let id = play(&mut pool, &mut idmap, &mut next_id, audio, &PlayParams::default());

        let mut a = vec![0.0; 4];
        let mut b = vec![0.0; 4];
        let mut out = vec![0i16; 8];
        mix(&mut pool, &mut idmap, &mut a, &mut b, &mut out, 4, true, false, 1.0, 0.5, 1.0, 1.0, &None, &None);

        assert!(!idmap.contains(id));
        assert_eq!(out[0], 32767);
        assert_eq!(out[4], 0);
    }

    #[test]
    fn looped_instance_wraps_and_keeps_playing() {
        let mut pool = Pool::new(4);
        let mut idmap = IdMap::with_capacity(8);
        let mut next_id = 1u64;
        let audio = mono_source(&[10000.0, -10000.0]);
        let params = PlayParams { looped: true, ..PlayParams::default() };
        let id = play(&mut pool, &mut idmap, &mut next_id, audio, &params);

        let mut a = vec![0.0; 4];
        let mut b = vec![0.0; 4];
        let mut out = vec![0i16; 8];
        mix(&mut pool, &mut idmap, &mut a, &mut b, &mut out, 4, true, false, 1.0, 0.5, 1.0, 1.0, &None, &None);

        assert!(idmap.contains(id));
    }

    #[test]
    fn shutdown_drains_active_list_to_silence() {
        let mut pool = Pool::new(4);
        let mut idmap = IdMap::with_capacity(8);
        let mut next_id = 1u64;
        let audio = mono_source(&[1.0, 1.0, 1.0, 1.0]);
        let id = play(&mut pool, &mut idmap, &mut next_id, audio, &PlayParams::default());

        let mut a = vec![0.0; 4];
        let mut b = vec![0.0; 4];
        let mut out = vec![1i16; 8];
        mix(&mut pool, &mut idmap, &mut a, &mut b, &mut out, 4, false, false, 1.0, 0.5, 1.0, 1.0, &None, &None);

        assert!(!idmap.contains(id));
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn paused_instance_produces_silence_and_keeps_position() {
        let mut pool = Pool::new(4);
        let mut idmap = IdMap::with_capacity(8);
        let mut next_id = 1u64;
        let audio = mono_source(&[1.0, 1.0, 1.0, 1.0]);
        let params = PlayParams { paused: true, ..PlayParams::default() };
        let id = play(&mut pool, &mut idmap, &mut next_id, audio, &params);
        let idx = idmap.get(id).unwrap();

        let mut a = vec![0.0; 4];
        let mut b = vec![0.0; 4];
        let mut out = vec![0i16; 8];
        mix(&mut pool, &mut idmap, &mut a, &mut b, &mut out, 4, true, false, 1.0, 0.5, 1.0, 1.0, &None, &None);

        assert!(out.iter().all(|&s| s == 0));
        assert_eq!(pool.instance(idx).sample_index, 0.0);
    }
}

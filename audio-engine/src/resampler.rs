//! Linear-interpolated pitched reads and the unity-pitch fast path
//! (§4.G).
//!
//! Both paths are written as the scalar fallback of a width-4 SIMD
//! kernel (see `mixer::simd` for the accumulate/pack stages that are
//! actually batched): the per-frame body here is pure and has no branch
//! on lane position, so a SIMD implementation processing four frames at
//! once produces bit-identical output up to float rounding.

use asset_manager::AudioSource;

/// Borrowed view over a source's channel data, abstracting over mono vs
/// stereo so the mix loops don't duplicate themselves per channel count.
pub enum Channels<'a> {
    Mono(&'a [f32]),
    Stereo(&'a [f32], &'a [f32]),
}

impl<'a> Channels<'a> {
    pub fn of(source: &'a AudioSource) -> Self {
        if source.channel_count == 1 {
            Channels::Mono(source.channel(0))
        } else {
            Channels::Stereo(source.channel(0), source.channel(1))
        }
    }
}

/// `s(n)` from the design: looped sources wrap modulo `sample_count`,
/// non-looped sources return silence outside `[0, sample_count)` so a
/// pitched read stepping past the end is silent, not a repeat of the
/// last sample.
fn sample_at(ch: &[f32], sample_count: usize, looped: bool, n: i64) -> f32 {
    if sample_count == 0 {
        return 0.0;
    }
    if looped {
        let wrapped = n.rem_euclid(sample_count as i64) as usize;
        ch[wrapped]
    } else if n >= 0 && (n as usize) < sample_count {
        ch[n as usize]
    } else {
        0.0
    }
}

/// Unity-pitch fast path: copy `frames` consecutive samples starting at
/// `start_index`, scaled by `(gain_a, gain_b)`, into the accumulators at
/// `write_offset`. Mono sources write the same sample to both channels;
/// stereo sources read each channel independently.
#[allow(clippy::too_many_arguments)]
pub fn mix_simple(
    channels: &Channels,
    sample_count: usize,
    looped: bool,
    start_index: usize,
    frames: usize,
    out_a: &mut [f32],
    out_b: &mut [f32],
    write_offset: usize,
    gain_a: f32,
    gain_b: f32,
) {
    for k in 0..frames {
        let n = (start_index + k) as i64;
        let (sa, sb) = match channels {
            Channels::Mono(ch) => {
                let s = sample_at(ch, sample_count, looped, n);
                (s, s)
            }
            Channels::Stereo(l, r) => (
                sample_at(l, sample_count, looped, n),
                sample_at(r, sample_count, looped, n),
            ),
        };
        out_a[write_offset + k] += sa * gain_a;
        out_b[write_offset + k] += sb * gain_b;
    }
}

/// Pitched path: for each output frame `k`, compute the fractional
/// source index `idx = sample_index + k * pitch`, linearly interpolate
/// between `floor(idx)` and `floor(idx) + 1`, and scale into the
/// accumulators. Handles reverse playback (`pitch < 0`) identically —
/// `i + 1` is simply the sample *behind* `i` in source-time when pitch is
/// negative, which is exactly the Hermite-free linear blend the design
/// calls for.
#[allow(clippy::too_many_arguments)]
pub fn mix_pitched(
    channels: &Channels,
    sample_count: usize,
    looped: bool,
    sample_index: f32,
    pitch: f32,
    frames: usize,
    out_a: &mut [f32],
    out_b: &mut [f32],
    write_offset: usize,
    gain_a: f32,
    gain_b: f32,
) {
    for k in 0..frames {
        let idx_f = sample_index + k as f32 * pitch;
        let i0f = idx_f.floor();
        let frac = idx_f - i0f;
        let i0 = i0f as i64;
        let i1 = i0 + 1;

        let (sa, sb) = match channels {
            Channels::Mono(ch) => {
                let s0 = sample_at(ch, sample_count, looped, i0);
                let s1 = sample_at(ch, sample_count, looped, i1);
                let s = (1.0 - frac) * s0 + frac * s1;
                (s, s)
            }
            Channels::Stereo(l, r) => {
                let l0 = sample_at(l, sample_count, looped, i0);
                let l1 = sample_at(l, sample_count, looped, i1);
                let r0 = sample_at(r, sample_count, looped, i0);
                let r1 = sample_at(r, sample_count, looped, i1);
                (
                    (1.0 - frac) * l0 + frac * l1,
                    (1.0 - frac) * r0 + frac * r1,
                )
            }
        };
        out_a[write_offset + k] += sa * gain_a;
        out_b[write_offset + k] += sb * gain_b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_manager::AlignedF32Buffer;

    fn mono_source(samples: &[f32]) -> AudioSource {
        let mut buf = AlignedF32Buffer::zeroed(samples.len());
        buf.copy_from_slice(samples);
        AudioSource::new(44100, 1, vec![buf])
    }

    #[test]
    fn simple_path_copies_samples_with_gain() {
        let src = mono_source(&[1.0, 2.0, 3.0, 4.0]);
        let channels = Channels::of(&src);
        let mut a = vec![0.0; 4];
        let mut b = vec![0.0; 4];
        mix_simple(&channels, src.sample_count, false, 0, 4, &mut a, &mut b, 0, 0.5, 0.25);
        assert_eq!(a, vec![0.5, 1.0, 1.5, 2.0]);
        assert_eq!(b, vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn pitched_end_of_buffer_reads_silence_not_repeat() {
        let src = mono_source(&[10.0, 20.0]);
        let channels = Channels::of(&src);
        let mut a = vec![0.0; 1];
        let mut b = vec![0.0; 1];
        // sample_index = 1.5, pitch = 1.0 -> reads between index 1 (20.0) and
        // index 2 (out of range, silence): expect 0.5*20 + 0.5*0 = 10.0
        mix_pitched(&channels, src.sample_count, false, 1.5, 1.0, 1, &mut a, &mut b, 0, 1.0, 1.0);
        assert_eq!(a[0], 10.0);
    }

    #[test]
    fn looped_wraps_at_boundary() {
        let src = mono_source(&[1.0, 2.0, 3.0]);
        let channels = Channels::of(&src);
        let mut a = vec![0.0; 1];
        let mut b = vec![0.0; 1];
        // index 2.5 wraps the upper sample to index 0
        mix_pitched(&channels, src.sample_count, true, 2.5, 1.0, 1, &mut a, &mut b, 0, 1.0, 1.0);
        assert_eq!(a[0], 0.5 * 3.0 + 0.5 * 1.0);
    }

    #[test]
    fn reverse_playback_reads_backwards() {
        let src = mono_source(&[1.0, 2.0, 3.0, 4.0]);
        let channels = Channels::of(&src);
        let mut a = vec![0.0; 3];
        let mut b = vec![0.0; 3];
        mix_pitched(&channels, src.sample_count, false, 3.0, -1.0, 3, &mut a, &mut b, 0, 1.0, 1.0);
        assert_eq!(a, vec![4.0, 3.0, 2.0]);
    }

    #[test]
    fn stereo_channels_are_interpolated_independently() {
        let mut l = AlignedF32Buffer::zeroed(2);
        l.copy_from_slice(&[10.0, 20.0]);
        let mut r = AlignedF32Buffer::zeroed(2);
        r.copy_from_slice(&[-10.0, -20.0]);
        let src = AudioSource::new(44100, 2, vec![l, r]);
        let channels = Channels::of(&src);
        let mut a = vec![0.0; 1];
        let mut b = vec![0.0; 1];
        mix_pitched(&channels, src.sample_count, false, 0.5, 1.0, 1, &mut a, &mut b, 0, 1.0, 1.0);
        assert_eq!(a[0], 15.0);
        assert_eq!(b[0], -15.0);
    }
}

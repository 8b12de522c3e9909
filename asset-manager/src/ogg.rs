//! Adapter for the external OGG decoder collaborator (§6).
//!
//! OGG decoding itself is out of scope: callers run their own Vorbis
//! decoder and hand this module the resulting interleaved 16-bit PCM. This
//! module only de-interleaves and zero-pads the result identically to the
//! WAV path, so the mixer never has to know which decoder produced a
//! source.

use crate::aligned::AlignedF32Buffer;
use crate::error::Error;
use crate::source::AudioSource;

/// Build an [`AudioSource`] from an externally-decoded OGG stream.
///
/// `interleaved` holds `sample_count * channel_count` 16-bit samples.
pub fn from_ogg_decoded(
    interleaved: &[i16],
    sample_count: usize,
    channel_count: u16,
    sample_rate: u32,
) -> Result<AudioSource, Error> {
    if channel_count != 1 && channel_count != 2 {
        return Err(Error::OggUnsupportedChannelCount(channel_count));
    }
    let expected = sample_count
        .checked_mul(channel_count as usize)
        .ok_or_else(|| Error::OggDecodeFailed("sample count overflow".into()))?;
    if interleaved.len() < expected {
        return Err(Error::OggDecodeFailed(
            "decoded buffer shorter than advertised sample count".into(),
        ));
    }

    let mut channels: Vec<AlignedF32Buffer> = (0..channel_count)
        .map(|_| AlignedF32Buffer::zeroed(sample_count))
        .collect();

    if channel_count == 1 {
        let ch = &mut channels[0];
        for (i, s) in interleaved[..sample_count].iter().enumerate() {
            ch[i] = *s as f32;
        }
    } else {
        let (left, right) = channels.split_at_mut(1);
        let left = &mut left[0];
        let right = &mut right[0];
        for i in 0..sample_count {
            left[i] = interleaved[i * 2] as f32;
            right[i] = interleaved[i * 2 + 1] as f32;
        }
    }

    Ok(AudioSource::new(sample_rate, channel_count, channels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deinterleaves_stereo() {
        let interleaved = [1i16, -1, 2, -2, 3, -3];
        let src = from_ogg_decoded(&interleaved, 3, 2, 48000).unwrap();
        assert_eq!(src.channel(0), &[1.0, 2.0, 3.0]);
        assert_eq!(src.channel(1), &[-1.0, -2.0, -3.0]);
    }

    #[test]
    fn rejects_bad_channel_count() {
        let err = from_ogg_decoded(&[0, 0, 0], 1, 3, 48000).unwrap_err();
        assert!(matches!(err, Error::OggUnsupportedChannelCount(3)));
    }

    #[test]
    fn rejects_truncated_buffer() {
        let err = from_ogg_decoded(&[1, 2], 2, 2, 48000).unwrap_err();
        assert!(matches!(err, Error::OggDecodeFailed(_)));
    }
}

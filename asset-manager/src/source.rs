use std::sync::atomic::{AtomicUsize, Ordering};

use crate::aligned::AlignedF32Buffer;

/// An immutable decoded audio buffer plus its metadata.
///
/// `channels` holds one buffer for mono sources or two for stereo; each
/// buffer is 16-byte aligned and padded to a multiple of 4 samples per
/// [`AlignedF32Buffer`]. Samples are stored pre-scaled to the same "16-bit
/// scaled float" range the mixer and resampler operate on, so the mixer
/// never has to know which decoder produced a given source.
///
/// `playing_count` tracks how many live instances currently reference this
/// source. Per the concurrency model, every mutation of it happens while
/// the caller holds the engine lock; the field itself is an atomic only so
/// that an `Arc<AudioSource>` shared with the deferred-free queue can be
/// read without re-threading the lock through this leaf crate.
#[derive(Debug)]
pub struct AudioSource {
    pub sample_rate: u32,
    pub sample_count: usize,
    pub channel_count: u16,
    channels: Vec<AlignedF32Buffer>,
    playing_count: AtomicUsize,
}

impl AudioSource {
    /// Construct a source directly from already-decoded, pre-scaled
    /// channel buffers. Decoders (`wav`, `ogg`) are the usual callers, but
    /// this is `pub` so embedders with their own decode pipeline (e.g. a
    /// streaming format this crate doesn't parse) can still produce a
    /// source the engine understands.
    pub fn new(sample_rate: u32, channel_count: u16, channels: Vec<AlignedF32Buffer>) -> Self {
        let sample_count = channels.first().map(|c| c.len()).unwrap_or(0);
        debug_assert!(channels.iter().all(|c| c.len() == sample_count));
        Self {
            sample_rate,
            sample_count,
            channel_count,
            channels,
            playing_count: AtomicUsize::new(0),
        }
    }

    /// Borrow channel `index` (0 = left/mono, 1 = right). Panics if `index`
    /// is out of range for `channel_count`.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Borrow channel `index` including its zero-padded tail lanes, for the
    /// mixer's SIMD-width reads.
    pub fn channel_padded(&self, index: usize) -> &[f32] {
        self.channels[index].as_padded_slice()
    }

    pub fn playing_count(&self) -> usize {
        self.playing_count.load(Ordering::Acquire)
    }

    /// Called by the controller under the engine lock when an instance
    /// starts referencing this source.
    pub fn incr_playing(&self) {
        self.playing_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Called by the mixer/controller under the engine lock when an
    /// instance referencing this source ends or is stopped.
    pub fn decr_playing(&self) {
        self.playing_count.fetch_sub(1, Ordering::AcqRel);
    }

    /// True once no live instance references this source, i.e. it is safe
    /// to actually free.
    pub fn is_unreferenced(&self) -> bool {
        self.playing_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligned::AlignedF32Buffer;

    #[test]
    fn ref_counting() {
        let buf = AlignedF32Buffer::zeroed(4);
        let src = AudioSource::new(44100, 1, vec![buf]);
        assert!(src.is_unreferenced());
        src.incr_playing();
        src.incr_playing();
        assert_eq!(src.playing_count(), 2);
        assert!(!src.is_unreferenced());
        src.decr_playing();
        src.decr_playing();
        assert!(src.is_unreferenced());
    }
}

//! Decoded-audio data model and format decoders for the mixing engine.
//!
//! Owns the pieces that produce and hold an immutable [`AudioSource`]:
//! the 16-byte-aligned allocator, the WAV parser, and the thin adapter
//! over an externally-decoded OGG stream. Everything here is read-only
//! once constructed — mutation (playing-instance state, the engine lock)
//! lives in `audio-engine`.

pub mod aligned;
pub mod error;
pub mod ogg;
pub mod source;
pub mod wav;

pub use aligned::AlignedF32Buffer;
pub use error::Error;
pub use source::AudioSource;
pub use wav::{decode_wav, decode_wav_file};

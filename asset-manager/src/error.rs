use thiserror::Error;

/// Errors surfaced by asset loading and decoding.
///
/// Decoder failures never allocate anything that needs releasing: a failed
/// `decode_wav` / `from_ogg_decoded` call leaves no partially-constructed
/// [`crate::source::AudioSource`] behind.
#[derive(Error, Debug)]
pub enum Error {
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sound data is invalid")]
    InvalidSound,
    #[error("not a RIFF/WAVE file")]
    FileIsNotWav,
    #[error("no 'fmt ' chunk found")]
    FormatChunkNotFound,
    #[error("no 'data' chunk found")]
    DataChunkNotFound,
    #[error("only mono or stereo audio is supported")]
    OnlyMonoOrStereo,
    #[error("unsupported sample format: tag={tag} bits_per_sample={bits}")]
    UnsupportedFormat { tag: u16, bits: u16 },
    #[error("ogg decode failed: {0}")]
    OggDecodeFailed(String),
    #[error("ogg decoder returned an unsupported channel count: {0}")]
    OggUnsupportedChannelCount(u16),
}

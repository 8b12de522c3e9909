use thiserror::Error;

/// Errors surfaced by the mixing engine's public API.
///
/// Per the error-handling design, id-based mutators on a stale or unknown
/// id are *not* errors — they are defined no-ops. Only parameter-range and
/// state-machine violations reach this type.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    #[error("requested sample index is past the end of the source")]
    SampleIndexOutOfRange,
    #[error("cannot switch music while the music channel is paused")]
    CannotSwitchMusicWhilePaused,
    #[error("cannot crossfade while the music channel is paused")]
    CannotCrossfadeWhileMusicPaused,
    #[error("cannot fade out while the music channel is paused")]
    CannotFadeOutWhileMusicPaused,
    #[error("internal engine invariant violated")]
    ImplementationError,
}

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong in the engine, surfaced to callers as `Result<T, AudioError>`.
///
/// `NoFreeVoice` deliberately has no variant here: per the propagation policy, running out of
/// SFX voices is not an error in the taxonomy sense, it is reported as a plain `bool`.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("could not open audio file {path}: {source}")]
    AudioOpenFailed {
        path: PathBuf,
        #[source]
        source: VorbisOpenError,
    },

    #[error("unsupported channel count {channel_count} in {path} (only mono and stereo are supported)")]
    UnsupportedChannelCount { path: PathBuf, channel_count: u8 },

    #[error("output backend error during {operation}: {detail}")]
    BackendError { operation: &'static str, detail: String },

    #[error("no BGM is currently prebaked/loaded")]
    NoBgmLoaded,
}

/// The underlying cause of a failed Vorbis file open, kept distinct from [`AudioError`] so the
/// adapter module has no dependency on the facade's error type.
#[derive(Debug, Error)]
pub enum VorbisOpenError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vorbis decode error: {0}")]
    Decode(#[from] lewton::VorbisError),
}

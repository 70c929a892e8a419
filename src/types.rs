//! Small value types shared by the backend, the stream player, and the SFX mixer.

/// PCM layout the backend is asked to interpret an uploaded buffer as.
///
/// Only mono and stereo 16-bit little-endian interleaved are ever produced by the Vorbis
/// adapter, so those are the only two tags that exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Mono16,
    Stereo16,
}

impl SampleFormat {
    pub fn from_channel_count(channel_count: u8) -> Option<Self> {
        match channel_count {
            1 => Some(SampleFormat::Mono16),
            2 => Some(SampleFormat::Stereo16),
            _ => None,
        }
    }

    pub fn channel_count(self) -> u8 {
        match self {
            SampleFormat::Mono16 => 1,
            SampleFormat::Stereo16 => 2,
        }
    }

    /// Bytes per interleaved PCM frame (channels * sizeof(i16)).
    pub fn frame_bytes(self) -> usize {
        self.channel_count() as usize * 2
    }
}

/// Mirrors the four states a backend voice/source can report.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    #[default]
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// What a single `decode_into_scratch` call discovered while filling the scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferFillOutcome {
    Normal,
    ReachedEndOfFile,
    ReachedLoopEnd,
}

/// Opaque handle to a buffer created through [`crate::backend::OutputBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u32);

/// Opaque handle to a voice/source created through [`crate::backend::OutputBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle(pub(crate) u32);

/// Opaque handle returned by [`crate::sfx_mixer::SfxMixer::load`] through the facade; identifies a
/// loaded [`crate::sfx_mixer::SfxAsset`] without exposing ownership of it to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SfxHandle(pub(crate) u64);

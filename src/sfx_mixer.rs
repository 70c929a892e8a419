//! Fixed-capacity one-shot SFX mixer: up to [`N_SFX`] short sounds playing concurrently, each
//! fully decoded into memory up front since one-shots are short enough that streaming them would
//! only add refill-tick overhead for no benefit.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::backend::OutputBackend;
use crate::containers::{ActiveVoiceSet, FreeVoicePool};
use crate::error::AudioError;
use crate::types::{BufferHandle, SampleFormat, VoiceHandle, VoiceState};
use crate::vorbis::{OpenVorbisFn, VorbisSource};

/// Maximum number of one-shot SFX instances that may be in flight at once, matching the
/// reference's `MAX_SFX_SOUNDS`.
pub const N_SFX: usize = 10;

/// A fully-decoded one-shot sound, ready to be handed to any free voice.
pub struct SfxAsset {
    path: PathBuf,
    pcm: Vec<u8>,
    format: SampleFormat,
    sample_rate: u32,
}

impl SfxAsset {
    pub fn load(path: &Path, open_source: &mut OpenVorbisFn) -> Result<Self, AudioError> {
        let mut source = open_source(path).map_err(|source| AudioError::AudioOpenFailed {
            path: path.to_path_buf(),
            source,
        })?;

        let channel_count = source.channel_count();
        let format = SampleFormat::from_channel_count(channel_count).ok_or(
            AudioError::UnsupportedChannelCount {
                path: path.to_path_buf(),
                channel_count,
            },
        )?;
        let sample_rate = source.sample_rate();

        let mut pcm = Vec::new();
        let mut chunk = vec![0u8; 4096];
        loop {
            let n = source
                .read(&mut chunk)
                .map_err(|e| AudioError::BackendError {
                    operation: "sfx decode",
                    detail: e.to_string(),
                })?;
            if n == 0 {
                break;
            }
            pcm.extend_from_slice(&chunk[..n]);
        }

        Ok(Self { path: path.to_path_buf(), pcm, format, sample_rate })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

struct SfxVoice {
    buffer: BufferHandle,
    voice: VoiceHandle,
}

pub struct SfxMixer {
    voices: Vec<SfxVoice>,
    free: FreeVoicePool,
    active: ActiveVoiceSet,
}

impl SfxMixer {
    pub fn new(backend: &mut dyn OutputBackend) -> Self {
        let buffers = backend.create_buffers(N_SFX);
        let voice_handles = backend.create_voices(N_SFX);

        let voices = buffers
            .into_iter()
            .zip(voice_handles)
            .map(|(buffer, voice)| {
                backend.place_2d(voice);
                SfxVoice { buffer, voice }
            })
            .collect();

        Self {
            voices,
            free: FreeVoicePool::new(N_SFX),
            active: ActiveVoiceSet::new(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Every voice this mixer owns, for applying a default gain at construction time before any
    /// sound has been played.
    pub(crate) fn voice_handles(&self) -> impl Iterator<Item = VoiceHandle> + '_ {
        self.voices.iter().map(|v| v.voice)
    }

    /// Plays `asset` on the next free voice. Returns `false`, logging at debug level, if every
    /// voice is already busy — this is an expected runtime condition, not an error.
    pub fn play(
        &mut self,
        backend: &mut dyn OutputBackend,
        asset: &SfxAsset,
        gain: f32,
    ) -> Result<bool, AudioError> {
        let slot_index = match self.free.pop() {
            Some(i) => i,
            None => {
                debug!(path = %asset.path.display(), "no free sfx voice, dropping one-shot");
                return Ok(false);
            }
        };

        let slot = &self.voices[slot_index];
        backend.rewind(slot.voice);
        backend.set_gain(slot.voice, gain.max(0.0));

        if let Err(detail) = backend.upload(slot.buffer, &asset.pcm, asset.format, asset.sample_rate) {
            self.free.push(slot_index);
            return Err(AudioError::BackendError { operation: "sfx upload", detail });
        }
        if let Err(detail) = backend.enqueue(slot.voice, &[slot.buffer]) {
            self.free.push(slot_index);
            return Err(AudioError::BackendError { operation: "sfx enqueue", detail });
        }
        if let Err(detail) = backend.play(slot.voice) {
            self.free.push(slot_index);
            return Err(AudioError::BackendError { operation: "sfx play", detail });
        }

        self.active.push(slot_index);
        Ok(true)
    }

    /// Retires any voice that has finished playing, returning it to the free pool.
    pub fn tick(&mut self, backend: &mut dyn OutputBackend) {
        let finished: Vec<usize> = self
            .active
            .iter()
            .filter(|&i| {
                let voice = self.voices[i].voice;
                let drained = backend.voice_state(voice) == VoiceState::Stopped
                    && backend.queued_count(voice) == 0;
                let _ = backend.dequeue_consumed(voice);
                drained
            })
            .collect();

        for i in finished {
            self.active.remove(i);
            self.free.push(i);
        }
    }

    /// Stops and destroys every SFX voice and buffer. Called only from engine shutdown.
    pub fn close(mut self, backend: &mut dyn OutputBackend) {
        for slot_index in self.active.iter().collect::<Vec<_>>() {
            backend.stop(self.voices[slot_index].voice);
        }
        for slot in self.voices.drain(..) {
            backend.destroy_voice(slot.voice);
            backend.destroy_buffer(slot.buffer);
        }
    }
}

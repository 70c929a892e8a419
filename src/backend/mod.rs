//! Output backend adapter: the seam between the engine and the host audio device.
//!
//! The engine talks to this exclusively through the [`OutputBackend`] trait, modelled after a
//! classic OpenAL-style buffer-queue source. The production implementation ([`cpal_backend`]) has
//! to simulate that queueing itself, because portable audio I/O crates like `cpal` hand you a
//! single realtime callback rather than a device-managed buffer queue.

mod cpal_backend;

pub use cpal_backend::CpalBackend;

use crate::types::{BufferHandle, SampleFormat, VoiceHandle, VoiceState};

/// Everything the stream player and SFX mixer need from the output device.
///
/// All operations are synchronous from the caller's point of view. Fallible operations report
/// failure as `Err(String)` (a driver error description) rather than a typed error, matching the
/// reference's "boolean plus a last-error code" — the facade is responsible for turning that into
/// an [`crate::error::AudioError::BackendError`] where the specification calls for one.
pub trait OutputBackend {
    fn create_buffers(&mut self, count: usize) -> Vec<BufferHandle>;
    fn create_voices(&mut self, count: usize) -> Vec<VoiceHandle>;
    fn destroy_buffer(&mut self, buffer: BufferHandle);
    fn destroy_voice(&mut self, voice: VoiceHandle);

    /// Places the voice at the origin, relative to the listener, with rolloff disabled. The
    /// engine is effectively 2D, so this is the only spatial configuration any voice ever gets.
    fn place_2d(&mut self, voice: VoiceHandle);
    fn set_gain(&mut self, voice: VoiceHandle, gain: f32);

    fn upload(
        &mut self,
        buffer: BufferHandle,
        data: &[u8],
        format: SampleFormat,
        sample_rate: u32,
    ) -> Result<(), String>;

    fn enqueue(&mut self, voice: VoiceHandle, buffers: &[BufferHandle]) -> Result<(), String>;
    /// Removes and returns buffers the voice has finished playing, in FIFO order.
    fn dequeue_consumed(&mut self, voice: VoiceHandle) -> Vec<BufferHandle>;

    fn voice_state(&self, voice: VoiceHandle) -> VoiceState;
    fn consumed_count(&self, voice: VoiceHandle) -> usize;
    fn queued_count(&self, voice: VoiceHandle) -> usize;

    fn play(&mut self, voice: VoiceHandle) -> Result<(), String>;
    fn pause(&mut self, voice: VoiceHandle);
    fn stop(&mut self, voice: VoiceHandle);
    /// Resets playback position to the start of the queue and clears the current buffer binding,
    /// without destroying the queued buffer handles themselves.
    fn rewind(&mut self, voice: VoiceHandle);
}

#[cfg(any(test, feature = "test-support"))]
pub mod mock {
    //! An in-memory [`OutputBackend`] double. Buffers "play out" instantly and deterministically
    //! under the control of the test, rather than in realtime on an audio thread — tests advance
    //! playback explicitly with [`MockBackend::consume`] to simulate buffers the driver has
    //! finished playing.

    use std::collections::HashMap;

    use super::*;

    #[derive(Default)]
    struct MockVoice {
        queue: Vec<BufferHandle>,
        consumed: Vec<BufferHandle>,
        state: VoiceState,
        gain: f32,
    }

    #[derive(Default)]
    pub struct MockBackend {
        next_buffer_id: u32,
        next_voice_id: u32,
        buffer_sizes: HashMap<u32, usize>,
        voices: HashMap<u32, MockVoice>,
        pub fail_next_upload: bool,
        pub fail_next_play: bool,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Simulates the driver having fully played `count` buffers at the front of `voice`'s
        /// queue: moves them from queued to consumed, and — if the queue is drained — reports the
        /// voice as `Stopped`, exactly like a real source/voice that ran out of buffers.
        /// The gain last set on `voice`, for asserting on it directly in tests.
        pub fn gain_of(&self, voice: VoiceHandle) -> f32 {
            self.voices.get(&voice.0).expect("unknown voice").gain
        }

        pub fn consume(&mut self, voice: VoiceHandle, count: usize) {
            let v = self.voices.get_mut(&voice.0).expect("unknown voice");
            for _ in 0..count {
                if v.queue.is_empty() {
                    break;
                }
                let buf = v.queue.remove(0);
                v.consumed.push(buf);
            }
            if v.queue.is_empty() && v.state == VoiceState::Playing {
                v.state = VoiceState::Stopped;
            }
        }
    }

    impl OutputBackend for MockBackend {
        fn create_buffers(&mut self, count: usize) -> Vec<BufferHandle> {
            (0..count)
                .map(|_| {
                    let id = self.next_buffer_id;
                    self.next_buffer_id += 1;
                    self.buffer_sizes.insert(id, 0);
                    BufferHandle(id)
                })
                .collect()
        }

        fn create_voices(&mut self, count: usize) -> Vec<VoiceHandle> {
            (0..count)
                .map(|_| {
                    let id = self.next_voice_id;
                    self.next_voice_id += 1;
                    self.voices.insert(id, MockVoice { gain: 1.0, ..Default::default() });
                    VoiceHandle(id)
                })
                .collect()
        }

        fn destroy_buffer(&mut self, buffer: BufferHandle) {
            self.buffer_sizes.remove(&buffer.0);
        }

        fn destroy_voice(&mut self, voice: VoiceHandle) {
            self.voices.remove(&voice.0);
        }

        fn place_2d(&mut self, _voice: VoiceHandle) {}

        fn set_gain(&mut self, voice: VoiceHandle, gain: f32) {
            if let Some(v) = self.voices.get_mut(&voice.0) {
                v.gain = gain;
            }
        }

        fn upload(
            &mut self,
            buffer: BufferHandle,
            data: &[u8],
            _format: SampleFormat,
            _sample_rate: u32,
        ) -> Result<(), String> {
            if self.fail_next_upload {
                self.fail_next_upload = false;
                return Err("simulated upload failure".into());
            }
            *self.buffer_sizes.get_mut(&buffer.0).ok_or("unknown buffer")? = data.len();
            Ok(())
        }

        fn enqueue(&mut self, voice: VoiceHandle, buffers: &[BufferHandle]) -> Result<(), String> {
            let v = self.voices.get_mut(&voice.0).ok_or("unknown voice")?;
            v.queue.extend_from_slice(buffers);
            Ok(())
        }

        fn dequeue_consumed(&mut self, voice: VoiceHandle) -> Vec<BufferHandle> {
            match self.voices.get_mut(&voice.0) {
                Some(v) => std::mem::take(&mut v.consumed),
                None => Vec::new(),
            }
        }

        fn voice_state(&self, voice: VoiceHandle) -> VoiceState {
            self.voices.get(&voice.0).map(|v| v.state).unwrap_or(VoiceState::Initial)
        }

        fn consumed_count(&self, voice: VoiceHandle) -> usize {
            self.voices.get(&voice.0).map(|v| v.consumed.len()).unwrap_or(0)
        }

        fn queued_count(&self, voice: VoiceHandle) -> usize {
            self.voices.get(&voice.0).map(|v| v.queue.len()).unwrap_or(0)
        }

        fn play(&mut self, voice: VoiceHandle) -> Result<(), String> {
            if self.fail_next_play {
                self.fail_next_play = false;
                return Err("simulated play failure".into());
            }
            let v = self.voices.get_mut(&voice.0).ok_or("unknown voice")?;
            v.state = VoiceState::Playing;
            Ok(())
        }

        fn pause(&mut self, voice: VoiceHandle) {
            if let Some(v) = self.voices.get_mut(&voice.0) {
                if v.state == VoiceState::Playing {
                    v.state = VoiceState::Paused;
                }
            }
        }

        fn stop(&mut self, voice: VoiceHandle) {
            if let Some(v) = self.voices.get_mut(&voice.0) {
                v.state = VoiceState::Stopped;
                v.queue.clear();
                v.consumed.clear();
            }
        }

        fn rewind(&mut self, voice: VoiceHandle) {
            if let Some(v) = self.voices.get_mut(&voice.0) {
                v.state = VoiceState::Initial;
                v.queue.clear();
                v.consumed.clear();
            }
        }
    }
}

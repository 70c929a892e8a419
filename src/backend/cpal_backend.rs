//! Real [`super::OutputBackend`] built on `cpal`. `cpal` gives us a single realtime callback per
//! device rather than a device-managed buffer queue, so this module plays the role the driver
//! plays in the reference implementation: it simulates per-voice buffer queues and mixes every
//! playing voice into the one output stream, following the same "zero, mix, apply gain, clamp"
//! shape as the donor crate's output callback.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat as CpalSampleFormat, Stream, StreamConfig};

use crate::types::{BufferHandle, SampleFormat, VoiceHandle, VoiceState};

use super::OutputBackend;

struct BufferSlot {
    data: Vec<u8>,
}

struct VoiceSlot {
    /// Buffer ids queued for playback, front is currently playing (or about to be).
    queue: VecDeque<u32>,
    /// Buffer ids the mixing thread has fully played and is waiting for the control thread to
    /// collect via `dequeue_consumed`.
    consumed: Vec<u32>,
    state: VoiceState,
    gain: f32,
    /// Byte offset into the front-of-queue buffer's PCM data.
    read_pos: usize,
}

impl Default for VoiceSlot {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            consumed: Vec::new(),
            state: VoiceState::Initial,
            gain: 1.0,
            read_pos: 0,
        }
    }
}

#[derive(Default)]
struct Shared {
    buffers: HashMap<u32, BufferSlot>,
    voices: HashMap<u32, VoiceSlot>,
    channels: u16,
}

/// Production output backend. Owns a live `cpal` output stream for as long as it exists.
pub struct CpalBackend {
    shared: Arc<Mutex<Shared>>,
    _stream: Stream,
    next_buffer_id: AtomicU32,
    next_voice_id: AtomicU32,
}

impl CpalBackend {
    /// Opens the named output device, or the host default if `device_name` is `None`.
    pub fn new(device_name: Option<&str>) -> Result<Self, String> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| e.to_string())?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| format!("output device not found: {name}"))?,
            None => host
                .default_output_device()
                .ok_or("no default output device available")?,
        };

        let supported = device
            .default_output_config()
            .map_err(|e| format!("no supported output config: {e}"))?;
        if supported.sample_format() != CpalSampleFormat::F32 {
            tracing::debug!(format = ?supported.sample_format(), "device native format is not f32, requesting f32 anyway");
        }

        let config: StreamConfig = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::new(Mutex::new(Shared {
            channels: config.channels,
            ..Default::default()
        }));
        let callback_shared = Arc::clone(&shared);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for s in data.iter_mut() {
                        *s = 0.0;
                    }
                    if let Ok(mut shared) = callback_shared.try_lock() {
                        mix_into(&mut shared, data);
                    }
                    for s in data.iter_mut() {
                        *s = s.clamp(-1.0, 1.0);
                    }
                },
                |err| tracing::warn!(error = %err, "output stream error"),
                None,
            )
            .map_err(|e| format!("failed to build output stream: {e}"))?;

        stream.play().map_err(|e| format!("failed to start output stream: {e}"))?;

        Ok(Self {
            shared,
            _stream: stream,
            next_buffer_id: AtomicU32::new(0),
            next_voice_id: AtomicU32::new(0),
        })
    }
}

/// Mixes every `Playing` voice's queued PCM into `out` (interleaved f32, device channel count),
/// moving fully-consumed buffers from `queue` to `consumed` as playback advances past them.
fn mix_into(shared: &mut Shared, out: &mut [f32]) {
    // Every source byte pair is one i16 sample; with no resampling/channel-mapping in scope, each
    // decoded sample is simply fanned out across all device output channels.
    const SRC_FRAME_BYTES: usize = 2;
    let device_channels = shared.channels.max(1) as usize;
    let voice_ids: Vec<u32> = shared.voices.keys().copied().collect();

    for voice_id in voice_ids {
        if shared.voices[&voice_id].state != VoiceState::Playing {
            continue;
        }

        let mut out_idx = 0;
        while out_idx < out.len() {
            let voice = shared.voices.get(&voice_id).unwrap();
            let buf_id = match voice.queue.front().copied() {
                Some(id) => id,
                None => break,
            };
            let read_pos = voice.read_pos;
            let gain = voice.gain;

            let buf_len = match shared.buffers.get(&buf_id) {
                Some(b) => b.data.len(),
                None => break,
            };
            if buf_len.saturating_sub(read_pos) < SRC_FRAME_BYTES {
                let voice = shared.voices.get_mut(&voice_id).unwrap();
                voice.queue.pop_front();
                voice.consumed.push(buf_id);
                voice.read_pos = 0;
                if voice.queue.is_empty() {
                    voice.state = VoiceState::Stopped;
                    break;
                }
                continue;
            }

            let data = &shared.buffers[&buf_id].data;
            let sample = i16::from_le_bytes([data[read_pos], data[read_pos + 1]]) as f32 / i16::MAX as f32;

            for ch in 0..device_channels {
                if out_idx + ch < out.len() {
                    out[out_idx + ch] += sample * gain;
                }
            }
            out_idx += device_channels;
            shared.voices.get_mut(&voice_id).unwrap().read_pos += SRC_FRAME_BYTES;
        }
    }
}

impl OutputBackend for CpalBackend {
    fn create_buffers(&mut self, count: usize) -> Vec<BufferHandle> {
        let mut shared = self.shared.lock().expect("backend mutex poisoned");
        (0..count)
            .map(|_| {
                let id = self.next_buffer_id.fetch_add(1, Ordering::Relaxed);
                shared.buffers.insert(id, BufferSlot { data: Vec::new() });
                BufferHandle(id)
            })
            .collect()
    }

    fn create_voices(&mut self, count: usize) -> Vec<VoiceHandle> {
        let mut shared = self.shared.lock().expect("backend mutex poisoned");
        (0..count)
            .map(|_| {
                let id = self.next_voice_id.fetch_add(1, Ordering::Relaxed);
                shared.voices.insert(id, VoiceSlot::default());
                VoiceHandle(id)
            })
            .collect()
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.shared.lock().expect("backend mutex poisoned").buffers.remove(&buffer.0);
    }

    fn destroy_voice(&mut self, voice: VoiceHandle) {
        self.shared.lock().expect("backend mutex poisoned").voices.remove(&voice.0);
    }

    fn place_2d(&mut self, _voice: VoiceHandle) {
        // Every voice is already implicitly at the origin, relative, with no rolloff: this
        // backend never models 3D attenuation at all, so there is nothing to set.
    }

    fn set_gain(&mut self, voice: VoiceHandle, gain: f32) {
        let mut shared = self.shared.lock().expect("backend mutex poisoned");
        if let Some(v) = shared.voices.get_mut(&voice.0) {
            v.gain = gain.max(0.0);
        }
    }

    fn upload(
        &mut self,
        buffer: BufferHandle,
        data: &[u8],
        _format: SampleFormat,
        _sample_rate: u32,
    ) -> Result<(), String> {
        let mut shared = self.shared.lock().expect("backend mutex poisoned");
        let slot = shared.buffers.get_mut(&buffer.0).ok_or("unknown buffer")?;
        slot.data.clear();
        slot.data.extend_from_slice(data);
        Ok(())
    }

    fn enqueue(&mut self, voice: VoiceHandle, buffers: &[BufferHandle]) -> Result<(), String> {
        let mut shared = self.shared.lock().expect("backend mutex poisoned");
        let v = shared.voices.get_mut(&voice.0).ok_or("unknown voice")?;
        v.queue.extend(buffers.iter().map(|b| b.0));
        Ok(())
    }

    fn dequeue_consumed(&mut self, voice: VoiceHandle) -> Vec<BufferHandle> {
        let mut shared = self.shared.lock().expect("backend mutex poisoned");
        match shared.voices.get_mut(&voice.0) {
            Some(v) => std::mem::take(&mut v.consumed).into_iter().map(BufferHandle).collect(),
            None => Vec::new(),
        }
    }

    fn voice_state(&self, voice: VoiceHandle) -> VoiceState {
        let shared = self.shared.lock().expect("backend mutex poisoned");
        shared.voices.get(&voice.0).map(|v| v.state).unwrap_or(VoiceState::Initial)
    }

    fn consumed_count(&self, voice: VoiceHandle) -> usize {
        let shared = self.shared.lock().expect("backend mutex poisoned");
        shared.voices.get(&voice.0).map(|v| v.consumed.len()).unwrap_or(0)
    }

    fn queued_count(&self, voice: VoiceHandle) -> usize {
        let shared = self.shared.lock().expect("backend mutex poisoned");
        shared.voices.get(&voice.0).map(|v| v.queue.len()).unwrap_or(0)
    }

    fn play(&mut self, voice: VoiceHandle) -> Result<(), String> {
        let mut shared = self.shared.lock().expect("backend mutex poisoned");
        let v = shared.voices.get_mut(&voice.0).ok_or("unknown voice")?;
        v.state = VoiceState::Playing;
        Ok(())
    }

    fn pause(&mut self, voice: VoiceHandle) {
        let mut shared = self.shared.lock().expect("backend mutex poisoned");
        if let Some(v) = shared.voices.get_mut(&voice.0) {
            if v.state == VoiceState::Playing {
                v.state = VoiceState::Paused;
            }
        }
    }

    fn stop(&mut self, voice: VoiceHandle) {
        let mut shared = self.shared.lock().expect("backend mutex poisoned");
        if let Some(v) = shared.voices.get_mut(&voice.0) {
            v.state = VoiceState::Stopped;
            v.queue.clear();
            v.consumed.clear();
            v.read_pos = 0;
        }
    }

    fn rewind(&mut self, voice: VoiceHandle) {
        let mut shared = self.shared.lock().expect("backend mutex poisoned");
        if let Some(v) = shared.voices.get_mut(&voice.0) {
            v.state = VoiceState::Initial;
            v.queue.clear();
            v.consumed.clear();
            v.read_pos = 0;
        }
    }
}

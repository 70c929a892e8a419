//! Streaming background-music player with custom loop points, plus a fixed-capacity one-shot
//! sound-effect mixer, sharing one output device.
//!
//! The engine is driven entirely by a per-frame [`Engine::tick`] call from the host: there is no
//! internal scheduling thread on the control-flow side, only the realtime audio callback the
//! output backend runs to actually push samples to the device.
//!
//! # Quick start
//! ```no_run
//! use bgm_engine::{Engine, EngineConfig};
//!
//! let mut engine = Engine::initialize(EngineConfig::default()).unwrap();
//! let bgm = engine.load_bgm("assets/theme.ogg", Some(20.397), Some(43.08));
//! engine.play_bgm(&bgm, 1.0);
//!
//! let blip = engine.load_sfx("assets/blip.ogg").unwrap();
//! engine.play_sfx_oneshot(blip, 1.0);
//!
//! loop {
//!     engine.tick();
//!     # break;
//! }
//! engine.shutdown();
//! ```
//!
//! # Module map
//! - [`backend`] — the output-device adapter seam ([`backend::OutputBackend`]) and its `cpal`
//!   implementation.
//! - [`vorbis`] — the Vorbis source adapter seam ([`vorbis::VorbisSource`]) and its `lewton`
//!   implementation.
//! - [`containers`] — the free-voice pool and active-voice set used by the SFX mixer.
//! - [`stream_player`] — the streaming BGM player and its loop-point refill algorithm.
//! - [`sfx_mixer`] — the fixed-capacity one-shot SFX mixer.
//! - [`config`] / [`error`] / [`types`] — ambient configuration, error, and value types.
//!
//! [`Engine`] is the only type most hosts need to touch directly.

pub mod backend;
pub mod config;
pub mod containers;
pub mod error;
mod facade;
pub mod sfx_mixer;
pub mod stream_player;
pub mod types;
pub mod vorbis;

pub use config::EngineConfig;
pub use error::AudioError;
pub use facade::{BgmDescriptor, Engine};
pub use types::SfxHandle;

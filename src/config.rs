//! Engine configuration, loaded from a JSON file or constructed in code and passed to
//! [`crate::facade::Engine::initialize`].

use serde::{Deserialize, Serialize};

/// Settings resolved once at startup and held for the engine's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name of the output device to open, or `None` for the host default.
    pub output_device: Option<String>,
    /// Default gain applied to the BGM voice when the engine is constructed, before any file has
    /// been prebaked. `play_bgm` always sets its own `gain` argument on every call, so this only
    /// matters for the window between construction and the first `play_bgm`.
    pub bgm_gain: f32,
    /// Default gain applied to every SFX voice when the engine is constructed, before anything has
    /// been played. `play_sfx_oneshot` always sets its own `gain` argument on every call, so this
    /// only matters for the window between construction and the first play.
    pub sfx_gain: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_device: None,
            bgm_gain: 1.0,
            sfx_gain: 1.0,
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_full_gain_and_default_device() {
        let config = EngineConfig::default();
        assert_eq!(config.output_device, None);
        assert_eq!(config.bgm_gain, 1.0);
        assert_eq!(config.sfx_gain, 1.0);
    }

    #[test]
    fn partial_json_fills_in_remaining_defaults() {
        let config = EngineConfig::from_json(r#"{"bgm_gain": 0.5}"#).unwrap();
        assert_eq!(config.bgm_gain, 0.5);
        assert_eq!(config.sfx_gain, 1.0);
        assert_eq!(config.output_device, None);
    }
}

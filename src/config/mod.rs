//! Configuration management for beatcam
//!
//! Handles loading, parsing, and hot-reloading of the YAML configuration file.
//! Every section and field has a default, so an empty file is a valid config.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::binder::{Binding, BindingSource};
use crate::effects::EffectConfig;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub midi: MidiConfig,
    pub render: RenderConfig,
    pub media: MediaConfig,
    pub effects: Vec<EffectConfig>,
    pub bindings: Vec<Binding>,
}

/// MIDI clock input and output settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MidiConfig {
    pub enabled: bool,
    /// Client name registered with the system MIDI stack
    pub client_name: String,
    /// Channel for sends that give none; broadcast to all 16 when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_channel: Option<u8>,
    /// CC sent on off-beat edges
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_cc: Option<EdgeCcConfig>,
    /// Drive the clock from an in-process source at this tempo
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulate_bpm: Option<f64>,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            client_name: "beatcam".to_string(),
            default_channel: None,
            edge_cc: None,
            simulate_bpm: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct EdgeCcConfig {
    pub code: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Display refresh rate driving the render tick
    pub fps: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { fps: 60 }
    }
}

/// Built-in test pattern source
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MediaConfig {
    pub width: u32,
    pub height: u32,
    /// Delay before the source reports ready
    pub warmup_ms: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            warmup_ms: 0,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    /// Parse and validate YAML text
    pub fn parse(contents: &str) -> Result<Self> {
        // serde_yaml rejects an empty document; treat it as all defaults
        let config: AppConfig = if contents.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if let Some(channel) = self.midi.default_channel {
            if channel > 15 {
                anyhow::bail!("midi.default_channel must be 0-15, got {}", channel);
            }
        }

        if let Some(edge) = &self.midi.edge_cc {
            if edge.code > 127 {
                anyhow::bail!("midi.edge_cc.code must be 0-127, got {}", edge.code);
            }
            if edge.channel.is_some_and(|c| c > 15) {
                anyhow::bail!("midi.edge_cc.channel must be 0-15");
            }
        }

        if let Some(bpm) = self.midi.simulate_bpm {
            if !(20.0..=300.0).contains(&bpm) {
                anyhow::bail!("midi.simulate_bpm must be 20-300, got {}", bpm);
            }
        }

        if self.render.fps == 0 || self.render.fps > 240 {
            anyhow::bail!("render.fps must be 1-240, got {}", self.render.fps);
        }

        if self.media.width == 0 || self.media.height == 0 {
            anyhow::bail!("media dimensions must be non-zero");
        }

        for (idx, binding) in self.bindings.iter().enumerate() {
            if binding.effect.is_empty() || binding.param.is_empty() {
                anyhow::bail!("Binding {} needs both 'effect' and 'param'", idx);
            }
            if let BindingSource::Step { steps: 0 } = binding.source {
                anyhow::bail!("Binding {} step source needs steps > 0", idx);
            }
        }

        // Effect parameter problems are not fatal: the pipeline leaves the
        // offending effect out and logs it.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::Gate;
    use crate::effects::{EffectKind, ParameterValue};

    #[test]
    fn test_empty_config_is_all_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.midi.enabled);
        assert_eq!(config.midi.client_name, "beatcam");
        assert_eq!(config.render.fps, 60);
        assert_eq!((config.media.width, config.media.height), (1280, 720));
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
midi:
  default_channel: 2
  edge_cc: { code: 20 }
  simulate_bpm: 128
render:
  fps: 30
effects:
  - kind: chroma_key
    params:
      key_rgb: [0.1, 0.1, 0.6]
  - kind: bloom
bindings:
  - effect: bloom
    param: intensity
    source: { type: wave, gate: off_beat }
"#;
        let config = AppConfig::parse(yaml).unwrap();
        assert_eq!(config.midi.default_channel, Some(2));
        assert_eq!(config.midi.edge_cc, Some(EdgeCcConfig { code: 20, channel: None }));
        assert_eq!(config.midi.simulate_bpm, Some(128.0));
        assert_eq!(config.render.fps, 30);
        assert_eq!(config.effects.len(), 2);
        assert_eq!(config.effects[0].kind, EffectKind::ChromaKey);
        assert_eq!(
            config.effects[0].params.get("key_rgb"),
            Some(&ParameterValue::Vec3([0.1, 0.1, 0.6]))
        );
        assert!(matches!(
            config.bindings[0].source,
            BindingSource::Wave { gate: Gate::OffBeat, .. }
        ));
    }

    #[test]
    fn test_validation_errors() {
        assert!(AppConfig::parse("midi: { default_channel: 16 }").is_err());
        assert!(AppConfig::parse("render: { fps: 0 }").is_err());
        assert!(AppConfig::parse("midi: { simulate_bpm: 5 }").is_err());
        assert!(AppConfig::parse(
            "bindings: [{ effect: blur, param: weight, source: { type: step, steps: 0 } }]"
        )
        .is_err());
    }

    #[test]
    fn test_unknown_effect_kind_is_a_parse_error() {
        assert!(AppConfig::parse("effects: [{ kind: vignette }]").is_err());
    }

    #[test]
    fn test_example_config_builds() {
        let config = AppConfig::parse(include_str!("../../config.example.yaml")).unwrap();
        assert_eq!(config.midi.edge_cc, Some(EdgeCcConfig { code: 20, channel: Some(0) }));
        assert_eq!(config.media.warmup_ms, 500);

        let pipeline = crate::effects::EffectPipeline::build(&config.effects);
        assert_eq!(
            pipeline.names().collect::<Vec<_>>(),
            vec!["brightness_contrast", "bloom"]
        );
        assert_eq!(config.bindings.len(), 2);
    }
}

//! Ordered effect pipeline
//!
//! Effects live in an arena indexed by pipeline position. Rebuilding from a
//! new configuration keeps every instance whose kind and identity-affecting
//! parameters are unchanged and constructs the rest. An entry that fails to
//! construct is left out and logged; the pipeline itself never fails.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::executor::{PassDescriptor, RenderExecutor, SourceFrame};
use super::instance::EffectInstance;
use super::kinds::EffectKind;
use super::types::ParameterValue;

fn default_true() -> bool {
    true
}

/// One configured pipeline entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectConfig {
    pub kind: EffectKind,
    /// Resource name; defaults to the kind name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub params: BTreeMap<String, ParameterValue>,
}

impl EffectConfig {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            name: None,
            enabled: true,
            params: BTreeMap::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// What a rebuild did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineChanges {
    /// Instances carried over unchanged in identity
    pub kept: Vec<String>,
    /// Instances constructed fresh
    pub built: Vec<String>,
    /// Entries left out because construction failed
    pub failed: Vec<String>,
    /// Instances disposed
    pub disposed: Vec<String>,
}

/// Give each enabled entry a unique name: `base`, `base_2`, `base_3`, ...
pub fn resolve_names(configs: &[EffectConfig]) -> Vec<Option<String>> {
    let mut used: HashSet<String> = HashSet::new();
    configs
        .iter()
        .map(|config| {
            if !config.enabled {
                return None;
            }
            let base = config
                .name
                .clone()
                .unwrap_or_else(|| config.kind.as_str().to_string());
            let mut name = base.clone();
            let mut n = 2;
            while used.contains(&name) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
            used.insert(name.clone());
            Some(name)
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct EffectPipeline {
    effects: Vec<EffectInstance>,
}

impl EffectPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(configs: &[EffectConfig]) -> Self {
        let mut pipeline = Self::new();
        pipeline.reconfigure(configs);
        pipeline
    }

    /// Rebuild to match `configs`, reusing instances whose identity is unchanged
    pub fn reconfigure(&mut self, configs: &[EffectConfig]) -> PipelineChanges {
        let mut changes = PipelineChanges::default();
        let mut previous: HashMap<String, EffectInstance> = self
            .effects
            .drain(..)
            .map(|effect| (effect.name().to_string(), effect))
            .collect();

        for (config, name) in configs.iter().zip(resolve_names(configs)) {
            let Some(name) = name else {
                debug!("Effect {} disabled", config.kind);
                continue;
            };

            let overrides = config.params.iter().map(|(k, v)| (k.as_str(), *v));
            let params = match EffectInstance::resolve(config.kind, overrides) {
                Ok(params) => params,
                Err(e) => {
                    error!("Effect '{}' configuration error, left out: {}", name, e);
                    changes.failed.push(name);
                    continue;
                }
            };

            let instance = match previous.remove(&name) {
                Some(mut old) if old.kind() == config.kind && old.identity() == params.identity() => {
                    old.reconfigure(params);
                    changes.kept.push(name);
                    old
                }
                Some(mut old) => {
                    old.dispose();
                    changes.disposed.push(name.clone());
                    changes.built.push(name.clone());
                    EffectInstance::configure(name, config.kind, params)
                }
                None => {
                    changes.built.push(name.clone());
                    EffectInstance::configure(name, config.kind, params)
                }
            };
            self.effects.push(instance);
        }

        for (name, mut old) in previous {
            old.dispose();
            changes.disposed.push(name);
        }

        debug!(
            "Pipeline rebuilt: {} kept, {} built, {} failed, {} disposed",
            changes.kept.len(),
            changes.built.len(),
            changes.failed.len(),
            changes.disposed.len()
        );
        changes
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.effects.iter().map(EffectInstance::name)
    }

    pub fn get(&self, name: &str) -> Option<&EffectInstance> {
        self.effects.iter().find(|e| e.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut EffectInstance> {
        self.effects.iter_mut().find(|e| e.name() == name)
    }

    /// Per-frame update of every effect, in order
    pub fn update(&mut self, time: f64) {
        for effect in &mut self.effects {
            effect.update(time);
        }
    }

    pub fn descriptors(&self) -> Vec<PassDescriptor<'_>> {
        self.effects.iter().map(EffectInstance::descriptor).collect()
    }

    /// Update every effect and hand the pass list to `executor`
    pub fn execute(&mut self, frame: &SourceFrame, executor: &mut dyn RenderExecutor) {
        self.update(frame.time);
        let passes = self.descriptors();
        executor.execute(frame, &passes);
    }

    /// Dispose every effect and empty the pipeline
    pub fn dispose(&mut self) {
        for mut effect in self.effects.drain(..) {
            effect.dispose();
        }
    }
}

impl Drop for EffectPipeline {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        frames: Vec<Vec<(String, EffectKind)>>,
    }

    impl RenderExecutor for Recorder {
        fn execute(&mut self, _frame: &SourceFrame, passes: &[PassDescriptor<'_>]) {
            self.frames
                .push(passes.iter().map(|p| (p.name.to_string(), p.kind)).collect());
        }
    }

    fn frame() -> SourceFrame {
        SourceFrame {
            index: 0,
            width: 1280,
            height: 720,
            aspect: 1280.0 / 720.0,
            time: 0.5,
        }
    }

    #[test]
    fn test_order_is_preserved_end_to_end() {
        let configs = vec![
            EffectConfig::new(EffectKind::Colorize).named("c"),
            EffectConfig::new(EffectKind::Blur).named("a"),
            EffectConfig::new(EffectKind::Bloom).named("b"),
        ];
        let mut pipeline = EffectPipeline::build(&configs);
        let mut recorder = Recorder::default();
        pipeline.execute(&frame(), &mut recorder);

        let names: Vec<&str> = recorder.frames[0].iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_stacked_kinds_get_unique_names() {
        let configs = vec![
            EffectConfig::new(EffectKind::ChromaKey).param("key_rgb", ParameterValue::Vec3([0.1, 0.6, 0.1])),
            EffectConfig::new(EffectKind::ChromaKey).param("key_rgb", ParameterValue::Vec3([0.1, 0.1, 0.6])),
            EffectConfig::new(EffectKind::ChromaKey).named("chroma_key"),
        ];
        let pipeline = EffectPipeline::build(&configs);
        let names: Vec<&str> = pipeline.names().collect();
        assert_eq!(names, vec!["chroma_key", "chroma_key_2", "chroma_key_3"]);
    }

    #[test]
    fn test_disabled_entries_are_left_out() {
        let mut disabled = EffectConfig::new(EffectKind::Sobel);
        disabled.enabled = false;
        let pipeline = EffectPipeline::build(&[disabled, EffectConfig::new(EffectKind::Blur)]);
        assert_eq!(pipeline.names().collect::<Vec<_>>(), vec!["blur"]);
    }

    #[test]
    fn test_failed_construction_omits_only_that_effect() {
        let configs = vec![
            EffectConfig::new(EffectKind::Blur),
            EffectConfig::new(EffectKind::Glitch).param("delay", ParameterValue::Vec2([3.0, 1.0])),
            EffectConfig::new(EffectKind::Bloom),
        ];
        let mut pipeline = EffectPipeline::new();
        let changes = pipeline.reconfigure(&configs);

        assert_eq!(changes.failed, vec!["glitch".to_string()]);
        assert_eq!(pipeline.names().collect::<Vec<_>>(), vec!["blur", "bloom"]);
    }

    #[test]
    fn test_value_change_keeps_instance() {
        let mut pipeline = EffectPipeline::build(&[EffectConfig::new(EffectKind::Blur)]);
        let changes =
            pipeline.reconfigure(&[EffectConfig::new(EffectKind::Blur).param("weight", 0.5f32)]);

        assert_eq!(changes.kept, vec!["blur".to_string()]);
        assert!(changes.built.is_empty());
        assert_eq!(
            pipeline.get("blur").and_then(|e| e.param("weight")),
            Some(&ParameterValue::Float(0.5))
        );
    }

    #[test]
    fn test_identity_change_rebuilds_instance() {
        let mut pipeline = EffectPipeline::build(&[EffectConfig::new(EffectKind::Blur)]);
        let changes = pipeline.reconfigure(&[EffectConfig::new(EffectKind::Blur).param("radius", 4)]);

        assert_eq!(changes.built, vec!["blur".to_string()]);
        assert_eq!(changes.disposed, vec!["blur".to_string()]);
        assert_eq!(
            pipeline.get("blur").and_then(|e| e.param("radius")),
            Some(&ParameterValue::Int(4))
        );
    }

    #[test]
    fn test_removed_entries_are_disposed() {
        let mut pipeline = EffectPipeline::build(&[
            EffectConfig::new(EffectKind::Blur),
            EffectConfig::new(EffectKind::Bloom),
        ]);
        let changes = pipeline.reconfigure(&[EffectConfig::new(EffectKind::Bloom)]);
        assert_eq!(changes.kept, vec!["bloom".to_string()]);
        assert_eq!(changes.disposed, vec!["blur".to_string()]);
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
- kind: chroma_key
  params:
    key_rgb: [0.1, 0.1, 0.6]
    similarity: 0.2
- kind: blur
  enabled: false
- kind: glitch
  name: wobble
  params:
    delay: [0.2, 0.4]
"#;
        let configs: Vec<EffectConfig> = serde_yaml::from_str(yaml).unwrap();
        let pipeline = EffectPipeline::build(&configs);
        assert_eq!(pipeline.names().collect::<Vec<_>>(), vec!["chroma_key", "wobble"]);
        assert_eq!(
            pipeline.get("chroma_key").and_then(|e| e.param("similarity")),
            Some(&ParameterValue::Float(0.2))
        );
    }
}

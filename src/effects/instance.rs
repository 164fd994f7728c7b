//! Effect instances
//!
//! An instance is constructed from its kind's definition plus configured
//! overrides. After that only parameter values change; the parameter set and
//! the types are those of the definition for the instance's whole life.

use tracing::debug;

use super::executor::PassDescriptor;
use super::kinds::EffectKind;
use super::types::{ParamSet, ParameterValue};
use super::EffectError;

#[derive(Debug)]
pub struct EffectInstance {
    name: String,
    kind: EffectKind,
    params: ParamSet,
    /// Backend-facing state, refreshed by `update`
    uniforms: Vec<f32>,
    disposed: bool,
}

impl EffectInstance {
    /// Resolve parameters for `kind` and run its validation
    pub fn resolve<'a>(
        kind: EffectKind,
        overrides: impl IntoIterator<Item = (&'a str, ParameterValue)>,
    ) -> Result<ParamSet, EffectError> {
        let definition = kind.definition();
        let params = ParamSet::with_overrides(definition.params, overrides)?;
        (definition.validate)(&params)?;
        Ok(params)
    }

    /// Build an instance from already-resolved parameters
    pub fn configure(name: impl Into<String>, kind: EffectKind, params: ParamSet) -> Self {
        let mut uniforms = Vec::with_capacity(1 + params.slot_count());
        uniforms.push(0.0);
        for (_, value) in params.iter() {
            value.write_uniforms(&mut uniforms);
        }

        let name = name.into();
        debug!("Effect '{}' ({}) configured", name, kind);
        Self {
            name,
            kind,
            params,
            uniforms,
            disposed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    pub fn param(&self, name: &str) -> Option<&ParameterValue> {
        self.params.get(name)
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    /// Write one parameter. Takes effect at the next `update`.
    pub fn set_param(&mut self, name: &str, value: ParameterValue) -> Result<(), EffectError> {
        self.params.set(name, value)
    }

    /// Values of the parameters whose change forces a rebuild
    pub fn identity(&self) -> Vec<ParameterValue> {
        self.params.identity()
    }

    /// Adopt new configured values that share this instance's identity
    pub(crate) fn reconfigure(&mut self, params: ParamSet) {
        self.params = params;
    }

    /// Copy current parameter values into the uniform block.
    ///
    /// Runs every frame whether or not anything changed; cost is one write per
    /// uniform slot.
    pub fn update(&mut self, time: f64) {
        if self.disposed {
            return;
        }
        self.uniforms.clear();
        self.uniforms.push(time as f32);
        for (_, value) in self.params.iter() {
            value.write_uniforms(&mut self.uniforms);
        }
    }

    pub fn uniforms(&self) -> &[f32] {
        &self.uniforms
    }

    pub fn descriptor(&self) -> PassDescriptor<'_> {
        PassDescriptor {
            name: &self.name,
            kind: self.kind,
            uniforms: &self.uniforms,
        }
    }

    /// Release backend state. Idempotent.
    pub fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.uniforms = Vec::new();
            debug!("Effect '{}' disposed", self.name);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blur() -> EffectInstance {
        let params = EffectInstance::resolve(EffectKind::Blur, std::iter::empty()).unwrap();
        EffectInstance::configure("blur", EffectKind::Blur, params)
    }

    #[test]
    fn test_update_packs_time_then_params() {
        let mut effect = blur();
        effect.set_param("weight", ParameterValue::Float(0.25)).unwrap();
        assert_eq!(effect.uniforms(), &[0.0, 1.0, 1.0]);

        effect.update(2.0);
        assert_eq!(effect.uniforms(), &[2.0, 1.0, 0.25]);

        // Unchanged parameters still produce the same block
        effect.update(2.5);
        assert_eq!(effect.uniforms(), &[2.5, 1.0, 0.25]);
    }

    #[test]
    fn test_parameter_set_is_fixed() {
        let mut effect = blur();
        assert!(matches!(
            effect.set_param("intensity", ParameterValue::Float(1.0)),
            Err(EffectError::UnknownParameter(_))
        ));
        assert!(matches!(
            effect.set_param("weight", ParameterValue::Bool(true)),
            Err(EffectError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_vector_params_occupy_consecutive_slots() {
        let params = EffectInstance::resolve(
            EffectKind::ChromaKey,
            [("key_rgb", ParameterValue::Vec3([0.0, 0.0, 1.0]))],
        )
        .unwrap();
        let mut effect = EffectInstance::configure("key", EffectKind::ChromaKey, params);
        effect.update(1.0);
        assert_eq!(effect.uniforms(), &[1.0, 0.0, 0.0, 1.0, 0.3, 0.0, 0.5]);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut effect = blur();
        effect.dispose();
        effect.dispose();
        assert!(effect.is_disposed());
        effect.update(1.0);
        assert!(effect.uniforms().is_empty());
    }
}

//! Parameter value model
//!
//! A parameter's type is fixed by its [`ParamSpec`]; values written later are
//! coerced to that type or rejected.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::EffectError;

/// A single parameter value
///
/// Deserialized untagged: `true`, `3`, `0.5`, `[0.5, 1.0]`, `[0.1, 0.6, 0.1]`
/// and `[0, 0, 0, 1]` all map to the obvious variant. Integers written for a
/// float parameter are widened on assignment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

/// Type tag of a [`ParameterValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Vec2 => "vec2",
            ValueKind::Vec3 => "vec3",
            ValueKind::Vec4 => "vec4",
        };
        f.write_str(name)
    }
}

impl ValueKind {
    /// Number of uniform slots a value of this kind occupies
    pub fn slots(self) -> usize {
        match self {
            ValueKind::Bool | ValueKind::Int | ValueKind::Float => 1,
            ValueKind::Vec2 => 2,
            ValueKind::Vec3 => 3,
            ValueKind::Vec4 => 4,
        }
    }
}

impl ParameterValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ParameterValue::Bool(_) => ValueKind::Bool,
            ParameterValue::Int(_) => ValueKind::Int,
            ParameterValue::Float(_) => ValueKind::Float,
            ParameterValue::Vec2(_) => ValueKind::Vec2,
            ParameterValue::Vec3(_) => ValueKind::Vec3,
            ParameterValue::Vec4(_) => ValueKind::Vec4,
        }
    }

    /// Scalar view (0.0 for vectors)
    pub fn as_f32(&self) -> f32 {
        match self {
            ParameterValue::Bool(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
            ParameterValue::Int(v) => *v as f32,
            ParameterValue::Float(v) => *v,
            _ => 0.0,
        }
    }

    /// Convert to `kind` when the conversion loses nothing.
    ///
    /// Int widens to Float; a whole Float narrows to Int. Everything else
    /// must already match.
    pub fn coerce(self, kind: ValueKind) -> Option<Self> {
        match (self, kind) {
            (value, kind) if value.kind() == kind => Some(value),
            (ParameterValue::Int(v), ValueKind::Float) => Some(ParameterValue::Float(v as f32)),
            (ParameterValue::Float(v), ValueKind::Int) if v.fract() == 0.0 => {
                Some(ParameterValue::Int(v as i32))
            }
            _ => None,
        }
    }

    /// Append this value's uniform representation to `out`
    pub fn write_uniforms(&self, out: &mut Vec<f32>) {
        match self {
            ParameterValue::Bool(_) | ParameterValue::Int(_) | ParameterValue::Float(_) => {
                out.push(self.as_f32())
            }
            ParameterValue::Vec2(v) => out.extend_from_slice(v),
            ParameterValue::Vec3(v) => out.extend_from_slice(v),
            ParameterValue::Vec4(v) => out.extend_from_slice(v),
        }
    }

    fn clamp(self, min: Option<f32>, max: Option<f32>) -> Self {
        let lo = min.unwrap_or(f32::NEG_INFINITY);
        let hi = max.unwrap_or(f32::INFINITY);
        match self {
            ParameterValue::Int(v) => ParameterValue::Int((v as f32).clamp(lo, hi) as i32),
            ParameterValue::Float(v) => ParameterValue::Float(v.clamp(lo, hi)),
            other => other,
        }
    }

    fn in_range(&self, min: Option<f32>, max: Option<f32>) -> bool {
        match self {
            ParameterValue::Int(_) | ParameterValue::Float(_) => {
                let v = self.as_f32();
                min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m)
            }
            _ => true,
        }
    }
}

impl From<f32> for ParameterValue {
    fn from(v: f32) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        ParameterValue::Bool(v)
    }
}

impl From<i32> for ParameterValue {
    fn from(v: i32) -> Self {
        ParameterValue::Int(v)
    }
}

/// Static description of one parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: ParameterValue,
    /// Inclusive numeric bounds, scalars only
    pub min: Option<f32>,
    pub max: Option<f32>,
    /// Changing this parameter requires rebuilding the effect
    pub identity: bool,
}

impl ParamSpec {
    pub const fn new(name: &'static str, default: ParameterValue) -> Self {
        Self {
            name,
            default,
            min: None,
            max: None,
            identity: false,
        }
    }

    pub const fn float(name: &'static str, default: f32) -> Self {
        Self::new(name, ParameterValue::Float(default))
    }

    pub const fn int(name: &'static str, default: i32) -> Self {
        Self::new(name, ParameterValue::Int(default))
    }

    pub const fn bool(name: &'static str, default: bool) -> Self {
        Self::new(name, ParameterValue::Bool(default))
    }

    pub const fn range(self, min: f32, max: f32) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            ..self
        }
    }

    pub const fn at_least(self, min: f32) -> Self {
        Self {
            min: Some(min),
            ..self
        }
    }

    pub const fn identity(self) -> Self {
        Self {
            identity: true,
            ..self
        }
    }

    pub fn kind(&self) -> ValueKind {
        self.default.kind()
    }
}

/// Current values of an effect's parameters, stored in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSet {
    specs: &'static [ParamSpec],
    values: Vec<ParameterValue>,
}

impl ParamSet {
    /// All parameters at their defaults
    pub fn defaults(specs: &'static [ParamSpec]) -> Self {
        Self {
            specs,
            values: specs.iter().map(|s| s.default).collect(),
        }
    }

    /// Defaults overridden by configured values.
    ///
    /// Configured values are checked strictly: unknown names, wrong types and
    /// out-of-range numbers are errors.
    pub fn with_overrides<'a>(
        specs: &'static [ParamSpec],
        overrides: impl IntoIterator<Item = (&'a str, ParameterValue)>,
    ) -> Result<Self, EffectError> {
        let mut set = Self::defaults(specs);
        for (name, value) in overrides {
            let index = set.index_of(name)?;
            let spec = &specs[index];
            let value = set.coerced(index, value)?;
            if !value.in_range(spec.min, spec.max) {
                return Err(EffectError::Invalid(format!(
                    "'{}' = {} is outside {}..={}",
                    name,
                    value.as_f32(),
                    spec.min.map_or("-inf".to_string(), |m| m.to_string()),
                    spec.max.map_or("inf".to_string(), |m| m.to_string()),
                )));
            }
            set.values[index] = value;
        }
        Ok(set)
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.specs
            .iter()
            .position(|s| s.name == name)
            .map(|i| &self.values[i])
    }

    pub fn f32(&self, name: &str) -> f32 {
        self.get(name).map_or(0.0, ParameterValue::as_f32)
    }

    /// Per-frame write: type-checked, numeric values clamped into range
    pub fn set(&mut self, name: &str, value: ParameterValue) -> Result<(), EffectError> {
        let index = self.index_of(name)?;
        let spec = &self.specs[index];
        let value = self.coerced(index, value)?.clamp(spec.min, spec.max);
        self.values[index] = value;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static ParamSpec, &ParameterValue)> {
        self.specs.iter().zip(self.values.iter())
    }

    /// Values of the identity-affecting parameters, in declaration order
    pub fn identity(&self) -> Vec<ParameterValue> {
        self.iter()
            .filter(|(spec, _)| spec.identity)
            .map(|(_, value)| *value)
            .collect()
    }

    /// Total uniform slots across all parameters
    pub fn slot_count(&self) -> usize {
        self.specs.iter().map(|s| s.kind().slots()).sum()
    }

    fn index_of(&self, name: &str) -> Result<usize, EffectError> {
        self.specs
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| EffectError::UnknownParameter(name.to_string()))
    }

    fn coerced(&self, index: usize, value: ParameterValue) -> Result<ParameterValue, EffectError> {
        let spec = &self.specs[index];
        value
            .coerce(spec.kind())
            .ok_or_else(|| EffectError::TypeMismatch {
                name: spec.name.to_string(),
                expected: spec.kind(),
                found: value.kind(),
            })
    }
}

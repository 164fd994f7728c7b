//! Built-in effect kinds
//!
//! The set of kinds is closed. Each kind maps to one static
//! [`EffectDefinition`] holding its parameter table and validation rule;
//! all instances share the same behavior and differ only in that table.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{ParamSet, ParamSpec, ParameterValue};
use super::EffectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Blur,
    ChromaKey,
    Sobel,
    Colorize,
    BrightnessContrast,
    Glitch,
    Bloom,
}

/// Capability table entry for one kind
pub struct EffectDefinition {
    pub kind: EffectKind,
    pub params: &'static [ParamSpec],
    /// Cross-parameter checks run at construction
    pub validate: fn(&ParamSet) -> Result<(), EffectError>,
}

impl fmt::Debug for EffectDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectDefinition")
            .field("kind", &self.kind)
            .field("params", &self.params.len())
            .finish()
    }
}

impl EffectKind {
    pub const ALL: [EffectKind; 7] = [
        EffectKind::Blur,
        EffectKind::ChromaKey,
        EffectKind::Sobel,
        EffectKind::Colorize,
        EffectKind::BrightnessContrast,
        EffectKind::Glitch,
        EffectKind::Bloom,
    ];

    /// Default instance name
    pub fn as_str(self) -> &'static str {
        match self {
            EffectKind::Blur => "blur",
            EffectKind::ChromaKey => "chroma_key",
            EffectKind::Sobel => "sobel",
            EffectKind::Colorize => "colorize",
            EffectKind::BrightnessContrast => "brightness_contrast",
            EffectKind::Glitch => "glitch",
            EffectKind::Bloom => "bloom",
        }
    }

    pub fn definition(self) -> &'static EffectDefinition {
        match self {
            EffectKind::Blur => &BLUR,
            EffectKind::ChromaKey => &CHROMA_KEY,
            EffectKind::Sobel => &SOBEL,
            EffectKind::Colorize => &COLORIZE,
            EffectKind::BrightnessContrast => &BRIGHTNESS_CONTRAST,
            EffectKind::Glitch => &GLITCH,
            EffectKind::Bloom => &BLOOM,
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn no_checks(_: &ParamSet) -> Result<(), EffectError> {
    Ok(())
}

static BLUR: EffectDefinition = EffectDefinition {
    kind: EffectKind::Blur,
    params: &[
        // Kernel size is baked into the pass
        ParamSpec::int("radius", 1).range(0.0, 12.0).identity(),
        ParamSpec::float("weight", 1.0).at_least(0.0),
    ],
    validate: no_checks,
};

static CHROMA_KEY: EffectDefinition = EffectDefinition {
    kind: EffectKind::ChromaKey,
    params: &[
        ParamSpec::new("key_rgb", ParameterValue::Vec3([0.1, 0.6, 0.1])).identity(),
        ParamSpec::float("similarity", 0.3).identity(),
        ParamSpec::float("smoothness", 0.0).identity(),
        ParamSpec::float("spill", 0.5).identity(),
    ],
    validate: no_checks,
};

static SOBEL: EffectDefinition = EffectDefinition {
    kind: EffectKind::Sobel,
    params: &[
        ParamSpec::float("weight", 0.5).identity(),
        ParamSpec::float("threshold", 0.08).identity(),
        ParamSpec::float("intensity", 0.5).identity(),
        ParamSpec::new("edge_rgba", ParameterValue::Vec4([0.0, 0.0, 0.0, 1.0])).identity(),
        ParamSpec::bool("use_edge_rgba", true).identity(),
        ParamSpec::new("background_rgba", ParameterValue::Vec4([0.0, 0.0, 0.0, 1.0])).identity(),
        ParamSpec::bool("use_background_rgba", false).identity(),
    ],
    validate: no_checks,
};

static COLORIZE: EffectDefinition = EffectDefinition {
    kind: EffectKind::Colorize,
    params: &[
        ParamSpec::float("r", 1.0).identity(),
        ParamSpec::float("g", 1.0).identity(),
        ParamSpec::float("b", 1.0).identity(),
    ],
    validate: no_checks,
};

static BRIGHTNESS_CONTRAST: EffectDefinition = EffectDefinition {
    kind: EffectKind::BrightnessContrast,
    params: &[
        ParamSpec::float("brightness", 0.0).range(-1.0, 1.0),
        ParamSpec::float("contrast", 0.0).range(-1.0, 1.0),
    ],
    validate: no_checks,
};

static GLITCH: EffectDefinition = EffectDefinition {
    kind: EffectKind::Glitch,
    params: &[
        ParamSpec::new("delay", ParameterValue::Vec2([0.5, 1.0])).identity(),
        ParamSpec::new("strength", ParameterValue::Vec2([0.0, 1.0])).identity(),
    ],
    validate: validate_glitch,
};

fn validate_glitch(params: &ParamSet) -> Result<(), EffectError> {
    for name in ["delay", "strength"] {
        if let Some(ParameterValue::Vec2([min, max])) = params.get(name) {
            if min > max {
                return Err(EffectError::Invalid(format!(
                    "'{}' minimum {} exceeds maximum {}",
                    name, min, max
                )));
            }
        }
    }
    Ok(())
}

static BLOOM: EffectDefinition = EffectDefinition {
    kind: EffectKind::Bloom,
    params: &[
        ParamSpec::float("intensity", 1.0),
        ParamSpec::float("luminance_threshold", 0.0).identity(),
        ParamSpec::float("luminance_smoothing", 0.9).identity(),
        ParamSpec::int("height", 300).at_least(1.0).identity(),
    ],
    validate: no_checks,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_matching_definition() {
        for kind in EffectKind::ALL {
            let def = kind.definition();
            assert_eq!(def.kind, kind);
            assert!(!def.params.is_empty());
            // Defaults always pass validation
            (def.validate)(&ParamSet::defaults(def.params)).unwrap();
        }
    }

    #[test]
    fn test_kind_names_round_trip_through_yaml() {
        for kind in EffectKind::ALL {
            let parsed: EffectKind = serde_yaml::from_str(kind.as_str()).unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_glitch_rejects_inverted_range() {
        let params = ParamSet::with_overrides(
            GLITCH.params,
            [("delay", ParameterValue::Vec2([2.0, 1.0]))],
        )
        .unwrap();
        assert!(matches!(validate_glitch(&params), Err(EffectError::Invalid(_))));
    }

    #[test]
    fn test_identity_subsets() {
        let ids = |kind: EffectKind| -> Vec<&str> {
            kind.definition()
                .params
                .iter()
                .filter(|p| p.identity)
                .map(|p| p.name)
                .collect()
        };
        assert_eq!(ids(EffectKind::Blur), vec!["radius"]);
        assert!(ids(EffectKind::BrightnessContrast).is_empty());
        assert_eq!(
            ids(EffectKind::Bloom),
            vec!["luminance_threshold", "luminance_smoothing", "height"]
        );
    }
}

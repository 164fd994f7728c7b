//! Parameterized image effects
//!
//! - [`types`]: parameter values and specs
//! - [`kinds`]: the closed set of built-in kinds and their capability table
//! - [`instance`]: one configured effect and its per-frame contract
//! - [`pipeline`]: the ordered chain handed to the executor
//! - [`executor`]: the render backend seam
//!
//! Effects never see the clock. Per-frame values reach them only through
//! parameter writes made by the binder.

pub mod executor;
pub mod instance;
pub mod kinds;
pub mod pipeline;
pub mod types;

use thiserror::Error;

pub use executor::{PassDescriptor, RenderExecutor, SourceFrame, TraceExecutor};
pub use instance::EffectInstance;
pub use kinds::{EffectDefinition, EffectKind};
pub use pipeline::{EffectConfig, EffectPipeline, PipelineChanges};
pub use types::{ParamSet, ParamSpec, ParameterValue, ValueKind};

/// Parameter write and construction failures
#[derive(Debug, Error)]
pub enum EffectError {
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("parameter '{name}' expects {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("invalid parameters: {0}")]
    Invalid(String),
}

//! Per-frame parameter binding
//!
//! Maps `(wall clock, song position, clock active)` to effect parameter writes.
//! The only state kept between frames is the last off-beat value, used to
//! report edges.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::effects::{EffectError, EffectPipeline, ParameterValue};

/// Sixteenths per off-beat cycle; the second half is the off-beat
pub const OFF_BEAT_CYCLE: u32 = 8;

/// Wave rate giving `sin(ms * 0.01 / 4)`
pub const DEFAULT_WAVE_RATE: f64 = 0.0025;

/// Host state read once per render tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSnapshot {
    /// Wall-clock time in milliseconds since the Unix epoch
    pub wall_clock_ms: f64,
    /// Song position in sixteenths; meaningless while `clock_active` is false
    pub song_position: u32,
    pub clock_active: bool,
}

/// True for positions 4-7 of every 8-step cycle
pub fn is_off_beat(position: u32) -> bool {
    position % OFF_BEAT_CYCLE >= OFF_BEAT_CYCLE / 2
}

/// How a wave is gated by the off-beat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    #[default]
    None,
    /// Full amplitude during the off-beat half, silent otherwise
    OffBeat,
    /// Full amplitude during the on-beat half, silent otherwise
    OnBeat,
}

fn default_rate() -> f64 {
    DEFAULT_WAVE_RATE
}

fn default_amplitude() -> f64 {
    1.0
}

fn default_steps() -> u32 {
    OFF_BEAT_CYCLE
}

/// Where a bound parameter's value comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BindingSource {
    /// `offset + amplitude * sin(ms * rate) * gate`
    Wave {
        #[serde(default = "default_rate")]
        rate: f64,
        #[serde(default = "default_amplitude")]
        amplitude: f64,
        #[serde(default)]
        offset: f64,
        #[serde(default)]
        gate: Gate,
    },
    /// The off-beat flag as a boolean
    OffBeat,
    /// `position mod steps` as a float
    Step {
        #[serde(default = "default_steps")]
        steps: u32,
    },
}

impl BindingSource {
    pub fn wave() -> Self {
        BindingSource::Wave {
            rate: DEFAULT_WAVE_RATE,
            amplitude: 1.0,
            offset: 0.0,
            gate: Gate::None,
        }
    }

    /// Value for this frame. An inactive clock falls back to time only.
    pub fn evaluate(&self, frame: &FrameSnapshot) -> ParameterValue {
        match self {
            BindingSource::Wave {
                rate,
                amplitude,
                offset,
                gate,
            } => {
                let g = gate_factor(*gate, frame);
                let value = offset + amplitude * (frame.wall_clock_ms * rate).sin() * g;
                ParameterValue::Float(value as f32)
            }
            BindingSource::OffBeat => {
                ParameterValue::Bool(frame.clock_active && is_off_beat(frame.song_position))
            }
            BindingSource::Step { steps } => {
                let step = if frame.clock_active && *steps > 0 {
                    frame.song_position % steps
                } else {
                    0
                };
                ParameterValue::Float(step as f32)
            }
        }
    }
}

fn gate_factor(gate: Gate, frame: &FrameSnapshot) -> f64 {
    if !frame.clock_active {
        return 1.0;
    }
    let off_beat = is_off_beat(frame.song_position);
    match gate {
        Gate::None => 1.0,
        Gate::OffBeat if off_beat => 1.0,
        Gate::OnBeat if !off_beat => 1.0,
        _ => 0.0,
    }
}

/// One configured binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Effect name in the pipeline
    pub effect: String,
    pub param: String,
    pub source: BindingSource,
}

/// Off-beat transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffBeatEdge {
    Entered,
    Left,
}

pub struct ParameterBinder {
    bindings: Vec<Binding>,
    off_beat: Option<bool>,
    reported: HashSet<usize>,
}

impl ParameterBinder {
    pub fn new(bindings: Vec<Binding>) -> Self {
        Self {
            bindings,
            off_beat: None,
            reported: HashSet::new(),
        }
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Swap in a new binding list; edge tracking carries over
    pub fn replace(&mut self, bindings: Vec<Binding>) {
        self.bindings = bindings;
        self.reported.clear();
    }

    /// Write this frame's values into `pipeline` and report an off-beat edge
    pub fn bind(&mut self, frame: &FrameSnapshot, pipeline: &mut EffectPipeline) -> Option<OffBeatEdge> {
        let edge = self.track_edge(frame);

        for (index, binding) in self.bindings.iter().enumerate() {
            let Some(effect) = pipeline.get_mut(&binding.effect) else {
                trace!("Binding target '{}' not in pipeline", binding.effect);
                continue;
            };

            let value = binding.source.evaluate(frame);
            if let Err(e) = effect.set_param(&binding.param, value) {
                if self.reported.insert(index) {
                    match e {
                        EffectError::TypeMismatch { .. } | EffectError::UnknownParameter(_) => {
                            warn!("Binding {}.{} skipped: {}", binding.effect, binding.param, e)
                        }
                        EffectError::Invalid(_) => {
                            warn!("Binding {}.{} rejected: {}", binding.effect, binding.param, e)
                        }
                    }
                }
            }
        }

        edge
    }

    fn track_edge(&mut self, frame: &FrameSnapshot) -> Option<OffBeatEdge> {
        if !frame.clock_active {
            self.off_beat = None;
            return None;
        }

        let now = is_off_beat(frame.song_position);
        let previous = self.off_beat.replace(now);
        match previous {
            Some(was) if was != now => {
                let edge = if now {
                    OffBeatEdge::Entered
                } else {
                    OffBeatEdge::Left
                };
                debug!("Off-beat {:?} at position {}", edge, frame.song_position);
                Some(edge)
            }
            _ => None,
        }
    }
}

//! Render executor seam
//!
//! The compositing backend is opaque: it receives the source frame and the
//! ordered pass list once per display refresh.

use tracing::{debug, trace};

use super::kinds::EffectKind;

/// The source image handed to the executor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceFrame {
    /// Monotonic frame counter
    pub index: u64,
    pub width: u32,
    pub height: u32,
    /// Width over height of the source, for aspect-correct output
    pub aspect: f32,
    /// Seconds since rendering began
    pub time: f64,
}

/// One effect pass, borrowed from the pipeline for the duration of a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassDescriptor<'a> {
    /// Unique resource name within the pipeline
    pub name: &'a str,
    pub kind: EffectKind,
    /// Packed uniforms: frame time first, then parameters in declaration order
    pub uniforms: &'a [f32],
}

pub trait RenderExecutor {
    /// Composite `passes` over `frame` in order and present the result
    fn execute(&mut self, frame: &SourceFrame, passes: &[PassDescriptor<'_>]);
}

/// Frames between periodic summaries
const SUMMARY_EVERY: u64 = 600;

/// Executor that only logs what it would draw
#[derive(Debug, Default)]
pub struct TraceExecutor {
    frames: u64,
    last_passes: Vec<String>,
}

impl TraceExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Pass names of the most recent frame, in execution order
    pub fn last_passes(&self) -> &[String] {
        &self.last_passes
    }
}

impl RenderExecutor for TraceExecutor {
    fn execute(&mut self, frame: &SourceFrame, passes: &[PassDescriptor<'_>]) {
        self.frames += 1;

        let changed = passes.len() != self.last_passes.len()
            || passes.iter().zip(&self.last_passes).any(|(p, n)| p.name != n);
        if changed {
            self.last_passes = passes.iter().map(|p| p.name.to_string()).collect();
            debug!("Pass list: [{}]", self.last_passes.join(" -> "));
        }

        for pass in passes {
            trace!("frame {} pass '{}' {:?}", frame.index, pass.name, pass.uniforms);
        }

        if self.frames % SUMMARY_EVERY == 0 {
            debug!(
                "Rendered {} frames ({}x{} aspect {:.3}, {} passes, t={:.1}s)",
                self.frames,
                frame.width,
                frame.height,
                frame.aspect,
                passes.len(),
                frame.time
            );
        }
    }
}

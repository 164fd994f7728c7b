//! beatcam: live camera effects synchronized to an external MIDI clock
//!
//! A MIDI clock (song position pointer plus timing pulses) is decoded into a
//! song position in sixteenth notes. Each rendered frame binds effect
//! parameters to that position, falling back to wall-clock time whenever no
//! clock is available.

pub mod app;
pub mod binder;
pub mod clock;
pub mod config;
pub mod effects;
pub mod media;
pub mod midi;
pub mod monitor;
pub mod paths;
pub mod simulate;
pub mod transport;

//! Application run loop
//!
//! Everything runs on one task: render ticks, clock-session polls, media
//! readiness polls, simulated pulses and config reloads are branches of a
//! single `select!`. Input messages arrive on transport threads and only touch
//! the shared song position.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::time::{self, Instant as TokioInstant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::binder::{FrameSnapshot, OffBeatEdge, ParameterBinder};
use crate::clock::{ClockSession, SessionOptions};
use crate::config::{AppConfig, ConfigWatcher};
use crate::effects::{EffectPipeline, RenderExecutor, SourceFrame, TraceExecutor};
use crate::media::{MediaGate, MediaSource, TestPattern};
use crate::simulate::SimulatedClock;
use crate::transport::{MidiAccess, MidirAccess};

/// Clock access chosen from config and CLI
pub fn clock_access(
    config: &AppConfig,
    simulate_bpm: Option<f64>,
) -> (Option<Box<dyn MidiAccess>>, Option<SimulatedClock>) {
    if let Some(bpm) = simulate_bpm.or(config.midi.simulate_bpm) {
        let simulator = SimulatedClock::new(bpm);
        let access: Box<dyn MidiAccess> = Box::new(simulator.access());
        return (Some(access), Some(simulator));
    }

    if config.midi.enabled {
        let access: Box<dyn MidiAccess> = Box::new(MidirAccess::new(config.midi.client_name.clone()));
        (Some(access), None)
    } else {
        info!("MIDI disabled, effects run on wall-clock time only");
        (None, None)
    }
}

/// Host state: clock session, media gate, pipeline and binder
pub struct App {
    config: AppConfig,
    session: Option<ClockSession>,
    simulator: Option<SimulatedClock>,
    media: MediaGate,
    pipeline: EffectPipeline,
    binder: ParameterBinder,
    executor: Box<dyn RenderExecutor>,
    frame_index: u64,
    started: Instant,
    reported_error: bool,
}

impl App {
    pub fn new(
        config: AppConfig,
        access: Option<Box<dyn MidiAccess>>,
        simulator: Option<SimulatedClock>,
        media: Box<dyn MediaSource>,
        executor: Box<dyn RenderExecutor>,
    ) -> Self {
        let options = SessionOptions {
            default_channel: config.midi.default_channel,
        };
        let session = access.map(|access| ClockSession::new(access, options));
        let pipeline = EffectPipeline::build(&config.effects);
        let binder = ParameterBinder::new(config.bindings.clone());

        Self {
            config,
            session,
            simulator,
            media: MediaGate::new(media),
            pipeline,
            binder,
            executor,
            frame_index: 0,
            started: Instant::now(),
            reported_error: false,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&ClockSession> {
        self.session.as_ref()
    }

    pub fn simulator(&self) -> Option<&SimulatedClock> {
        self.simulator.as_ref()
    }

    pub fn pipeline(&self) -> &EffectPipeline {
        &self.pipeline
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame_index
    }

    pub fn start(&mut self, now: Instant) {
        self.started = now;
        self.media.start(now);
        if let Some(session) = self.session.as_mut() {
            session.start(now);
        }
    }

    pub fn session_deadline(&self) -> Option<Instant> {
        self.session.as_ref().and_then(ClockSession::next_deadline)
    }

    pub fn media_deadline(&self) -> Option<Instant> {
        self.media.next_deadline()
    }

    pub fn tick_session(&mut self, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.tick(now);

        if let (false, Some(error)) = (self.reported_error, session.error()) {
            warn!("Clock sync unavailable, driving effects from time only: {}", error);
            self.reported_error = true;
        }
    }

    pub fn tick_media(&mut self, now: Instant) {
        self.media.tick(now);
    }

    pub fn pulse(&mut self) {
        if let Some(simulator) = self.simulator.as_mut() {
            simulator.tick();
        }
    }

    /// Host state for this frame
    pub fn snapshot(&self, wall_clock_ms: f64) -> FrameSnapshot {
        match &self.session {
            Some(session) => FrameSnapshot {
                wall_clock_ms,
                song_position: session.snapshot().position,
                clock_active: session.is_active(),
            },
            None => FrameSnapshot {
                wall_clock_ms,
                song_position: 0,
                clock_active: false,
            },
        }
    }

    /// Bind, update and execute one frame. Returns false until media is ready.
    pub fn render_frame(&mut self, now: Instant, wall_clock_ms: f64) -> bool {
        let Some(info) = self.media.info() else {
            return false;
        };

        let snapshot = self.snapshot(wall_clock_ms);
        if let Some(edge) = self.binder.bind(&snapshot, &mut self.pipeline) {
            self.on_edge(edge);
        }

        let frame = SourceFrame {
            index: self.frame_index,
            width: info.width,
            height: info.height,
            aspect: info.aspect(),
            time: now.saturating_duration_since(self.started).as_secs_f64(),
        };
        self.pipeline.execute(&frame, self.executor.as_mut());
        self.frame_index += 1;
        true
    }

    fn on_edge(&mut self, edge: OffBeatEdge) {
        let Some(edge_cc) = self.config.midi.edge_cc else {
            return;
        };
        let Some(mut sender) = self.session.as_mut().and_then(ClockSession::sender) else {
            return;
        };

        let value = match edge {
            OffBeatEdge::Entered => 127,
            OffBeatEdge::Left => 0,
        };
        let delivered = sender.cc(edge_cc.code, Some(value), edge_cc.channel);
        debug!("Edge CC {}={} sent {} time(s)", edge_cc.code, value, delivered);
    }

    /// Adopt a reloaded config. Effects and bindings change live.
    pub fn apply_config(&mut self, config: AppConfig) {
        if config.midi != self.config.midi {
            warn!("MIDI settings changed; restart required to apply them");
        }
        if config.media != self.config.media {
            warn!("Media settings changed; restart required to apply them");
        }

        let changes = self.pipeline.reconfigure(&config.effects);
        info!(
            "Effects reconfigured: {} kept, {} rebuilt, {} failed",
            changes.kept.len(),
            changes.built.len(),
            changes.failed.len()
        );
        self.binder.replace(config.bindings.clone());

        // Only live-applicable sections are taken over
        self.config.render = config.render;
        self.config.effects = config.effects;
        self.config.bindings = config.bindings;
    }

    /// End the clock session and dispose the pipeline
    pub fn shutdown(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.end();
        }
        self.pipeline.dispose();
        info!("Rendered {} frame(s)", self.frame_index);
    }
}

/// Sleep until `deadline`; never completes without one
pub async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(TokioInstant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

/// Next simulated pulse; never completes without a simulator
pub async fn next_pulse(pulses: &mut Option<time::Interval>) {
    match pulses {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_reload(watcher: &mut Option<ConfigWatcher>) -> Option<AppConfig> {
    match watcher {
        Some(watcher) => watcher.next_config().await,
        None => std::future::pending().await,
    }
}

/// Completes on Ctrl+C. Without a signal handler it never completes.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to install CTRL+C signal handler: {}", e);
            std::future::pending::<()>().await
        }
    }
}

fn render_interval(fps: u32) -> time::Interval {
    let mut interval = time::interval(Duration::from_secs_f64(1.0 / fps.max(1) as f64));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

fn wall_clock_ms() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}

/// Run until Ctrl+C
pub async fn run(config_path: PathBuf, simulate_bpm: Option<f64>) -> Result<()> {
    let (mut watcher, config) = if config_path.exists() {
        let (watcher, config) = ConfigWatcher::new(config_path.clone()).await?;
        info!("Configuration loaded with hot-reload enabled");
        (Some(watcher), config)
    } else {
        info!("No config at {}, using defaults", config_path.display());
        (None, AppConfig::default())
    };

    let (access, simulator) = clock_access(&config, simulate_bpm);
    let media = TestPattern::new(
        config.media.width,
        config.media.height,
        Duration::from_millis(config.media.warmup_ms),
    );
    let mut app = App::new(
        config,
        access,
        simulator,
        Box::new(media),
        Box::new(TraceExecutor::new()),
    );
    app.start(Instant::now());

    let mut fps = app.config().render.fps;
    let mut render = render_interval(fps);
    let mut pulses = app.simulator().map(|sim| time::interval(sim.interval()));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!("🎬 Rendering at {} fps with {} effect(s)", fps, app.pipeline().len());

    loop {
        tokio::select! {
            _ = render.tick() => {
                app.render_frame(Instant::now(), wall_clock_ms());
            }
            _ = sleep_until(app.session_deadline()) => {
                app.tick_session(Instant::now());
            }
            _ = sleep_until(app.media_deadline()) => {
                app.tick_media(Instant::now());
            }
            _ = next_pulse(&mut pulses) => {
                app.pulse();
            }
            Some(config) = next_reload(&mut watcher) => {
                app.apply_config(config);
                if app.config().render.fps != fps {
                    fps = app.config().render.fps;
                    render = render_interval(fps);
                    info!("Render rate changed to {} fps", fps);
                }
            }
            _ = &mut shutdown => break,
        }
    }

    app.shutdown();
    Ok(())
}

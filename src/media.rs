//! Media readiness gate
//!
//! A media source gives no ready event, so readiness is polled. Nothing is
//! rendered until the source reports non-zero dimensions; after that the gate
//! stops polling and only exposes the stream dimensions.

use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Readiness poll interval
pub const MEDIA_POLL: Duration = Duration::from_millis(100);

/// Native pixel dimensions of a ready stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
}

impl MediaInfo {
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

pub trait MediaSource {
    /// `Some` once the stream is live
    fn poll(&mut self) -> Option<MediaInfo>;
}

/// Synthetic source that becomes ready after a warm-up period
#[derive(Debug)]
pub struct TestPattern {
    info: MediaInfo,
    ready_at: Instant,
}

impl TestPattern {
    pub fn new(width: u32, height: u32, warmup: Duration) -> Self {
        Self {
            info: MediaInfo { width, height },
            ready_at: Instant::now() + warmup,
        }
    }
}

impl MediaSource for TestPattern {
    fn poll(&mut self) -> Option<MediaInfo> {
        (Instant::now() >= self.ready_at).then_some(self.info)
    }
}

pub struct MediaGate {
    source: Box<dyn MediaSource>,
    info: Option<MediaInfo>,
    next_poll: Option<Instant>,
    polls: u32,
}

impl MediaGate {
    pub fn new(source: Box<dyn MediaSource>) -> Self {
        Self {
            source,
            info: None,
            next_poll: None,
            polls: 0,
        }
    }

    /// Arm the first poll at `now`
    pub fn start(&mut self, now: Instant) {
        if self.info.is_none() {
            self.next_poll = Some(now);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_poll
    }

    pub fn tick(&mut self, now: Instant) {
        if !self.next_poll.is_some_and(|at| at <= now) {
            return;
        }

        self.polls += 1;
        match self.source.poll() {
            Some(info) if info.width > 0 && info.height > 0 => {
                info!(
                    "📷 Media ready: {}x{} (aspect {:.3}) after {} poll(s)",
                    info.width,
                    info.height,
                    info.aspect(),
                    self.polls
                );
                self.info = Some(info);
                self.next_poll = None;
            }
            _ => {
                debug!("Media not ready yet");
                self.next_poll = Some(now + MEDIA_POLL);
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.info.is_some()
    }

    pub fn info(&self) -> Option<MediaInfo> {
        self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ready once `remaining` polls have been answered with `None`
    struct Scripted {
        remaining: u32,
        info: MediaInfo,
    }

    impl MediaSource for Scripted {
        fn poll(&mut self) -> Option<MediaInfo> {
            if self.remaining == 0 {
                Some(self.info)
            } else {
                self.remaining -= 1;
                None
            }
        }
    }

    #[test]
    fn test_polls_every_100ms_until_ready() {
        let mut gate = MediaGate::new(Box::new(Scripted {
            remaining: 2,
            info: MediaInfo {
                width: 640,
                height: 480,
            },
        }));
        let t0 = Instant::now();
        gate.start(t0);

        gate.tick(t0);
        assert_eq!(gate.next_deadline(), Some(t0 + MEDIA_POLL));
        gate.tick(t0 + MEDIA_POLL);
        assert!(!gate.is_ready());
        gate.tick(t0 + MEDIA_POLL * 2);

        assert!(gate.is_ready());
        assert_eq!(gate.next_deadline(), None);
        assert!((gate.info().unwrap().aspect() - 4.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_dimensions_are_not_ready() {
        let mut gate = MediaGate::new(Box::new(Scripted {
            remaining: 0,
            info: MediaInfo {
                width: 0,
                height: 720,
            },
        }));
        let t0 = Instant::now();
        gate.start(t0);
        gate.tick(t0);
        assert!(!gate.is_ready());
        assert!(gate.info().is_none());
    }

    #[test]
    fn test_pattern_without_warmup_is_ready() {
        let mut gate = MediaGate::new(Box::new(TestPattern::new(1280, 720, Duration::ZERO)));
        let t0 = Instant::now();
        gate.start(t0);
        gate.tick(t0);
        assert_eq!(
            gate.info(),
            Some(MediaInfo {
                width: 1280,
                height: 720
            })
        );
    }
}

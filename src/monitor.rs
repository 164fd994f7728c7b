//! Port listing and clock monitor for debugging
//!
//! The monitor runs a full clock session (discovery, hot-plug, decoding) and
//! prints every message an attached input delivers together with the song
//! position after it was applied.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use colored::*;
use tokio::sync::mpsc;
use tokio::time;
use tracing::warn;

use crate::app::{next_pulse, shutdown_signal, sleep_until};
use crate::clock::decoder::EventObserver;
use crate::clock::{ClockDecoder, ClockEvent, ClockSession, SessionOptions, SongClock};
use crate::midi::{format_hex, MidiMessage};
use crate::simulate::SimulatedClock;
use crate::transport::{EndpointId, MidiAccess, MidiTransport, MidirTransport};

/// One delivered message
#[derive(Debug, Clone)]
pub struct MonitorEvent {
    pub timestamp_ms: u64,
    pub port: String,
    pub data: Vec<u8>,
    pub event: Option<ClockEvent>,
    /// Song position right after the message was decoded
    pub position: u32,
}

/// Print every visible input and output port
pub fn list_ports(client_name: &str) -> Result<()> {
    let transport = MidirTransport::open(client_name).context("Failed to open MIDI client")?;

    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    println!("\n{}", "Input Ports:".bold());
    let inputs = transport.inputs();
    if inputs.is_empty() {
        println!("  {}", "No input ports found".dimmed());
    }
    for endpoint in inputs {
        println!(
            "  {} {} {}",
            "[IN] ".green(),
            endpoint.name,
            format!("({})", endpoint.id).dimmed()
        );
    }

    println!("\n{}", "Output Ports:".bold());
    let outputs = transport.outputs();
    if outputs.is_empty() {
        println!("  {}", "No output ports found".dimmed());
    }
    for endpoint in outputs {
        println!(
            "  {} {} {}",
            "[OUT]".red(),
            endpoint.name,
            format!("({})", endpoint.id).dimmed()
        );
    }

    println!();
    Ok(())
}

/// Observer forwarding decoded messages to `tx`
pub fn channel_observer(clock: SongClock, tx: mpsc::Sender<MonitorEvent>) -> EventObserver {
    let start = Instant::now();
    Arc::new(move |port: &EndpointId, data: &[u8], event: Option<ClockEvent>| {
        let monitor_event = MonitorEvent {
            timestamp_ms: start.elapsed().as_millis() as u64,
            port: port.to_string(),
            data: data.to_vec(),
            event,
            position: clock.position(),
        };
        // Drop on overflow rather than block the transport thread
        let _ = tx.try_send(monitor_event);
    })
}

/// Monitor clock traffic until Ctrl+C
pub async fn run_monitor(access: Box<dyn MidiAccess>, mut simulator: Option<SimulatedClock>) -> Result<()> {
    println!("{}", "=== MIDI Clock Monitor ===".bold().cyan());
    println!("Press Ctrl+C to exit\n");
    println!("{}", "Format: [timestamp] IN PORT | HEX => PARSED  pos=N".dimmed());
    println!("{}\n", "─".repeat(80).dimmed());

    let (tx, mut rx) = mpsc::channel(1000);
    let clock = SongClock::new();
    let decoder = ClockDecoder::new(clock.clone()).with_observer(channel_observer(clock, tx));
    let mut session = ClockSession::with_decoder(access, decoder, SessionOptions::default());
    session.start(Instant::now());

    let mut pulses = simulator.as_ref().map(|sim| time::interval(sim.interval()));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut reported_error = false;

    loop {
        tokio::select! {
            Some(event) = rx.recv() => print_event(&event),
            _ = sleep_until(session.next_deadline()) => {
                session.tick(Instant::now());
                if let (false, Some(error)) = (reported_error, session.error()) {
                    warn!("Clock unavailable: {}", error);
                    reported_error = true;
                }
            }
            _ = next_pulse(&mut pulses) => {
                if let Some(sim) = simulator.as_mut() {
                    sim.tick();
                }
            }
            _ = &mut shutdown => break,
        }
    }

    session.end();
    println!("\n{}", "Monitor stopped".yellow());
    Ok(())
}

fn print_event(event: &MonitorEvent) {
    let timestamp = format!("{:08}", event.timestamp_ms);
    let port = if event.port.chars().count() > 20 {
        format!("{}...", event.port.chars().take(17).collect::<String>())
    } else {
        event.port.clone()
    };

    let hex = format_hex(&event.data);
    let message = MidiMessage::parse(&event.data);

    let parsed = match &message {
        Some(msg) => format!(" => {}", msg.to_string().bright_blue()),
        None => String::new(),
    };

    let hex_colored = match (&message, event.event) {
        (_, Some(ClockEvent::PositionSet(_))) => hex.bright_magenta(),
        (_, Some(ClockEvent::Sixteenth(_))) => hex.bright_green(),
        (_, Some(ClockEvent::Pulse)) => hex.normal(),
        (_, Some(ClockEvent::Transport(_))) => hex.bright_yellow(),
        (Some(_), None) => hex.bright_cyan(),
        (None, None) => hex.bright_black(),
    };

    println!(
        "[{}ms] {} {:20} | {}{}  {}",
        timestamp.dimmed(),
        "IN ".green(),
        port.white(),
        hex_colored,
        parsed,
        format!("pos={}", event.position).dimmed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryBus;
    use crate::transport::Direction;

    #[test]
    fn test_observer_reports_position_after_decoding() {
        let bus = MemoryBus::new();
        bus.plug(Direction::Input, "clock");

        let (tx, mut rx) = mpsc::channel(16);
        let clock = SongClock::new();
        let decoder = ClockDecoder::new(clock.clone()).with_observer(channel_observer(clock, tx));
        let mut session =
            ClockSession::with_decoder(Box::new(bus.access()), decoder, SessionOptions::default());
        let now = Instant::now();
        session.start(now);
        session.tick(now);

        bus.inject("clock", &[0xF2, 0x10, 0x02]);
        bus.inject("clock", &[0x90, 60, 100]);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.port, "clock");
        assert_eq!(first.event, Some(ClockEvent::PositionSet(272)));
        assert_eq!(first.position, 272);

        let second = rx.try_recv().unwrap();
        assert_eq!(second.event, None);
        assert_eq!(second.data, vec![0x90, 60, 100]);
    }
}

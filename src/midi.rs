//! MIDI message codec and note helpers
//!
//! Parses the raw byte groups delivered by control-protocol inputs and encodes
//! the channel messages sent by [`crate::transport::MidiSender`].

use std::fmt;

/// Status byte of a Song Position Pointer message
pub const SONG_POSITION_POINTER: u8 = 0xF2;
/// Status byte of a Timing Clock pulse (24 per quarter note)
pub const TIMING_CLOCK: u8 = 0xF8;
/// Status byte of a Start message
pub const START: u8 = 0xFA;
/// Status byte of a Continue message
pub const CONTINUE: u8 = 0xFB;
/// Status byte of a Stop message
pub const STOP: u8 = 0xFC;

/// Number of MIDI channels addressable by channel voice messages
pub const CHANNEL_COUNT: u8 = 16;

/// MIDI message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit)
    PitchBend { channel: u8, value: u16 },

    /// Song Position Pointer, in sixteenth notes since song start
    SongPosition { position: u16 },

    TimingClock,
    Start,
    Continue,
    Stop,
    ActiveSensing,
    SystemReset,
}

impl MidiMessage {
    /// Parse a MIDI message from raw bytes.
    ///
    /// Returns `None` for empty input, running-status data, truncated messages
    /// and status codes this crate has no use for.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;

        if status < 0x80 {
            return None;
        }

        if status < 0xF0 {
            let channel = status & 0x0F;
            let d1 = rest.first().map(|b| b & 0x7F);
            let d2 = rest.get(1).map(|b| b & 0x7F);

            return match status & 0xF0 {
                0x80 => Some(MidiMessage::NoteOff { channel, note: d1?, velocity: d2? }),
                0x90 => {
                    let (note, velocity) = (d1?, d2?);
                    if velocity == 0 {
                        Some(MidiMessage::NoteOff { channel, note, velocity: 0 })
                    } else {
                        Some(MidiMessage::NoteOn { channel, note, velocity })
                    }
                }
                0xB0 => Some(MidiMessage::ControlChange { channel, cc: d1?, value: d2? }),
                0xC0 => Some(MidiMessage::ProgramChange { channel, program: d1? }),
                0xE0 => Some(MidiMessage::PitchBend {
                    channel,
                    value: combine_14bit(d1?, d2?),
                }),
                _ => None,
            };
        }

        match status {
            SONG_POSITION_POINTER => {
                let lsb = *rest.first()?;
                let msb = *rest.get(1)?;
                Some(MidiMessage::SongPosition {
                    position: combine_14bit(lsb & 0x7F, msb & 0x7F),
                })
            }
            TIMING_CLOCK => Some(MidiMessage::TimingClock),
            START => Some(MidiMessage::Start),
            CONTINUE => Some(MidiMessage::Continue),
            STOP => Some(MidiMessage::Stop),
            0xFE => Some(MidiMessage::ActiveSensing),
            0xFF => Some(MidiMessage::SystemReset),
            _ => None,
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
            MidiMessage::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program & 0x7F]
            }
            MidiMessage::PitchBend { channel, value } => {
                let (lsb, msb) = split_14bit(value);
                vec![0xE0 | (channel & 0x0F), lsb, msb]
            }
            MidiMessage::SongPosition { position } => {
                let (lsb, msb) = split_14bit(position);
                vec![SONG_POSITION_POINTER, lsb, msb]
            }
            MidiMessage::TimingClock => vec![TIMING_CLOCK],
            MidiMessage::Start => vec![START],
            MidiMessage::Continue => vec![CONTINUE],
            MidiMessage::Stop => vec![STOP],
            MidiMessage::ActiveSensing => vec![0xFE],
            MidiMessage::SystemReset => vec![0xFF],
        }
    }

    /// Get the channel for channel messages (0-15), None for system messages
    pub fn channel(&self) -> Option<u8> {
        match *self {
            MidiMessage::NoteOff { channel, .. }
            | MidiMessage::NoteOn { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// True for the single-byte real-time messages (clock, start, stop, ...)
    pub fn is_realtime(&self) -> bool {
        matches!(
            self,
            MidiMessage::TimingClock
                | MidiMessage::Start
                | MidiMessage::Continue
                | MidiMessage::Stop
                | MidiMessage::ActiveSensing
                | MidiMessage::SystemReset
        )
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel + 1, program)
            }
            MidiMessage::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{}", channel + 1, value)
            }
            MidiMessage::SongPosition { position } => write!(f, "SongPosition {}", position),
            _ => write!(f, "{:?}", self),
        }
    }
}

/// Combine two 7-bit data bytes (LSB first) into a 14-bit value
pub fn combine_14bit(lsb: u8, msb: u8) -> u16 {
    ((msb as u16) << 7) | lsb as u16
}

/// Split a 14-bit value into (LSB, MSB) 7-bit data bytes
pub fn split_14bit(value: u16) -> (u8, u8) {
    ((value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8)
}

/// Pitch class code (0-11) for a note name such as "C", "F#" or "Bb".
///
/// Enharmonic spellings resolve to the same code; "B#" wraps to 0 and "Cb" to 11.
pub fn note_code(name: &str) -> Option<u8> {
    let code = match name {
        "C" | "B#" => 0,
        "C#" | "Db" => 1,
        "D" => 2,
        "D#" | "Eb" => 3,
        "E" | "Fb" => 4,
        "E#" | "F" => 5,
        "F#" | "Gb" => 6,
        "G" => 7,
        "G#" | "Ab" => 8,
        "A" => 9,
        "A#" | "Bb" => 10,
        "B" | "Cb" => 11,
        _ => return None,
    };
    Some(code)
}

/// MIDI note number for a note name in the given octave (C4 = 60).
///
/// Returns `None` for unknown names or results outside 0-127.
pub fn note_number(name: &str, octave: i8) -> Option<u8> {
    let code = note_code(name)? as i16;
    let number = code + (octave as i16 + 1) * 12;
    u8::try_from(number).ok().filter(|n| *n <= 0x7F)
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_position_parsing() {
        let msg = MidiMessage::parse(&[0xF2, 0x10, 0x02]).unwrap();
        assert_eq!(msg, MidiMessage::SongPosition { position: 272 });
    }

    #[test]
    fn test_truncated_song_position_is_rejected() {
        assert_eq!(MidiMessage::parse(&[0xF2, 0x10]), None);
        assert_eq!(MidiMessage::parse(&[]), None);
    }

    #[test]
    fn test_realtime_parsing() {
        assert_eq!(MidiMessage::parse(&[0xF8]), Some(MidiMessage::TimingClock));
        assert_eq!(MidiMessage::parse(&[0xFA]), Some(MidiMessage::Start));
        assert_eq!(MidiMessage::parse(&[0xFB]), Some(MidiMessage::Continue));
        assert_eq!(MidiMessage::parse(&[0xFC]), Some(MidiMessage::Stop));
        assert!(MidiMessage::TimingClock.is_realtime());
        assert!(!MidiMessage::SongPosition { position: 0 }.is_realtime());
    }

    #[test]
    fn test_note_on_velocity_zero() {
        let msg = MidiMessage::parse(&[0x90, 60, 0]).unwrap();
        assert_eq!(msg, MidiMessage::NoteOff { channel: 0, note: 60, velocity: 0 });
    }

    #[test]
    fn test_control_change() {
        let msg = MidiMessage::parse(&[0xB2, 7, 100]).unwrap();
        assert_eq!(msg, MidiMessage::ControlChange { channel: 2, cc: 7, value: 100 });
        assert_eq!(msg.channel(), Some(2));
    }

    #[test]
    fn test_encode_song_position() {
        let msg = MidiMessage::SongPosition { position: 272 };
        assert_eq!(msg.encode(), vec![0xF2, 0x10, 0x02]);
    }

    #[test]
    fn test_note_codes() {
        assert_eq!(note_code("C"), Some(0));
        assert_eq!(note_code("Db"), note_code("C#"));
        assert_eq!(note_code("B#"), Some(0));
        assert_eq!(note_code("Cb"), Some(11));
        assert_eq!(note_code("H"), None);
    }

    #[test]
    fn test_note_numbers() {
        assert_eq!(note_number("C", 4), Some(60));
        assert_eq!(note_number("A", 4), Some(69));
        assert_eq!(note_number("C", -1), Some(0));
        assert_eq!(note_number("G", 9), Some(127));
        assert_eq!(note_number("G#", 9), None);
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0xF2, 0x10, 0x02]), "F2 10 02");
    }
}

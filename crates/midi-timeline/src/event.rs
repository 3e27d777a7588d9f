use midly::{MetaMessage, MidiMessage, TrackEventKind};
use serde::{Deserialize, Serialize};

/// Key signature in force, as a signed count of sharps (negative = flats)
/// plus mode. Defaults to C major, the SMF convention when no key event
/// occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySignature {
    pub sharps: i8,
    pub major: bool,
}

impl Default for KeySignature {
    fn default() -> Self {
        Self {
            sharps: 0,
            major: true,
        }
    }
}

impl std::fmt::Display for KeySignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const MAJOR_NAMES: [&str; 15] = [
            "Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#",
        ];
        const MINOR_NAMES: [&str; 15] = [
            "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#", "G#", "D#", "A#",
        ];

        let index = (self.sharps.clamp(-7, 7) + 7) as usize;
        if self.major {
            write!(f, "{} major", MAJOR_NAMES[index])
        } else {
            write!(f, "{} minor", MINOR_NAMES[index])
        }
    }
}

/// A meter label: 3/4, 6/8, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl std::fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// The closed set of events the pipeline distinguishes. Everything else is
/// `Opaque`: it carries no payload but still occupies its tick, so clocks
/// downstream advance over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedEvent {
    NoteOn {
        channel: u8,
        pitch: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        pitch: u8,
        velocity: u8,
    },
    TempoChange {
        micros_per_quarter: u32,
    },
    TimeSignatureChange {
        numerator: u8,
        denominator_pow2: u8,
        metronome_clicks: u8,
        thirty_seconds_per_beat: u8,
    },
    KeySignatureChange {
        sharps: i8,
        major: bool,
    },
    Opaque,
}

impl TypedEvent {
    /// Reinterpret a decoded track event. Pure and stateless; a NoteOn with
    /// velocity zero is a NoteOff by convention.
    pub fn from_kind(kind: &TrackEventKind) -> Self {
        match *kind {
            TrackEventKind::Midi { channel, message } => {
                let channel = channel.as_int();
                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => TypedEvent::NoteOn {
                        channel,
                        pitch: key.as_int(),
                        velocity: vel.as_int(),
                    },
                    MidiMessage::NoteOn { key, vel } | MidiMessage::NoteOff { key, vel } => {
                        TypedEvent::NoteOff {
                            channel,
                            pitch: key.as_int(),
                            velocity: vel.as_int(),
                        }
                    }
                    _ => TypedEvent::Opaque,
                }
            }
            TrackEventKind::Meta(MetaMessage::Tempo(micros)) => TypedEvent::TempoChange {
                micros_per_quarter: micros.as_int(),
            },
            TrackEventKind::Meta(MetaMessage::TimeSignature(
                numerator,
                denominator_pow2,
                metronome_clicks,
                thirty_seconds_per_beat,
            )) => TypedEvent::TimeSignatureChange {
                numerator,
                denominator_pow2,
                metronome_clicks,
                thirty_seconds_per_beat,
            },
            TrackEventKind::Meta(MetaMessage::KeySignature(sharps, minor)) => {
                TypedEvent::KeySignatureChange {
                    sharps,
                    major: !minor,
                }
            }
            _ => TypedEvent::Opaque,
        }
    }

    /// Quarter notes per minute, for tempo events.
    pub fn bpm(&self) -> Option<f64> {
        match self {
            TypedEvent::TempoChange { micros_per_quarter } => {
                Some(60_000_000.0 / *micros_per_quarter as f64)
            }
            _ => None,
        }
    }
}

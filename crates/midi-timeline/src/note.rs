use std::collections::{HashMap, VecDeque};
use std::str::FromStr;

use midly::Smf;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::event::{KeySignature, TypedEvent};
use crate::merge::{merge_tracks, MergedEvent};
use crate::timing::{Fraction, TimeCursor, TimeDivision};
use crate::Error;

/// How overlapping note-ons for the same (track, channel, pitch) pair up
/// with note-offs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    /// FIFO: the oldest sounding note is released first.
    Queue,
    /// LIFO: the most recent sounding note is released first.
    Stack,
}

impl FromStr for Discipline {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "queue" => Ok(Discipline::Queue),
            "stack" => Ok(Discipline::Stack),
            other => Err(Error::UnknownDiscipline(other.to_string())),
        }
    }
}

impl std::fmt::Display for Discipline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Discipline::Queue => write!(f, "queue"),
            Discipline::Stack => write!(f, "stack"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NoteOptions {
    pub discipline: Discipline,
    /// Emit tracing warnings for overlaps and orphan events.
    pub warnings: bool,
}

impl Default for NoteOptions {
    fn default() -> Self {
        Self {
            discipline: Discipline::Queue,
            warnings: false,
        }
    }
}

/// One matched note, with onset and offset in all three time units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub onset_ticks: u64,
    pub offset_ticks: u64,
    /// Onset position in whole notes, exact.
    pub onset_duration: Fraction,
    pub offset_duration: Fraction,
    pub onset_seconds: f64,
    pub offset_seconds: f64,
    pub pitch: u8,
    pub velocity: u8,
    pub track: usize,
    pub channel: u8,
    pub key_sharps: i8,
    pub key_major: bool,
}

impl NoteRecord {
    pub fn duration_ticks(&self) -> u64 {
        self.offset_ticks.saturating_sub(self.onset_ticks)
    }

    pub fn duration_wholes(&self) -> Fraction {
        self.offset_duration - self.onset_duration
    }

    pub fn duration_seconds(&self) -> f64 {
        self.offset_seconds - self.onset_seconds
    }
}

/// A note-on waiting for its note-off.
#[derive(Debug, Clone, Copy)]
struct PendingNote {
    onset_ticks: u64,
    onset_duration: Fraction,
    onset_seconds: f64,
    velocity: u8,
    key: KeySignature,
}

/// Extract the full note table from a decoded file: merge all tracks, then
/// pair note-ons with note-offs under the configured discipline.
pub fn extract_notes(smf: &Smf, options: &NoteOptions) -> Vec<NoteRecord> {
    let division = TimeDivision::from_timing(smf.header.timing);
    match_notes(&merge_tracks(smf), division, options)
}

/// Pair note-ons with note-offs over an already merged stream.
///
/// Pending notes live in one deque per (track, channel, pitch); `Queue`
/// releases from the front, `Stack` from the back. Orphans on either side
/// are dropped: a note-off with nothing pending produces no record, and
/// notes still pending when the stream ends are discarded.
pub fn match_notes(
    merged: &[MergedEvent],
    division: TimeDivision,
    options: &NoteOptions,
) -> Vec<NoteRecord> {
    let mut clock = TimeCursor::new(division);
    let mut pending: HashMap<(usize, u8, u8), VecDeque<PendingNote>> = HashMap::new();
    let mut notes = Vec::new();

    for event in merged {
        clock.advance_to(event.tick);

        match event.event {
            TypedEvent::TempoChange { micros_per_quarter } => {
                clock.set_tempo(micros_per_quarter);
            }
            TypedEvent::NoteOn {
                channel,
                pitch,
                velocity,
            } => {
                let slot = pending.entry((event.track, channel, pitch)).or_default();
                if !slot.is_empty() && options.warnings {
                    warn!(
                        track = event.track,
                        channel,
                        pitch,
                        sounding = slot.len(),
                        "note already sounding, stacking overlap"
                    );
                }
                slot.push_back(PendingNote {
                    onset_ticks: event.tick,
                    onset_duration: clock.wholes(),
                    onset_seconds: clock.seconds(),
                    velocity,
                    key: event.key,
                });
            }
            TypedEvent::NoteOff { channel, pitch, .. } => {
                let slot_key = (event.track, channel, pitch);
                let matched = pending.get_mut(&slot_key).and_then(|slot| {
                    match options.discipline {
                        Discipline::Queue => slot.pop_front(),
                        Discipline::Stack => slot.pop_back(),
                    }
                });
                if pending.get(&slot_key).map_or(false, VecDeque::is_empty) {
                    pending.remove(&slot_key);
                }

                match matched {
                    Some(on) => notes.push(NoteRecord {
                        onset_ticks: on.onset_ticks,
                        offset_ticks: event.tick,
                        onset_duration: on.onset_duration,
                        offset_duration: clock.wholes(),
                        onset_seconds: on.onset_seconds,
                        offset_seconds: clock.seconds(),
                        pitch,
                        velocity: on.velocity,
                        track: event.track,
                        channel,
                        key_sharps: on.key.sharps,
                        key_major: on.key.major,
                    }),
                    None => {
                        if options.warnings {
                            warn!(
                                track = event.track,
                                channel,
                                pitch,
                                tick = event.tick,
                                "orphan note-off dropped"
                            );
                        }
                    }
                }
            }
            _ => {}
        }
    }

    if options.warnings {
        let unclosed: usize = pending.values().map(VecDeque::len).sum();
        if unclosed > 0 {
            warn!(count = unclosed, "notes still sounding at stream end dropped");
        }
    }

    // stable sort: ties beyond (onset, track, channel) keep match order
    notes.sort_by(|a, b| {
        a.onset_ticks
            .cmp(&b.onset_ticks)
            .then(a.track.cmp(&b.track))
            .then(a.channel.cmp(&b.channel))
    });
    notes
}

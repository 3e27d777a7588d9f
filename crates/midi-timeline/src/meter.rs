use std::ops::Sub;
use std::str::FromStr;

use midly::Smf;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::event::{TimeSignature, TypedEvent};
use crate::merge::{merge_tracks, MergedEvent};
use crate::timing::{Fraction, TimeCursor, TimeDivision};
use crate::Error;

/// Unit in which a signature map expresses its boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapUnit {
    Ticks,
    Durations,
    Seconds,
}

impl FromStr for MapUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "ticks" => Ok(MapUnit::Ticks),
            "durations" => Ok(MapUnit::Durations),
            "seconds" => Ok(MapUnit::Seconds),
            other => Err(Error::UnknownUnit(other.to_string())),
        }
    }
}

impl std::fmt::Display for MapUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapUnit::Ticks => write!(f, "ticks"),
            MapUnit::Durations => write!(f, "durations"),
            MapUnit::Seconds => write!(f, "seconds"),
        }
    }
}

/// A partition of the timeline into contiguous half-open intervals, each
/// labeled with the time signature in force.
///
/// Invariant: one more boundary than labels, boundaries strictly increasing.
/// Interval `i` spans `[boundaries[i], boundaries[i + 1])` under
/// `signatures[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSigMap<T> {
    boundaries: Vec<T>,
    signatures: Vec<TimeSignature>,
}

impl<T: PartialOrd + Copy> TimeSigMap<T> {
    pub fn boundaries(&self) -> &[T] {
        &self.boundaries
    }

    pub fn signatures(&self) -> &[TimeSignature] {
        &self.signatures
    }

    /// (start, end, signature) triples, in order.
    pub fn intervals(&self) -> impl Iterator<Item = (T, T, TimeSignature)> + '_ {
        self.signatures
            .iter()
            .enumerate()
            .map(|(i, &signature)| (self.boundaries[i], self.boundaries[i + 1], signature))
    }

    /// The signature in force at `position`. Positions before the map's
    /// start have none; the final signature persists past the last boundary.
    pub fn signature_at(&self, position: T) -> Option<TimeSignature> {
        if self.signatures.is_empty() || position < self.boundaries[0] {
            return None;
        }
        for (start, end, signature) in self.intervals() {
            if position >= start && position < end {
                return Some(signature);
            }
        }
        self.signatures.last().copied()
    }
}

impl<T: PartialOrd + Copy + Sub<Output = T>> TimeSigMap<T> {
    /// Shift the map's start back by an upbeat, so position zero falls that
    /// far into the first bar. Only the first boundary moves.
    fn shift_start(&mut self, upbeat: T) {
        let shifted = self.boundaries[0] - upbeat;
        if self.boundaries.len() > 1 {
            assert!(
                shifted < self.boundaries[1],
                "upbeat would swallow the first interval"
            );
        }
        self.boundaries[0] = shifted;
    }
}

/// Run the partition state machine over a merged stream. The same machine
/// serves every unit; only the position accessor differs.
fn build_map<T, F>(merged: &[MergedEvent], division: TimeDivision, position: F) -> TimeSigMap<T>
where
    T: PartialOrd + Copy,
    F: Fn(&TimeCursor) -> T,
{
    let mut clock = TimeCursor::new(division);
    let mut boundaries = vec![position(&clock)];
    let mut signatures: Vec<TimeSignature> = Vec::new();
    let mut current = TimeSignature::default();

    for event in merged {
        clock.advance_to(event.tick);
        match event.event {
            TypedEvent::TempoChange { micros_per_quarter } => {
                clock.set_tempo(micros_per_quarter);
            }
            TypedEvent::TimeSignatureChange {
                numerator,
                denominator_pow2,
                ..
            } => {
                let here = position(&clock);
                let open = *boundaries.last().expect("map always has a start boundary");
                let next = TimeSignature {
                    numerator,
                    denominator: 1u8 << denominator_pow2,
                };
                if here == open {
                    // change at the open boundary (tick 0, or a same-tick
                    // double change): set the signature, no empty interval
                    current = next;
                } else {
                    assert!(here > open, "signature map boundaries must increase");
                    boundaries.push(here);
                    signatures.push(current);
                    current = next;
                }
            }
            _ => {}
        }
    }

    let end = position(&clock);
    if end > *boundaries.last().expect("map always has a start boundary") {
        boundaries.push(end);
        signatures.push(current);
    }

    TimeSigMap {
        boundaries,
        signatures,
    }
}

pub fn time_signatures_in_ticks(smf: &Smf, upbeat: i64) -> TimeSigMap<i64> {
    let division = TimeDivision::from_timing(smf.header.timing);
    let mut map = build_map(&merge_tracks(smf), division, |clock| clock.ticks() as i64);
    map.shift_start(upbeat);
    map
}

pub fn time_signatures_in_durations(smf: &Smf, upbeat: Fraction) -> TimeSigMap<Fraction> {
    let division = TimeDivision::from_timing(smf.header.timing);
    let mut map = build_map(&merge_tracks(smf), division, TimeCursor::wholes);
    map.shift_start(upbeat);
    map
}

pub fn time_signatures_in_seconds(smf: &Smf, upbeat: f64) -> TimeSigMap<f64> {
    let division = TimeDivision::from_timing(smf.header.timing);
    let mut map = build_map(&merge_tracks(smf), division, TimeCursor::seconds);
    map.shift_start(upbeat);
    map
}

/// A signature map in whichever unit was configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitTimeSigMap {
    Ticks(TimeSigMap<i64>),
    Durations(TimeSigMap<Fraction>),
    Seconds(TimeSigMap<f64>),
}

/// Unit-dispatching entry point for string-configured callers. The upbeat is
/// interpreted in the selected unit; for tick maps its integer part is used.
pub fn time_signature_map(smf: &Smf, unit: MapUnit, upbeat: Fraction) -> UnitTimeSigMap {
    let division = TimeDivision::from_timing(smf.header.timing);
    partition_merged(&merge_tracks(smf), division, unit, upbeat)
}

/// Same as [`time_signature_map`], over an already merged stream, so one
/// read-only merged sequence can feed both this pass and note matching.
pub fn partition_merged(
    merged: &[MergedEvent],
    division: TimeDivision,
    unit: MapUnit,
    upbeat: Fraction,
) -> UnitTimeSigMap {
    match unit {
        MapUnit::Ticks => {
            let mut map = build_map(merged, division, |clock| clock.ticks() as i64);
            map.shift_start(upbeat.to_integer());
            UnitTimeSigMap::Ticks(map)
        }
        MapUnit::Durations => {
            let mut map = build_map(merged, division, TimeCursor::wholes);
            map.shift_start(upbeat);
            UnitTimeSigMap::Durations(map)
        }
        MapUnit::Seconds => {
            let mut map = build_map(merged, division, TimeCursor::seconds);
            map.shift_start(upbeat.to_f64().unwrap_or(0.0));
            UnitTimeSigMap::Seconds(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn make_smf(ppq: u16, tracks: &[&[u8]]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"MThd");
        buf.extend_from_slice(&6u32.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
        buf.extend_from_slice(&ppq.to_be_bytes());

        for track in tracks {
            buf.extend_from_slice(b"MTrk");
            buf.extend_from_slice(&(track.len() as u32 + 4).to_be_bytes());
            buf.extend_from_slice(track);
            buf.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
        }

        buf
    }

    fn sig(numerator: u8, denominator: u8) -> TimeSignature {
        TimeSignature {
            numerator,
            denominator,
        }
    }

    /// Tempo and 4/4 at tick 0, a quarter note at 480..960, 3/4 at 1920,
    /// another bar of music after the change.
    fn example_track() -> &'static [u8] {
        &[
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // tempo 500000
            0x00, 0xFF, 0x58, 0x04, 0x04, 0x02, 0x18, 0x08, // 4/4
            0x83, 0x60, 0x90, 60, 80, // on at 480
            0x83, 0x60, 0x80, 60, 0, // off at 960
            0x87, 0x40, 0xFF, 0x58, 0x04, 0x03, 0x02, 0x18, 0x08, // 3/4 at 1920
            0x00, 0x90, 62, 80, //
            0x8B, 0x20, 0x80, 62, 0, // off at 3360
        ]
    }

    #[test]
    fn partition_in_ticks() {
        let bytes = make_smf(480, &[example_track()]);
        let smf = Smf::parse(&bytes).unwrap();

        let map = time_signatures_in_ticks(&smf, 0);

        assert_eq!(map.boundaries(), &[0, 1920, 3360]);
        assert_eq!(map.signatures(), &[sig(4, 4), sig(3, 4)]);
    }

    #[test]
    fn partition_in_durations() {
        let bytes = make_smf(480, &[example_track()]);
        let smf = Smf::parse(&bytes).unwrap();

        let map = time_signatures_in_durations(&smf, Fraction::from_integer(0));

        assert_eq!(
            map.boundaries(),
            &[
                Fraction::from_integer(0),
                Fraction::from_integer(1),
                Fraction::new(7, 4),
            ]
        );
        assert_eq!(map.signatures(), &[sig(4, 4), sig(3, 4)]);
    }

    #[test]
    fn partition_in_seconds_follows_tempo() {
        // 4/4 at 0, tempo doubles at 960, 3/4 at 1920, music to 2880
        let track: &[u8] = &[
            0x00, 0xFF, 0x58, 0x04, 0x04, 0x02, 0x18, 0x08, // 4/4
            0x00, 0x90, 60, 80, //
            0x87, 0x40, 0x80, 60, 0, // off at 960
            0x00, 0xFF, 0x51, 0x03, 0x03, 0xD0, 0x90, // 250000 at 960
            0x87, 0x40, 0xFF, 0x58, 0x04, 0x03, 0x02, 0x18, 0x08, // 3/4 at 1920
            0x00, 0x90, 62, 80, //
            0x87, 0x40, 0x80, 62, 0, // off at 2880
        ];
        let bytes = make_smf(480, &[track]);
        let smf = Smf::parse(&bytes).unwrap();

        let map = time_signatures_in_seconds(&smf, 0.0);

        let boundaries = map.boundaries();
        assert_eq!(boundaries.len(), 3);
        assert!((boundaries[0] - 0.0).abs() < 1e-9);
        // two quarters at 120 bpm, then two at 240 bpm
        assert!((boundaries[1] - 1.5).abs() < 1e-9);
        assert!((boundaries[2] - 2.0).abs() < 1e-9);
        assert_eq!(map.signatures(), &[sig(4, 4), sig(3, 4)]);
    }

    #[test]
    fn change_at_tick_zero_is_absorbed() {
        let track: &[u8] = &[
            0x00, 0xFF, 0x58, 0x04, 0x03, 0x03, 0x18, 0x08, // 3/8 at 0
            0x00, 0x90, 60, 80, //
            0x60, 0x80, 60, 0,
        ];
        let bytes = make_smf(96, &[track]);
        let smf = Smf::parse(&bytes).unwrap();

        let map = time_signatures_in_ticks(&smf, 0);

        assert_eq!(map.boundaries(), &[0, 96]);
        assert_eq!(map.signatures(), &[sig(3, 8)]);
    }

    #[test]
    fn trailing_change_emits_no_empty_interval() {
        // the 3/4 change is the last thing in the stream
        let track: &[u8] = &[
            0x00, 0x90, 60, 80, //
            0x60, 0x80, 60, 0, //
            0x00, 0xFF, 0x58, 0x04, 0x03, 0x02, 0x18, 0x08,
        ];
        let bytes = make_smf(96, &[track]);
        let smf = Smf::parse(&bytes).unwrap();

        let map = time_signatures_in_ticks(&smf, 0);

        assert_eq!(map.boundaries(), &[0, 96]);
        assert_eq!(map.signatures(), &[sig(4, 4)]);
    }

    #[test]
    fn upbeat_shifts_only_the_first_boundary() {
        let bytes = make_smf(480, &[example_track()]);
        let smf = Smf::parse(&bytes).unwrap();

        let map = time_signatures_in_durations(&smf, Fraction::new(1, 8));

        assert_eq!(
            map.boundaries(),
            &[
                Fraction::new(-1, 8),
                Fraction::from_integer(1),
                Fraction::new(7, 4),
            ]
        );
        assert_eq!(map.signatures(), &[sig(4, 4), sig(3, 4)]);
    }

    #[test]
    fn signature_queries() {
        let bytes = make_smf(480, &[example_track()]);
        let smf = Smf::parse(&bytes).unwrap();

        let map = time_signatures_in_ticks(&smf, 0);

        assert_eq!(map.signature_at(-1), None);
        assert_eq!(map.signature_at(0), Some(sig(4, 4)));
        assert_eq!(map.signature_at(1919), Some(sig(4, 4)));
        assert_eq!(map.signature_at(1920), Some(sig(3, 4)));
        // the final meter persists past the last boundary
        assert_eq!(map.signature_at(10_000), Some(sig(3, 4)));
    }

    #[test]
    fn boundary_invariant_holds() {
        let bytes = make_smf(480, &[example_track()]);
        let smf = Smf::parse(&bytes).unwrap();

        let map = time_signatures_in_ticks(&smf, 0);
        assert_eq!(map.boundaries().len(), map.signatures().len() + 1);

        let windows: Vec<_> = map.boundaries().windows(2).collect();
        assert!(windows.iter().all(|w| w[0] < w[1]));
    }

    #[test]
    fn unit_dispatch() {
        let bytes = make_smf(480, &[example_track()]);
        let smf = Smf::parse(&bytes).unwrap();

        let map = time_signature_map(&smf, MapUnit::Seconds, Fraction::new(1, 2));
        match map {
            UnitTimeSigMap::Seconds(map) => {
                assert!((map.boundaries()[0] + 0.5).abs() < 1e-9);
            }
            other => panic!("expected a seconds map, got {other:?}"),
        }
    }

    #[test]
    fn both_passes_share_one_merged_stream() {
        use crate::note::{match_notes, NoteOptions};

        let bytes = make_smf(480, &[example_track()]);
        let smf = Smf::parse(&bytes).unwrap();
        let division = TimeDivision::from_timing(smf.header.timing);
        let merged = merge_tracks(&smf);

        let notes = match_notes(&merged, division, &NoteOptions::default());
        let map = partition_merged(&merged, division, MapUnit::Ticks, Fraction::from_integer(0));

        assert_eq!(notes.len(), 2);
        match map {
            UnitTimeSigMap::Ticks(map) => {
                assert_eq!(map.boundaries(), &[0, 1920, 3360])
            }
            other => panic!("expected a tick map, got {other:?}"),
        }
    }

    #[test]
    fn unit_parses_from_config_strings() {
        assert_eq!("ticks".parse::<MapUnit>().unwrap(), MapUnit::Ticks);
        assert_eq!("durations".parse::<MapUnit>().unwrap(), MapUnit::Durations);
        assert_eq!("seconds".parse::<MapUnit>().unwrap(), MapUnit::Seconds);
        assert!("bars".parse::<MapUnit>().is_err());
    }
}

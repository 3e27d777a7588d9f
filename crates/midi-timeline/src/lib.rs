//! Note tables and time-signature maps from decoded MIDI files.
//!
//! This crate turns a [`midly::Smf`] into two analysis-ready views:
//!
//! - a flat, time-ordered list of [`NoteRecord`]s, with onset and offset
//!   expressed simultaneously in ticks, exact whole-note fractions, and
//!   wall-clock seconds;
//! - a [`TimeSigMap`] partitioning the timeline into intervals labeled with
//!   the time signature in force, in a caller-selected unit.
//!
//! Both views are derived from the same merged event stream: per-track
//! sequences are upcast into a closed event set, annotated with the running
//! key signature, and merged into one globally tick-ordered sequence.
//!
//! # Example
//!
//! ```no_run
//! use midi_timeline::{extract_notes, time_signatures_in_ticks, NoteOptions};
//!
//! let bytes = std::fs::read("song.mid").unwrap();
//! let smf = midly::Smf::parse(&bytes).unwrap();
//!
//! let notes = extract_notes(&smf, &NoteOptions::default());
//! let meters = time_signatures_in_ticks(&smf, 0);
//! for note in &notes {
//!     println!("{} @ {}s", note.pitch, note.onset_seconds);
//! }
//! println!("opens in {}", meters.signatures()[0]);
//! ```

pub mod event;
pub mod merge;
pub mod meter;
pub mod note;
pub mod timing;

pub use event::{KeySignature, TimeSignature, TypedEvent};
pub use merge::{merge_tracks, MergedEvent};
pub use meter::{
    partition_merged, time_signature_map, time_signatures_in_durations,
    time_signatures_in_seconds, time_signatures_in_ticks, MapUnit, TimeSigMap, UnitTimeSigMap,
};
pub use note::{extract_notes, match_notes, Discipline, NoteOptions, NoteRecord};
pub use timing::{Fraction, TimeCursor, TimeDivision, DEFAULT_TEMPO};

/// Configuration errors, reported before any processing begins.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown overlap discipline {0:?}, expected \"queue\" or \"stack\"")]
    UnknownDiscipline(String),
    #[error("unknown map unit {0:?}, expected \"ticks\", \"durations\" or \"seconds\"")]
    UnknownUnit(String),
}

pub type Result<T> = std::result::Result<T, Error>;

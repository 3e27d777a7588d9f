use std::cmp::Reverse;
use std::collections::BinaryHeap;

use midly::{Smf, TrackEvent};

use crate::event::{KeySignature, TypedEvent};

/// One event of the merged stream: absolute tick, source track, and the key
/// signature active at that point. The key is a snapshot, not a reference;
/// key-signature events themselves never appear in the merged output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergedEvent {
    pub track: usize,
    pub key: KeySignature,
    pub tick: u64,
    pub event: TypedEvent,
}

/// Resolve one track: accumulate absolute ticks and thread the running key
/// signature through, consuming key events into annotations on everything
/// that follows them.
fn prepare_track(track_index: usize, track: &[TrackEvent]) -> Vec<MergedEvent> {
    let mut current_tick: u64 = 0;
    let mut key = KeySignature::default();
    let mut prepared = Vec::with_capacity(track.len());

    for event in track {
        current_tick += event.delta.as_int() as u64;
        match TypedEvent::from_kind(&event.kind) {
            TypedEvent::KeySignatureChange { sharps, major } => {
                key = KeySignature { sharps, major };
            }
            typed => prepared.push(MergedEvent {
                track: track_index,
                key,
                tick: current_tick,
                event: typed,
            }),
        }
    }

    prepared
}

/// Merge all tracks into one sequence, non-decreasing in tick time.
///
/// A binary heap over the per-track heads keyed by `(tick, track)` gives
/// O(n log k) selection. Events within one track keep their order (only the
/// head of each track is ever in the heap), and ties across tracks resolve
/// by ascending track index, so the output is deterministic.
pub fn merge_tracks(smf: &Smf) -> Vec<MergedEvent> {
    let prepared: Vec<Vec<MergedEvent>> = smf
        .tracks
        .iter()
        .enumerate()
        .map(|(index, track)| prepare_track(index, track))
        .collect();

    let total: usize = prepared.iter().map(Vec::len).sum();
    let mut merged = Vec::with_capacity(total);

    // heap entries: (tick of track head, track index, cursor into that track)
    let mut heads: BinaryHeap<Reverse<(u64, usize, usize)>> = prepared
        .iter()
        .enumerate()
        .filter(|(_, events)| !events.is_empty())
        .map(|(track, events)| Reverse((events[0].tick, track, 0)))
        .collect();

    while let Some(Reverse((_, track, position))) = heads.pop() {
        merged.push(prepared[track][position]);
        if let Some(next) = prepared[track].get(position + 1) {
            heads.push(Reverse((next.tick, track, position + 1)));
        }
    }

    merged
}

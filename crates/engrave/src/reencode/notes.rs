use midly::{MetaMessage, MidiMessage, Smf, TrackEventKind};
use std::collections::{BTreeMap, HashMap};

/// MIDI channel 10, reserved for unpitched percussion.
const DRUM_CHANNEL: u8 = 9;

/// A note with absolute timing in ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedNote {
    pub onset_tick: u64,
    pub offset_tick: u64,
    pub pitch: u8,
    pub channel: u8,
    pub track_index: usize,
}

/// Key signature as stored in the MIDI meta event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySignature {
    /// Negative for flats, positive for sharps.
    pub accidentals: i8,
    pub minor: bool,
}

/// File-level facts the writer needs besides the notes.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreContext {
    pub ppq: u16,
    pub format: u8,
    /// First tempo event, if any.
    pub tempo_bpm: Option<f64>,
    /// First time signature as (numerator, denominator).
    pub time_signature: Option<(u8, u8)>,
    pub key: Option<KeySignature>,
    /// `TrackName` meta text per track, when present.
    pub track_names: Vec<Option<String>>,
}

/// Notes belonging to one staff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub id: String,
    pub notes: Vec<TimedNote>,
}

/// Pair note-on/note-off events and collect the first tempo, meter and key.
pub fn extract_notes(smf: &Smf) -> (Vec<TimedNote>, ScoreContext) {
    let ppq = match smf.header.timing {
        midly::Timing::Metrical(ticks) => ticks.as_int(),
        midly::Timing::Timecode(_, _) => 480,
    };

    let format = match smf.header.format {
        midly::Format::SingleTrack => 0,
        midly::Format::Parallel => 1,
        midly::Format::Sequential => 2,
    };

    let mut notes = Vec::new();
    let mut tempo_bpm = None;
    let mut time_signature = None;
    let mut key = None;
    let mut track_names = Vec::with_capacity(smf.tracks.len());

    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut current_tick: u64 = 0;
        let mut track_name = None;
        // (channel, pitch) → stacked onsets
        let mut pending: HashMap<(u8, u8), Vec<u64>> = HashMap::new();

        for event in track {
            current_tick += event.delta.as_int() as u64;

            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    let usec = tempo.as_int().max(1);
                    tempo_bpm.get_or_insert(60_000_000.0 / usec as f64);
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(num, denom_pow, _, _)) => {
                    let denominator = 1u8.checked_shl(denom_pow.into()).unwrap_or(4);
                    time_signature.get_or_insert((num, denominator));
                }
                TrackEventKind::Meta(MetaMessage::KeySignature(accidentals, minor)) => {
                    key.get_or_insert(KeySignature { accidentals, minor });
                }
                TrackEventKind::Meta(MetaMessage::TrackName(raw)) => {
                    if track_name.is_none() {
                        let name = String::from_utf8_lossy(raw).trim().to_string();
                        if !name.is_empty() {
                            track_name = Some(name);
                        }
                    }
                }
                TrackEventKind::Midi { channel, message } => {
                    let ch = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            pending
                                .entry((ch, key.as_int()))
                                .or_default()
                                .push(current_tick);
                        }
                        MidiMessage::NoteOff { key, .. } | MidiMessage::NoteOn { key, .. } => {
                            let slot = (ch, key.as_int());
                            if let Some(onset) = pending.get_mut(&slot).and_then(|s| s.pop()) {
                                notes.push(TimedNote {
                                    onset_tick: onset,
                                    offset_tick: current_tick,
                                    pitch: slot.1,
                                    channel: ch,
                                    track_index,
                                });
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        // Unterminated notes end with their track
        for ((channel, pitch), stack) in pending {
            for onset in stack {
                notes.push(TimedNote {
                    onset_tick: onset,
                    offset_tick: current_tick,
                    pitch,
                    channel,
                    track_index,
                });
            }
        }

        track_names.push(track_name);
    }

    notes.sort_by_key(|n| (n.onset_tick, n.pitch));

    let context = ScoreContext {
        ppq,
        format,
        tempo_bpm,
        time_signature,
        key,
        track_names,
    };
    (notes, context)
}

/// Group notes into staves: one per track for multi-track files, one per
/// channel for single-track files. Percussion is left out.
pub fn split_parts(notes: Vec<TimedNote>, context: &ScoreContext) -> Vec<Part> {
    let by_channel = context.format == 0;
    let mut groups: BTreeMap<usize, Vec<TimedNote>> = BTreeMap::new();

    for note in notes.into_iter().filter(|n| n.channel != DRUM_CHANNEL) {
        let group = if by_channel {
            note.channel as usize
        } else {
            note.track_index
        };
        groups.entry(group).or_default().push(note);
    }

    let mut used = Vec::new();
    groups
        .into_iter()
        .enumerate()
        .map(|(index, (group, notes))| {
            let named = (!by_channel)
                .then(|| context.track_names.get(group).cloned().flatten())
                .flatten()
                .map(|name| staff_id(&name))
                .filter(|id| !id.is_empty() && !used.contains(id));
            let id = named.unwrap_or_else(|| format!("part{}", index + 1));
            used.push(id.clone());
            Part { id, notes }
        })
        .collect()
}

/// Reduce a track name to something safe inside a quoted staff id.
fn staff_id(name: &str) -> String {
    let id: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    id.trim_matches('_').to_string()
}

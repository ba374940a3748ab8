//! Plain LilyPond serialization of extracted parts.
//!
//! Timing is quantized to sixteenth notes. Durations are decomposed into
//! power-of-two note values (with single dots) and notes crossing a barline
//! are split into tied pieces. Pitches are absolute, not `\relative`.

use super::notes::{KeySignature, Part, ScoreContext, TimedNote};
use crate::error::{EngraveError, Result};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Version line written at the top of every generated score.
pub const LILYPOND_VERSION: &str = "2.24.0";

const SHARP_NAMES: [&str; 12] = [
    "c", "cis", "d", "dis", "e", "f", "fis", "g", "gis", "a", "ais", "b",
];

const FLAT_NAMES: [&str; 12] = [
    "c", "des", "d", "ees", "e", "f", "ges", "g", "aes", "a", "bes", "b",
];

/// Tonic per key signature, indexed by accidentals + 7.
const MAJOR_TONICS: [&str; 15] = [
    "ces", "ges", "des", "aes", "ees", "bes", "f", "c", "g", "d", "a", "e", "b", "fis", "cis",
];
const MINOR_TONICS: [&str; 15] = [
    "aes", "ees", "bes", "f", "c", "g", "d", "a", "e", "b", "fis", "cis", "gis", "dis", "ais",
];

/// Note values in sixteenths, largest first.
const DURATION_TABLE: [(u64, &str); 8] = [
    (16, "1"),
    (12, "2."),
    (8, "2"),
    (6, "4."),
    (4, "4"),
    (3, "8."),
    (2, "8"),
    (1, "16"),
];

/// Longest score written, in bars summed over all staves.
pub const MAX_SCORE_BARS: u64 = 10_000;

/// Mean pitch at or above which a part gets a treble clef.
const TREBLE_THRESHOLD: f64 = 60.0;

/// LilyPond absolute pitch. `c` with no octave marks is MIDI 48.
pub fn midi_to_ly_note(pitch: u8, flats: bool) -> String {
    let names = if flats { &FLAT_NAMES } else { &SHARP_NAMES };
    let octave = (pitch / 12) as i8 - 4;
    let mut note = names[(pitch % 12) as usize].to_string();
    let mark = if octave > 0 { '\'' } else { ',' };
    for _ in 0..octave.unsigned_abs() {
        note.push(mark);
    }
    note
}

/// Split a length in sixteenths into tied note values, largest first.
pub fn decompose_duration(mut sixteenths: u64) -> Vec<&'static str> {
    let mut parts = Vec::new();
    for &(value, name) in &DURATION_TABLE {
        while sixteenths >= value {
            parts.push(name);
            sixteenths -= value;
        }
    }
    parts
}

/// Split a span starting at `start` into pieces that each fit in one bar.
pub fn split_at_barlines(start: u64, duration: u64, bar_length: u64) -> Vec<u64> {
    let mut fragments = Vec::new();
    let mut remaining = duration;
    let mut pos = start;

    while remaining > 0 {
        let bar_end = (pos / bar_length + 1) * bar_length;
        let fragment = remaining.min(bar_end - pos);
        fragments.push(fragment);
        remaining -= fragment;
        pos += fragment;
    }
    fragments
}

/// `\key <tonic> \major|\minor`, or `None` for an out-of-range signature.
pub fn key_command(key: KeySignature) -> Option<String> {
    let index = usize::try_from(i16::from(key.accidentals) + 7).ok()?;
    let (tonic, mode) = if key.minor {
        (MINOR_TONICS.get(index)?, "minor")
    } else {
        (MAJOR_TONICS.get(index)?, "major")
    };
    Some(format!("\\key {} \\{}", tonic, mode))
}

/// The meter written as `\time`. Signatures that do not fill a whole number
/// of sixteenths become 4/4; `None` when the file has no time signature.
pub fn meter(time_signature: Option<(u8, u8)>) -> Option<(u8, u8)> {
    time_signature.map(|(num, den)| {
        if num > 0 && den > 0 && (num as u64 * 16) % den as u64 == 0 {
            (num, den)
        } else {
            (4, 4)
        }
    })
}

/// Bar length in sixteenths for a time signature, falling back to 4/4.
pub fn bar_length(time_signature: Option<(u8, u8)>) -> u64 {
    let (num, den) = meter(time_signature).unwrap_or((4, 4));
    num as u64 * 16 / den as u64
}

fn quantize(tick: u64, unit: u64) -> u64 {
    (tick + unit / 2) / unit
}

fn grid_unit(ppq: u16) -> u64 {
    (ppq as u64 / 4).max(1)
}

/// Bars a part fills once quantized and padded, at least one.
fn bars_in_part(notes: &[TimedNote], ppq: u16, bar_length: u64) -> u64 {
    let unit = grid_unit(ppq);
    let end = notes
        .iter()
        .map(|n| {
            let start = quantize(n.onset_tick, unit);
            quantize(n.offset_tick, unit).max(start + 1)
        })
        .max()
        .unwrap_or(0);
    end.div_ceil(bar_length).max(1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Notes {
        pitches: Vec<u8>,
        start: u64,
        duration: u64,
    },
    Rest {
        start: u64,
        duration: u64,
    },
}

/// Quantize notes into a gapless sequence of chords and rests, padded to a full bar.
fn collect_events(notes: &[TimedNote], ppq: u16, bar_length: u64) -> Vec<Event> {
    let unit = grid_unit(ppq);

    // onset → (pitches, latest end)
    let mut onsets: BTreeMap<u64, (Vec<u8>, u64)> = BTreeMap::new();
    for note in notes {
        let start = quantize(note.onset_tick, unit);
        let end = quantize(note.offset_tick, unit).max(start + 1);
        let slot = onsets.entry(start).or_default();
        slot.0.push(note.pitch);
        slot.1 = slot.1.max(end);
    }

    let starts: Vec<u64> = onsets.keys().copied().collect();
    let mut events = Vec::new();
    let mut pos = 0;

    for (i, (start, (mut pitches, end))) in onsets.into_iter().enumerate() {
        if start > pos {
            events.push(Event::Rest {
                start: pos,
                duration: start - pos,
            });
        }
        let end = starts.get(i + 1).map_or(end, |&next| end.min(next));
        pitches.sort_unstable();
        pitches.dedup();
        events.push(Event::Notes {
            pitches,
            start,
            duration: end - start,
        });
        pos = end;
    }

    let filled = pos % bar_length;
    if filled != 0 || events.is_empty() {
        events.push(Event::Rest {
            start: pos,
            duration: bar_length - filled,
        });
    }
    events
}

/// Render events one bar per line, each closed with a bar check.
fn render_events(events: &[Event], bar_length: u64, flats: bool) -> Vec<String> {
    let mut bars = Vec::new();
    let mut tokens: Vec<String> = Vec::new();

    for event in events {
        let (start, duration, pitch_text) = match event {
            Event::Notes {
                pitches,
                start,
                duration,
            } => {
                let names: Vec<String> =
                    pitches.iter().map(|&p| midi_to_ly_note(p, flats)).collect();
                let text = match names.as_slice() {
                    [single] => single.clone(),
                    _ => format!("<{}>", names.join(" ")),
                };
                (*start, *duration, Some(text))
            }
            Event::Rest { start, duration } => (*start, *duration, None),
        };

        let fragments = split_at_barlines(start, duration, bar_length);
        let mut pos = start;
        for (i, fragment) in fragments.iter().enumerate() {
            let values = decompose_duration(*fragment);
            for (j, value) in values.iter().enumerate() {
                let mut token = match &pitch_text {
                    Some(text) => format!("{}{}", text, value),
                    None => format!("r{}", value),
                };
                let more = j + 1 < values.len() || i + 1 < fragments.len();
                if pitch_text.is_some() && more {
                    token.push('~');
                }
                tokens.push(token);
            }
            pos += fragment;
            if pos % bar_length == 0 {
                bars.push(format!("{} |", tokens.join(" ")));
                tokens.clear();
            }
        }
    }

    if !tokens.is_empty() {
        bars.push(tokens.join(" "));
    }
    bars
}

/// `"treble"` for parts that sit around middle C or higher, otherwise empty.
fn clef_for(notes: &[TimedNote]) -> &'static str {
    if notes.is_empty() {
        return "";
    }
    let mean = notes.iter().map(|n| n.pitch as f64).sum::<f64>() / notes.len() as f64;
    if mean >= TREBLE_THRESHOLD {
        "treble"
    } else {
        ""
    }
}

/// Serialize parts into a complete score with a `\layout` block.
///
/// Fails with [`EngraveError::MalformedScoreInput`] when the notes span more
/// than [`MAX_SCORE_BARS`], before anything is rendered.
pub fn write_score(parts: &[Part], context: &ScoreContext) -> Result<String> {
    let bar_length = bar_length(context.time_signature);
    let flats = context.key.is_some_and(|k| k.accidentals < 0);

    let total_bars = parts.iter().try_fold(0u64, |total, part| {
        let total = total + bars_in_part(&part.notes, context.ppq, bar_length);
        (total <= MAX_SCORE_BARS).then_some(total)
    });
    if total_bars.is_none() {
        return Err(EngraveError::MalformedScoreInput(format!(
            "score is longer than {} bars",
            MAX_SCORE_BARS
        )));
    }

    let mut out = String::new();
    let _ = writeln!(out, "\\version \"{}\"", LILYPOND_VERSION);
    out.push('\n');
    out.push_str("\\score {\n");
    out.push_str("  <<\n");

    let placeholder;
    let parts = if parts.is_empty() {
        placeholder = [Part {
            id: "part1".to_string(),
            notes: Vec::new(),
        }];
        &placeholder[..]
    } else {
        parts
    };

    for (index, part) in parts.iter().enumerate() {
        let _ = writeln!(out, "    \\new Staff = \"{}\" {{", part.id);
        let _ = writeln!(out, "      \\clef \"{}\"", clef_for(&part.notes));
        if let Some(key) = context.key.and_then(key_command) {
            let _ = writeln!(out, "      {}", key);
        }
        if let Some((num, den)) = meter(context.time_signature) {
            let _ = writeln!(out, "      \\time {}/{}", num, den);
        }
        if let (0, Some(bpm)) = (index, context.tempo_bpm) {
            let _ = writeln!(out, "      \\tempo 4 = {}", bpm.round() as u32);
        }

        let events = collect_events(&part.notes, context.ppq, bar_length);
        for bar in render_events(&events, bar_length, flats) {
            let _ = writeln!(out, "      {}", bar);
        }
        out.push_str("    }\n");
    }

    out.push_str("  >>\n");
    out.push_str("  \\layout { }\n");
    out.push_str("}\n");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn note(onset: u64, offset: u64, pitch: u8) -> TimedNote {
        TimedNote {
            onset_tick: onset,
            offset_tick: offset,
            pitch,
            channel: 0,
            track_index: 0,
        }
    }

    #[test]
    fn pitch_names_and_octaves() {
        assert_eq!(midi_to_ly_note(48, false), "c");
        assert_eq!(midi_to_ly_note(60, false), "c'");
        assert_eq!(midi_to_ly_note(47, false), "b,");
        assert_eq!(midi_to_ly_note(61, false), "cis'");
        assert_eq!(midi_to_ly_note(61, true), "des'");
        assert_eq!(midi_to_ly_note(84, false), "c'''");
        assert_eq!(midi_to_ly_note(24, false), "c,,");
    }

    #[test]
    fn durations_decompose_largest_first() {
        assert_eq!(decompose_duration(16), vec!["1"]);
        assert_eq!(decompose_duration(7), vec!["4.", "16"]);
        assert_eq!(decompose_duration(20), vec!["1", "4"]);
        assert!(decompose_duration(0).is_empty());
    }

    #[test]
    fn spans_split_at_barlines() {
        assert_eq!(split_at_barlines(12, 8, 16), vec![4, 4]);
        assert_eq!(split_at_barlines(0, 16, 16), vec![16]);
        assert_eq!(split_at_barlines(10, 30, 12), vec![2, 12, 12, 4]);
    }

    #[test]
    fn key_signatures() {
        let key = |accidentals, minor| key_command(KeySignature { accidentals, minor });
        assert_eq!(key(0, false).as_deref(), Some("\\key c \\major"));
        assert_eq!(key(-3, false).as_deref(), Some("\\key ees \\major"));
        assert_eq!(key(0, true).as_deref(), Some("\\key a \\minor"));
        assert_eq!(key(-7, false).as_deref(), Some("\\key ces \\major"));
        assert_eq!(key(8, false), None);
    }

    #[test]
    fn bar_lengths() {
        assert_eq!(bar_length(None), 16);
        assert_eq!(bar_length(Some((3, 4))), 12);
        assert_eq!(bar_length(Some((6, 8))), 12);
        assert_eq!(bar_length(Some((5, 32))), 16);
        assert_eq!(bar_length(Some((0, 4))), 16);
    }

    #[test]
    fn unusable_meters_are_written_as_common_time() {
        assert_eq!(meter(None), None);
        assert_eq!(meter(Some((6, 8))), Some((6, 8)));
        assert_eq!(meter(Some((0, 4))), Some((4, 4)));
        assert_eq!(meter(Some((5, 32))), Some((4, 4)));

        for time_signature in [(0, 4), (5, 32)] {
            let context = ScoreContext {
                ppq: 480,
                format: 1,
                tempo_bpm: None,
                time_signature: Some(time_signature),
                key: None,
                track_names: Vec::new(),
            };
            let parts = vec![Part {
                id: "melody".to_string(),
                notes: vec![note(0, 1920, 60)],
            }];
            let score = write_score(&parts, &context).unwrap();
            assert!(score.contains("      \\time 4/4\n      c'1 |\n"), "{}", score);
        }
    }

    #[test]
    fn overlong_scores_are_rejected() {
        let context = ScoreContext {
            ppq: 4,
            format: 1,
            tempo_bpm: None,
            time_signature: None,
            key: None,
            track_names: Vec::new(),
        };
        let part = |end_bar: u64| Part {
            id: "drone".to_string(),
            notes: vec![note(0, end_bar * 16, 48)],
        };

        assert!(write_score(&[part(MAX_SCORE_BARS)], &context).is_ok());

        let err = write_score(&[part(MAX_SCORE_BARS + 1)], &context).unwrap_err();
        assert!(matches!(err, EngraveError::MalformedScoreInput(_)));

        // the limit counts every staff
        let halves = [part(MAX_SCORE_BARS / 2), part(MAX_SCORE_BARS / 2 + 1)];
        assert!(write_score(&halves, &context).is_err());
    }

    #[test]
    fn chords_rests_and_padding() {
        let notes = [note(0, 480, 60), note(0, 480, 64), note(960, 1440, 67)];
        let events = collect_events(&notes, 480, 16);
        let bars = render_events(&events, 16, false);
        assert_eq!(bars, vec!["<c' e'>4 r4 g'4 r4 |"]);
    }

    #[test]
    fn notes_crossing_a_barline_are_tied() {
        let notes = [note(1440, 2400, 60)];
        let events = collect_events(&notes, 480, 16);
        let bars = render_events(&events, 16, false);
        assert_eq!(bars, vec!["r2. c'4~ |", "c'4 r2. |"]);
    }

    #[test]
    fn overlapping_notes_are_cut_at_next_onset() {
        let notes = [note(0, 1920, 48), note(480, 960, 52)];
        let events = collect_events(&notes, 480, 16);
        let bars = render_events(&events, 16, false);
        assert_eq!(bars, vec!["c4 e4 r2 |"]);
    }

    #[test]
    fn empty_part_is_a_bar_rest() {
        let events = collect_events(&[], 480, 12);
        assert_eq!(render_events(&events, 12, false), vec!["r2. |"]);
    }

    #[test]
    fn low_parts_get_an_empty_clef() {
        assert_eq!(clef_for(&[note(0, 1, 72), note(0, 1, 50)]), "treble");
        assert_eq!(clef_for(&[note(0, 1, 40), note(0, 1, 55)]), "");
    }

    #[test]
    fn score_layout() {
        let context = ScoreContext {
            ppq: 480,
            format: 1,
            tempo_bpm: Some(96.0),
            time_signature: Some((3, 4)),
            key: Some(KeySignature {
                accidentals: -1,
                minor: false,
            }),
            track_names: Vec::new(),
        };
        let parts = vec![
            Part {
                id: "upper".to_string(),
                notes: vec![note(0, 1440, 70)],
            },
            Part {
                id: "part2".to_string(),
                notes: vec![note(0, 1440, 41)],
            },
        ];

        let expected = r#"\version "2.24.0"

\score {
  <<
    \new Staff = "upper" {
      \clef "treble"
      \key f \major
      \time 3/4
      \tempo 4 = 96
      bes'2. |
    }
    \new Staff = "part2" {
      \clef ""
      \key f \major
      \time 3/4
      f,2. |
    }
  >>
  \layout { }
}
"#;
        assert_eq!(write_score(&parts, &context).unwrap(), expected);
    }
}

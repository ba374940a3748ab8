//! MIDI to LilyPond re-encoding.
//!
//! Two stages: a plain serialization of the MIDI content ([`lilypond`]) and an
//! optional text pass ([`enhance`]) that names the staves, fills in missing
//! clefs, header, tempo and MIDI output.

pub mod enhance;
pub mod lilypond;
pub mod notes;

use crate::error::{EngraveError, Result};
use midly::Smf;
use tracing::debug;

/// Re-encode a MIDI file as LilyPond source.
///
/// With `enhance` unset the raw serialization is returned as is.
pub fn midi_to_notation(
    midi_bytes: &[u8],
    title: &str,
    composer: &str,
    enhance: bool,
) -> Result<String> {
    let smf =
        Smf::parse(midi_bytes).map_err(|e| EngraveError::MalformedScoreInput(e.to_string()))?;

    let (notes, context) = notes::extract_notes(&smf);
    let note_count = notes.len();
    let parts = notes::split_parts(notes, &context);

    debug!(
        format = context.format,
        ppq = context.ppq,
        notes = note_count,
        parts = parts.len(),
        "re-encoding MIDI"
    );

    let raw = lilypond::write_score(&parts, &context)?;
    if !enhance {
        return Ok(raw);
    }
    Ok(enhance::enhance(&raw, title, composer))
}

#[cfg(test)]
mod test_midi {
    /// Format 1 file: a tempo/meta track plus one track per entry of `tracks`,
    /// each a list of (delta, status, data1, data2) channel events.
    pub fn format1(ppq: u16, meta: &[u8], tracks: &[(&str, Vec<(u32, u8, u8, u8)>)]) -> Vec<u8> {
        let mut chunks = Vec::new();

        let mut track0 = meta.to_vec();
        track0.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
        chunks.push(track0);

        for (name, events) in tracks {
            let mut data = vec![0x00, 0xFF, 0x03, name.len() as u8];
            data.extend_from_slice(name.as_bytes());
            for &(delta, status, d1, d2) in events.iter() {
                write_vlq(&mut data, delta);
                data.extend_from_slice(&[status, d1, d2]);
            }
            data.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
            chunks.push(data);
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(b"MThd");
        buf.extend_from_slice(&6u32.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&(chunks.len() as u16).to_be_bytes());
        buf.extend_from_slice(&ppq.to_be_bytes());
        for chunk in chunks {
            buf.extend_from_slice(b"MTrk");
            buf.extend_from_slice(&(chunk.len() as u32).to_be_bytes());
            buf.extend_from_slice(&chunk);
        }
        buf
    }

    fn write_vlq(buf: &mut Vec<u8>, mut value: u32) {
        let mut bytes = vec![(value & 0x7F) as u8];
        value >>= 7;
        while value > 0 {
            bytes.push((value & 0x7F) as u8 | 0x80);
            value >>= 7;
        }
        bytes.reverse();
        buf.extend_from_slice(&bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// 120 bpm, 4/4, C major
    const META: &[u8] = &[
        0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, //
        0x00, 0xFF, 0x58, 0x04, 0x04, 0x02, 0x18, 0x08, //
        0x00, 0xFF, 0x59, 0x02, 0x00, 0x00,
    ];

    fn piano() -> Vec<u8> {
        test_midi::format1(
            480,
            META,
            &[
                (
                    "RH",
                    vec![
                        (0, 0x90, 72, 80),
                        (480, 0x80, 72, 0),
                        (0, 0x90, 76, 80),
                        (480, 0x80, 76, 0),
                        (0, 0x90, 79, 80),
                        (960, 0x80, 79, 0),
                    ],
                ),
                ("LH", vec![(0, 0x91, 36, 70), (1920, 0x81, 36, 0)]),
            ],
        )
    }

    #[test]
    fn raw_output() {
        let expected = r#"\version "2.24.0"

\score {
  <<
    \new Staff = "RH" {
      \clef "treble"
      \key c \major
      \time 4/4
      \tempo 4 = 120
      c''4 e''4 g''2 |
    }
    \new Staff = "LH" {
      \clef ""
      \key c \major
      \time 4/4
      c,1 |
    }
  >>
  \layout { }
}
"#;
        assert_eq!(midi_to_notation(&piano(), "x", "y", false).unwrap(), expected);
    }

    #[test]
    fn enhanced_output() {
        let expected = r#"\version "2.24.0"

\header {
  title = "Ascension"
  composer = "Unknown"
}

\score {
  <<
    \new Staff = "upper" {
      \clef "treble"
      \key c \major
      \time 4/4
      \tempo 4 = 120
      c''4 e''4 g''2 |
    }
    \new Staff = "lower" {
      \clef "bass"
      \key c \major
      \time 4/4
      c,1 |
    }
  >>
  \layout { }
  \midi { }
}
"#;
        assert_eq!(
            midi_to_notation(&piano(), "Ascension", "Unknown", true).unwrap(),
            expected
        );
    }

    #[test]
    fn tempo_added_only_when_missing() {
        let solo = vec![(0, 0x90, 67, 90), (1920, 0x80, 67, 0)];
        let midi = test_midi::format1(480, &[], &[("Solo", solo)]);

        let raw = midi_to_notation(&midi, "", "", false).unwrap();
        assert!(!raw.contains("\\tempo"));
        assert!(!raw.contains("\\time"));

        let enhanced = midi_to_notation(&midi, "", "", true).unwrap();
        assert_eq!(enhanced.matches("\\tempo 4 = 120").count(), 1);
        assert!(enhanced.contains("      \\clef \"treble\"\n      \\tempo 4 = 120\n"));
    }

    #[test]
    fn flat_keys_spell_with_flats() {
        // Bb major (two flats)
        let meta = [0x00, 0xFF, 0x59, 0x02, 0xFE, 0x00];
        let horn = vec![(0, 0x90, 70, 90), (384, 0x80, 70, 0)];
        let midi = test_midi::format1(96, &meta, &[("Horn", horn)]);

        let raw = midi_to_notation(&midi, "", "", false).unwrap();
        assert!(raw.contains("\\key bes \\major"));
        assert!(raw.contains("bes'1 |"));
    }

    #[test]
    fn garbage_is_malformed_input() {
        let err = midi_to_notation(b"not a midi file", "t", "c", true).unwrap_err();
        assert!(matches!(err, EngraveError::MalformedScoreInput(_)));
        assert_eq!(err.kind(), "malformed_score_input");
    }

    #[test]
    fn huge_note_lengths_fail_fast() {
        // one tick per sixteenth, held for the largest delta a file can encode
        let drone = vec![(0, 0x90, 60, 80), (0x0FFF_FFFF, 0x80, 60, 0)];
        let midi = test_midi::format1(4, META, &[("Drone", drone)]);

        let started = std::time::Instant::now();
        let err = midi_to_notation(&midi, "t", "c", false).unwrap_err();
        assert!(matches!(err, EngraveError::MalformedScoreInput(_)));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn zero_numerator_time_signature_is_common_time() {
        let meta = [0x00, 0xFF, 0x58, 0x04, 0x00, 0x02, 0x18, 0x08];
        let solo = vec![(0, 0x90, 60, 80), (1920, 0x80, 60, 0)];
        let midi = test_midi::format1(480, &meta, &[("Solo", solo)]);

        let raw = midi_to_notation(&midi, "", "", false).unwrap();
        assert!(!raw.contains("\\time 0/4"));
        assert!(raw.contains("      \\time 4/4\n      c'1 |\n"));
    }

    #[test]
    fn no_notes_still_yields_a_score() {
        let midi = test_midi::format1(480, META, &[]);
        let raw = midi_to_notation(&midi, "", "", false).unwrap();
        assert!(raw.contains("\\new Staff = \"part1\""));
        assert!(raw.contains("r1 |"));
    }
}

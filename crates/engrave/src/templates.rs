//! Starter scores for common ensembles.

/// A named starter score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub name: &'static str,
    pub source: &'static str,
}

const PIANO_SOLO: &str = r#"\version "2.24.0"

\header {
  title = "Piano Solo"
  composer = "Unknown"
}

upper = \relative c'' {
  \clef treble
  \key c \major
  \time 4/4
  \tempo 4 = 100
  c4 d e f | g1 |
}

lower = \relative c {
  \clef bass
  \key c \major
  \time 4/4
  c1 | g'1 |
}

\score {
  \new PianoStaff <<
    \new Staff = "upper" \upper
    \new Staff = "lower" \lower
  >>
  \layout { }
  \midi { }
}
"#;

const STRING_QUARTET: &str = r#"\version "2.24.0"

\header {
  title = "String Quartet"
  composer = "Unknown"
}

global = {
  \key g \major
  \time 3/4
  \tempo 4 = 90
}

\score {
  \new StaffGroup <<
    \new Staff \with { instrumentName = "Violin I" } { \global \clef treble d''2. | b'2. | }
    \new Staff \with { instrumentName = "Violin II" } { \global \clef treble b'2. | g'2. | }
    \new Staff \with { instrumentName = "Viola" } { \global \clef alto g'2. | d'2. | }
    \new Staff \with { instrumentName = "Cello" } { \global \clef bass g,2. | g,2. | }
  >>
  \layout { }
  \midi { }
}
"#;

const LEAD_SHEET: &str = r#"\version "2.24.0"

\header {
  title = "Lead Sheet"
  composer = "Unknown"
}

harmonies = \chordmode {
  c1 | a1:m | f1 | g1:7 |
}

melody = \relative c'' {
  \clef treble
  \key c \major
  \time 4/4
  \tempo 4 = 120
  e4 d c d | e e e2 | f4 e d c | d1 |
}

\score {
  <<
    \new ChordNames \harmonies
    \new Staff \melody
  >>
  \layout { }
  \midi { }
}
"#;

const SATB_CHOIR: &str = r#"\version "2.24.0"

\header {
  title = "SATB Choir"
  composer = "Unknown"
}

global = {
  \key f \major
  \time 4/4
  \tempo 4 = 72
}

\score {
  \new ChoirStaff <<
    \new Staff <<
      \new Voice = "soprano" { \global \voiceOne c''2 a'2 | f'1 | }
      \new Voice = "alto" { \global \voiceTwo a'2 f'2 | c'1 | }
    >>
    \new Staff <<
      \clef bass
      \new Voice = "tenor" { \global \voiceOne f2 c'2 | a1 | }
      \new Voice = "bass" { \global \voiceTwo f,2 f,2 | f,1 | }
    >>
  >>
  \layout { }
  \midi { }
}
"#;

const TEMPLATES: [Template; 4] = [
    Template {
        name: "Piano Solo",
        source: PIANO_SOLO,
    },
    Template {
        name: "String Quartet",
        source: STRING_QUARTET,
    },
    Template {
        name: "Lead Sheet",
        source: LEAD_SHEET,
    },
    Template {
        name: "SATB Choir",
        source: SATB_CHOIR,
    },
];

/// Every template, in display order.
pub fn all() -> &'static [Template] {
    &TEMPLATES
}

pub fn names() -> Vec<&'static str> {
    TEMPLATES.iter().map(|t| t.name).collect()
}

/// Look up a template by name, ignoring ASCII case.
pub fn get(name: &str) -> Option<&'static str> {
    TEMPLATES
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(name.trim()))
        .map(|t| t.source)
}

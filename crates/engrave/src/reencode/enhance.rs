//! Text-level clean-up of a generated score.
//!
//! Steps run in a fixed order, each on the output of the previous one:
//! staff names, empty clefs, header, tempo, MIDI block.

use crate::title::header_re;
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Staff ids given to the first two staves, top to bottom.
const STAFF_NAMES: [&str; 2] = ["upper", "lower"];

/// Tempo inserted when the score has none.
pub const DEFAULT_TEMPO: &str = "\\tempo 4 = 120";

fn staff_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\\new Staff\s*=\s*"[^"]*""#).expect("staff regex is valid"))
}

fn empty_clef_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\\clef\s*"""#).expect("clef regex is valid"))
}

fn version_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^[ \t]*\\version\s*"[^"]*"[^\n]*(\n|$)"#).expect("version regex is valid")
    })
}

fn clef_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^([ \t]*)\\clef\s*"[^"]*"[^\n]*$"#).expect("clef line regex is valid")
    })
}

fn staff_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\new Staff[^{]*\{").expect("staff open regex is valid"))
}

fn layout_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\layout\s*\{[^}]*\}").expect("layout regex is valid"))
}

fn field_re(field: &str) -> Regex {
    // Preceding character group keeps `title` from matching inside `subtitle`
    Regex::new(&format!(r#"(^|[^A-Za-z]){}\s*=\s*"(?:[^"\\]|\\.)*""#, field))
        .expect("header field regex is valid")
}

/// Apply every step in order.
pub fn enhance(source: &str, title: &str, composer: &str) -> String {
    let text = rename_staves(source);
    let text = fill_empty_clefs(&text);
    let text = set_header(&text, title, composer);
    let text = ensure_tempo(&text);
    ensure_midi_block(&text)
}

/// Rename the first two staves to `upper` and `lower`.
pub fn rename_staves(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for (found, name) in staff_re().find_iter(source).zip(STAFF_NAMES) {
        out.push_str(&source[last..found.start()]);
        out.push_str(&format!("\\new Staff = \"{}\"", name));
        last = found.end();
    }
    out.push_str(&source[last..]);
    out
}

/// `\clef ""` becomes `\clef "bass"`.
pub fn fill_empty_clefs(source: &str) -> String {
    empty_clef_re()
        .replace_all(source, r#"\clef "bass""#)
        .into_owned()
}

/// Write `title` and `composer` into the first `\header`, creating it after
/// the `\version` line (or at the top) when there is none.
pub fn set_header(source: &str, title: &str, composer: &str) -> String {
    let title = escape_string(title);
    let composer = escape_string(composer);

    if let Some(found) = header_re().captures(source) {
        let (Some(whole), Some(body)) = (found.get(0), found.get(1)) else {
            return source.to_string();
        };
        let body = set_field(body.as_str(), "title", &title);
        let body = set_field(&body, "composer", &composer);
        return format!(
            "{}\\header {{{}}}{}",
            &source[..whole.start()],
            body,
            &source[whole.end()..]
        );
    }

    let header = format!(
        "\\header {{\n  title = \"{}\"\n  composer = \"{}\"\n}}\n",
        title, composer
    );
    match version_line_re().find(source) {
        Some(line) => {
            let (before, after) = source.split_at(line.end());
            let newline = if before.ends_with('\n') { "" } else { "\n" };
            format!("{}{}\n{}{}", before, newline, header, after)
        }
        None => format!("{}\n{}", header, source),
    }
}

/// Overwrite `field` in a header body, or append it before the closing brace.
fn set_field(body: &str, field: &str, escaped_value: &str) -> String {
    let re = field_re(field);
    if re.is_match(body) {
        return re
            .replacen(body, 1, |caps: &Captures| {
                format!("{}{} = \"{}\"", &caps[1], field, escaped_value)
            })
            .into_owned();
    }

    let trimmed = body.trim_end();
    let line_break = if body.contains('\n') { "\n" } else { " " };
    format!(
        "{}{}  {} = \"{}\"{}",
        trimmed, line_break, field, escaped_value, line_break
    )
}

/// Add [`DEFAULT_TEMPO`] after the first clef, or after the first staff brace.
pub fn ensure_tempo(source: &str) -> String {
    if source.contains("\\tempo") {
        return source.to_string();
    }

    if let Some(caps) = clef_line_re().captures(source) {
        let (Some(line), Some(indent)) = (caps.get(0), caps.get(1)) else {
            return source.to_string();
        };
        return format!(
            "{}\n{}{}{}",
            &source[..line.end()],
            indent.as_str(),
            DEFAULT_TEMPO,
            &source[line.end()..]
        );
    }

    match staff_open_re().find(source) {
        Some(open) => format!(
            "{} {}{}",
            &source[..open.end()],
            DEFAULT_TEMPO,
            &source[open.end()..]
        ),
        None => source.to_string(),
    }
}

/// Add an empty `\midi { }` after the `\layout` block if there is no `\midi`.
pub fn ensure_midi_block(source: &str) -> String {
    if source.contains("\\midi") {
        return source.to_string();
    }
    match layout_re().find(source) {
        Some(layout) => {
            let line_start = source[..layout.start()].rfind('\n').map_or(0, |i| i + 1);
            let indent: String = source[line_start..layout.start()]
                .chars()
                .take_while(|c| c.is_whitespace())
                .collect();
            format!(
                "{}\n{}\\midi {{ }}{}",
                &source[..layout.end()],
                indent,
                &source[layout.end()..]
            )
        }
        None => source.to_string(),
    }
}

/// Escape `\` and `"` for a LilyPond string literal.
pub fn escape_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RAW: &str = r#"\version "2.24.0"

\score {
  <<
    \new Staff = "Piano_RH" {
      \clef "treble"
      c'4 e'4 g'4 c''4 |
    }
    \new Staff = "part2" {
      \clef ""
      c,1 |
    }
    \new Staff = "part3" {
      \clef ""
      c1 |
    }
  >>
  \layout { }
}
"#;

    #[test]
    fn full_pass_in_order() {
        let expected = r#"\version "2.24.0"

\header {
  title = "Ascension"
  composer = "Unknown"
}

\score {
  <<
    \new Staff = "upper" {
      \clef "treble"
      \tempo 4 = 120
      c'4 e'4 g'4 c''4 |
    }
    \new Staff = "lower" {
      \clef "bass"
      c,1 |
    }
    \new Staff = "part3" {
      \clef "bass"
      c1 |
    }
  >>
  \layout { }
  \midi { }
}
"#;
        assert_eq!(enhance(RAW, "Ascension", "Unknown"), expected);
    }

    #[test]
    fn only_first_two_staves_renamed() {
        let renamed = rename_staves(RAW);
        assert!(renamed.contains(r#"\new Staff = "upper""#));
        assert!(renamed.contains(r#"\new Staff = "lower""#));
        assert!(renamed.contains(r#"\new Staff = "part3""#));

        let single = rename_staves(r#"\new Staff = "solo" { c'1 }"#);
        assert_eq!(single, r#"\new Staff = "upper" { c'1 }"#);
    }

    #[test]
    fn existing_header_fields_overwritten() {
        let source = "\\header {\n  subtitle = \"Op. 1\"\n  title = \"Old\"\n}\n{ c'1 }";
        let expected =
            "\\header {\n  subtitle = \"Op. 1\"\n  title = \"New\"\n  composer = \"Me\"\n}\n{ c'1 }";
        assert_eq!(set_header(source, "New", "Me"), expected);
    }

    #[test]
    fn header_at_top_without_version() {
        let out = set_header("{ c'1 }", "T", "C");
        assert_eq!(out, "\\header {\n  title = \"T\"\n  composer = \"C\"\n}\n\n{ c'1 }");
    }

    #[test]
    fn header_values_are_escaped() {
        let out = set_header("{ c'1 }", r#"Say "hi""#, r"A\B");
        assert!(out.contains(r#"title = "Say \"hi\"""#));
        assert!(out.contains(r#"composer = "A\\B""#));
    }

    #[test]
    fn dollar_signs_are_literal() {
        let out = set_header(r#"\header { title = "x" }"#, "$1 Song", "C");
        assert!(out.contains(r#"title = "$1 Song""#));
    }

    #[test]
    fn existing_tempo_left_alone() {
        let source = "\\new Staff { \\clef \"bass\"\n\\tempo 4 = 60 c1 }";
        assert_eq!(ensure_tempo(source), source);
    }

    #[test]
    fn tempo_after_staff_brace_without_clef() {
        let out = ensure_tempo(r#"\new Staff = "a" { c'1 }"#);
        assert_eq!(out, r#"\new Staff = "a" { \tempo 4 = 120 c'1 }"#);
    }

    #[test]
    fn midi_block_added_once() {
        let once = ensure_midi_block("\\score {\n  { c'1 }\n  \\layout { }\n}\n");
        assert_eq!(once, "\\score {\n  { c'1 }\n  \\layout { }\n  \\midi { }\n}\n");
        assert_eq!(ensure_midi_block(&once), once);
        assert_eq!(ensure_midi_block("{ c'1 }"), "{ c'1 }");
    }
}

//! End-to-end conversions against a shell script standing in for LilyPond.
//!
//! The script honours `--output=<dir>` like the real thing and reacts to
//! markers in the source: `FAIL` exits 1 with a diagnostic, `NOPDF` skips the
//! PDF, `SLEEP` stalls for two seconds, and a `\midi` block produces MIDI.

#![cfg(unix)]

use engrave::{ArtifactCache, ConversionResult, Converter, EngraveError};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tempfile::TempDir;

const FAKE_LILYPOND: &str = r#"#!/bin/sh
out=""
src=""
for arg in "$@"; do
  case "$arg" in
    --output=*) out="${arg#--output=}" ;;
    *) src="$arg" ;;
  esac
done
if grep -q FAIL "$src"; then
  echo "$src:1:1: error: syntax error, unexpected FAIL" >&2
  exit 1
fi
if grep -q SLEEP "$src"; then
  sleep 2
fi
if ! grep -q NOPDF "$src"; then
  { printf '%%PDF-1.4\n%% out=%s\n' "$out"; cat "$src"; } > "$out/score.pdf"
fi
if grep -q '\\midi' "$src"; then
  printf 'MThd' > "$out/score.midi"
fi
exit 0
"#;

/// Written once per test binary, before anything is spawned.
fn fake_lilypond() -> &'static Path {
    static SCRIPT: OnceLock<PathBuf> = OnceLock::new();
    SCRIPT.get_or_init(|| {
        let path = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("fake-lilypond.sh");
        std::fs::write(&path, FAKE_LILYPOND).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    })
}

fn converter(cache: &TempDir) -> Converter {
    Converter::new(ArtifactCache::at_path(cache.path().join("cache")))
}

/// The scratch directory the script reported on the PDF's second line.
fn scratch_dir_of(pdf: &[u8]) -> PathBuf {
    let text = String::from_utf8_lossy(pdf);
    let line = text.lines().nth(1).unwrap();
    PathBuf::from(line.trim_start_matches("% out="))
}

#[tokio::test]
async fn pdf_only_conversion() {
    let lilypond = fake_lilypond();
    let dir = TempDir::new().unwrap();
    let converter = converter(&dir);

    let out = converter
        .try_convert("{ c'4 d' e' f' }", "scale", lilypond)
        .await
        .unwrap();

    assert_eq!(out.pdf.filename, "scale.pdf");
    assert!(out.pdf.bytes.starts_with(b"%PDF"));
    assert!(out.midi.is_none());
    assert_eq!(
        converter.cache().read("scale.pdf").unwrap(),
        Some(out.pdf.bytes.clone())
    );
    assert_eq!(converter.cache().read("scale.midi").unwrap(), None);

    // Scratch space is gone once the call returns
    assert!(!scratch_dir_of(&out.pdf.bytes).exists());
}

#[tokio::test]
async fn midi_block_yields_midi() {
    let lilypond = fake_lilypond();
    let dir = TempDir::new().unwrap();
    let converter = converter(&dir);

    let source = "\\score { { c'1 } \\layout { } \\midi { } }";
    let out = converter.try_convert(source, "with_midi", lilypond).await.unwrap();

    let midi = out.midi.unwrap();
    assert_eq!(midi.filename, "with_midi.midi");
    assert_eq!(midi.bytes, b"MThd");
    assert_eq!(midi.cache_path, dir.path().join("cache/with_midi.midi"));
}

#[tokio::test]
async fn tool_failure_passes_stderr_through() {
    let lilypond = fake_lilypond();
    let dir = TempDir::new().unwrap();
    let converter = converter(&dir);

    match converter.convert("{ FAIL }", "broken", lilypond).await {
        ConversionResult::Failure { message } => {
            assert!(message.starts_with("LilyPond Error: "), "{}", message);
            assert!(message.contains("syntax error, unexpected FAIL"), "{}", message);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(converter.cache().read("broken.pdf").unwrap(), None);
}

#[tokio::test]
async fn missing_pdf_is_an_error() {
    let lilypond = fake_lilypond();
    let dir = TempDir::new().unwrap();
    let converter = converter(&dir);

    let result = converter.convert("{ NOPDF }", "nothing", lilypond).await;
    assert_eq!(
        result,
        ConversionResult::Failure {
            message: "LilyPond did not generate a PDF.".to_string()
        }
    );
}

#[tokio::test]
async fn slow_runs_time_out() {
    let lilypond = fake_lilypond();
    let dir = TempDir::new().unwrap();
    let converter = converter(&dir).with_timeout(Some(Duration::from_millis(300)));

    let err = converter
        .try_convert("{ SLEEP }", "slow", lilypond)
        .await
        .unwrap_err();
    assert!(matches!(err, EngraveError::Timeout(_)));
    assert_eq!(converter.cache().read("slow.pdf").unwrap(), None);
}

#[tokio::test]
async fn repeated_name_overwrites_previous_output() {
    let lilypond = fake_lilypond();
    let dir = TempDir::new().unwrap();
    let converter = converter(&dir);

    let first = converter
        .try_convert("{ e'1 } \\midi { } % first", "piece", lilypond)
        .await
        .unwrap();
    assert!(first.midi.is_some());

    let second = converter
        .try_convert("{ g'1 } % second", "piece", lilypond)
        .await
        .unwrap();

    let cached = converter.cache().read("piece.pdf").unwrap().unwrap();
    assert_eq!(cached, second.pdf.bytes);
    assert!(String::from_utf8_lossy(&cached).contains("second"));
    // The MIDI from the first run no longer matches the PDF
    assert_eq!(converter.cache().read("piece.midi").unwrap(), None);
}

#[tokio::test]
async fn concurrent_use_of_a_name_is_refused() {
    let lilypond = fake_lilypond();
    let dir = TempDir::new().unwrap();
    let converter = converter(&dir);

    let slow = {
        let converter = converter.clone();
        let lilypond = lilypond.to_path_buf();
        tokio::spawn(async move { converter.try_convert("{ SLEEP }", "shared", &lilypond).await })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;

    let err = converter
        .try_convert("{ c'1 }", "shared", lilypond)
        .await
        .unwrap_err();
    assert!(matches!(err, EngraveError::BaseNameBusy(ref name) if name == "shared"));

    // Other names are unaffected
    converter.try_convert("{ c'1 }", "other", lilypond).await.unwrap();

    let out = slow.await.unwrap().unwrap();
    assert_eq!(out.pdf.filename, "shared.pdf");

    // Free again once the first run finished
    converter.try_convert("{ c'1 }", "shared", lilypond).await.unwrap();
}

#[tokio::test]
async fn ascension_end_to_end() {
    let lilypond = fake_lilypond();
    let dir = TempDir::new().unwrap();
    let converter = converter(&dir);

    let source = r#"\version "2.24.0"
\header {
  title = "Ascension"
  composer = "Anon."
}
\score {
  \relative c' { c4 d e f | g1 }
  \layout { }
  \midi { }
}
"#;
    let name = engrave::suggest_base_name(source, "my_sheet_music");
    assert_eq!(name, "Ascension");

    let out = match converter.convert(source, &name, lilypond).await {
        ConversionResult::Success(out) => out,
        ConversionResult::Failure { message } => panic!("{}", message),
    };
    assert_eq!(out.pdf.cache_path, dir.path().join("cache/Ascension.pdf"));
    assert!(out.pdf.cache_path.is_file());
    assert_eq!(
        out.midi.map(|m| m.filename),
        Some("Ascension.midi".to_string())
    );
}

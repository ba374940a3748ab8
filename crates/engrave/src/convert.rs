//! The notation conversion service: LilyPond source in, PDF and MIDI out.
//!
//! Each call gets its own scratch directory holding `score.ly`; LilyPond is
//! run once with `--output=<scratch>` and whatever it produced is copied into
//! the [`ArtifactCache`] under the caller's base name before the scratch
//! directory is dropped.

use crate::cache::ArtifactCache;
use crate::error::{EngraveError, Result};
use crate::title::sanitize_filename;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Name of the source file written into the scratch directory.
pub const SOURCE_FILE_NAME: &str = "score.ly";
/// Engraved output LilyPond writes next to [`SOURCE_FILE_NAME`].
pub const PDF_FILE_NAME: &str = "score.pdf";
/// MIDI output, present only when the score has a `\midi` block.
pub const MIDI_FILE_NAME: &str = "score.midi";

/// One generated file, in memory and in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub cache_path: PathBuf,
}

/// Output of a successful conversion. The PDF is always there; MIDI only if produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionArtifacts {
    pub pdf: Artifact,
    pub midi: Option<Artifact>,
}

/// Request/response view of a conversion: exactly one variant is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionResult {
    Success(ConversionArtifacts),
    Failure { message: String },
}

impl ConversionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<Result<ConversionArtifacts>> for ConversionResult {
    fn from(result: Result<ConversionArtifacts>) -> Self {
        match result {
            Ok(artifacts) => Self::Success(artifacts),
            Err(e) => Self::Failure {
                message: e.to_string(),
            },
        }
    }
}

/// Runs LilyPond conversions and publishes their output to a cache.
///
/// Cheap to clone; clones share the cache and the set of in-flight names.
#[derive(Debug, Clone)]
pub struct Converter {
    cache: ArtifactCache,
    timeout: Option<Duration>,
    in_flight: Arc<DashMap<String, ()>>,
}

impl Converter {
    pub fn new(cache: ArtifactCache) -> Self {
        Self {
            cache,
            timeout: None,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Kill LilyPond and fail with [`EngraveError::Timeout`] after `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Convert and fold any error into [`ConversionResult::Failure`].
    pub async fn convert(
        &self,
        source_text: &str,
        output_base_name: &str,
        executable: &Path,
    ) -> ConversionResult {
        self.try_convert(source_text, output_base_name, executable)
            .await
            .into()
    }

    /// Convert `source_text` into `<output_base_name>.pdf` (and `.midi`).
    ///
    /// Repeating a base name overwrites the previous cache entries. Reusing a
    /// base name while another conversion with it is still running fails with
    /// [`EngraveError::BaseNameBusy`].
    #[tracing::instrument(skip(self, source_text), fields(source_len = source_text.len()))]
    pub async fn try_convert(
        &self,
        source_text: &str,
        output_base_name: &str,
        executable: &Path,
    ) -> Result<ConversionArtifacts> {
        let base = validate_base_name(output_base_name)?;
        let _claim = self.claim(&base)?;

        // Removed on drop, including every early return below
        let scratch = tempfile::Builder::new()
            .prefix("lilypress-")
            .tempdir()
            .map_err(|e| EngraveError::io("creating scratch directory", e))?;

        let source_path = scratch.path().join(SOURCE_FILE_NAME);
        tokio::fs::write(&source_path, source_text)
            .await
            .map_err(|e| EngraveError::io("writing LilyPond source", e))?;

        let output = self
            .run_engraver(executable, scratch.path(), &source_path)
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(status = ?output.status.code(), "LilyPond failed");
            return Err(EngraveError::ExternalTool {
                status: output.status.code(),
                stderr,
            });
        }

        let pdf_bytes = match tokio::fs::read(scratch.path().join(PDF_FILE_NAME)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EngraveError::MissingOutputArtifact)
            }
            Err(e) => return Err(EngraveError::io("reading PDF", e)),
        };

        let midi_bytes = match tokio::fs::read(scratch.path().join(MIDI_FILE_NAME)).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(EngraveError::io("reading MIDI", e)),
        };

        // Cache writes are blocking std::fs calls
        let cache = self.cache.clone();
        let ConversionArtifacts { pdf, midi } =
            tokio::task::spawn_blocking(move || publish(&cache, &base, pdf_bytes, midi_bytes))
                .await
                .map_err(|e| EngraveError::io("publishing artifacts", std::io::Error::other(e)))??;

        info!(
            pdf = %pdf.filename,
            pdf_bytes = pdf.bytes.len(),
            midi = midi.is_some(),
            "conversion finished"
        );

        Ok(ConversionArtifacts { pdf, midi })
    }

    async fn run_engraver(
        &self,
        executable: &Path,
        out_dir: &Path,
        source_path: &Path,
    ) -> Result<Output> {
        let mut output_flag = OsString::from("--output=");
        output_flag.push(out_dir);

        let mut command = Command::new(executable);
        command
            .arg(output_flag)
            .arg(source_path)
            .current_dir(out_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(executable = %executable.display(), "running LilyPond");

        let run = command.output();
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(output) => output,
                Err(_) => {
                    warn!(timeout_secs = limit.as_secs(), "LilyPond timed out, killed");
                    return Err(EngraveError::Timeout(limit));
                }
            },
            None => run.await,
        };

        let output = output.map_err(|e| match e.kind() {
            ErrorKind::NotFound => EngraveError::ExecutableNotFound,
            _ => EngraveError::io("running LilyPond", e),
        })?;

        debug!(
            status = ?output.status.code(),
            stdout = %String::from_utf8_lossy(&output.stdout),
            stderr = %String::from_utf8_lossy(&output.stderr),
            "LilyPond exited"
        );

        Ok(output)
    }

    fn claim(&self, base: &str) -> Result<InFlight> {
        match self.in_flight.entry(base.to_string()) {
            Entry::Occupied(_) => Err(EngraveError::BaseNameBusy(base.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlight {
                    names: Arc::clone(&self.in_flight),
                    name: base.to_string(),
                })
            }
        }
    }
}

/// Store a finished conversion under `base`, dropping any stale MIDI entry.
fn publish(
    cache: &ArtifactCache,
    base: &str,
    pdf_bytes: Vec<u8>,
    midi_bytes: Option<Vec<u8>>,
) -> Result<ConversionArtifacts> {
    let pdf_filename = format!("{}.pdf", base);
    let pdf = Artifact {
        cache_path: cache.store(&pdf_filename, &pdf_bytes)?,
        filename: pdf_filename,
        bytes: pdf_bytes,
    };

    let midi_filename = format!("{}.midi", base);
    let midi = match midi_bytes {
        Some(bytes) => Some(Artifact {
            cache_path: cache.store(&midi_filename, &bytes)?,
            filename: midi_filename,
            bytes,
        }),
        None => {
            // Never leave an older MIDI paired with the new PDF
            cache.remove(&midi_filename)?;
            None
        }
    };

    Ok(ConversionArtifacts { pdf, midi })
}

/// Holds a base name for the duration of one conversion.
struct InFlight {
    names: Arc<DashMap<String, ()>>,
    name: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.names.remove(&self.name);
    }
}

/// Sanitize a caller-chosen output name. Reserved and control characters
/// become `_`; empty names and `.`/`..` are rejected.
pub fn validate_base_name(name: &str) -> Result<String> {
    let sanitized: String = sanitize_filename(name.trim())
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();

    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return Err(EngraveError::InvalidBaseName(name.to_string()));
    }
    Ok(sanitized)
}

use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong while engraving or re-encoding.
///
/// All variants are recoverable at the request boundary. `Display` is the
/// message shown to the user.
#[derive(Debug, Error)]
pub enum EngraveError {
    #[error("LilyPond executable not found. Install it from https://lilypond.org/download.html")]
    ExecutableNotFound,

    /// LilyPond ran and exited non-zero. `stderr` is passed through verbatim.
    #[error("LilyPond Error: {stderr}")]
    ExternalTool { status: Option<i32>, stderr: String },

    #[error("LilyPond did not generate a PDF.")]
    MissingOutputArtifact,

    #[error("Could not read MIDI as a score: {0}")]
    MalformedScoreInput(String),

    #[error("Invalid output name {0:?}")]
    InvalidBaseName(String),

    #[error("A conversion named {0:?} is already in progress")]
    BaseNameBusy(String),

    #[error("LilyPond did not finish within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Error during conversion ({context}): {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl EngraveError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    /// Short machine-readable name, used in API responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExecutableNotFound => "executable_not_found",
            Self::ExternalTool { .. } => "external_tool_failure",
            Self::MissingOutputArtifact => "missing_output_artifact",
            Self::MalformedScoreInput(_) => "malformed_score_input",
            Self::InvalidBaseName(_) => "invalid_base_name",
            Self::BaseNameBusy(_) => "base_name_busy",
            Self::Timeout(_) => "timeout",
            Self::Io { .. } => "io_failure",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngraveError>;

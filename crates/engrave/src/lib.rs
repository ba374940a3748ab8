//! LilyPond engraving: locate the executable, convert source text to PDF and
//! MIDI, pull titles out of scores and turn MIDI files back into LilyPond.
//!
//! # Example
//!
//! ```no_run
//! use engrave::{locate, ArtifactCache, ConversionResult, Converter};
//!
//! # async fn run() {
//! let Some(lilypond) = locate() else {
//!     eprintln!("install LilyPond first");
//!     return;
//! };
//!
//! let converter = Converter::new(ArtifactCache::at_path("/tmp/lilypress_cache"));
//! let source = r#"\header { title = "Ascension" } { c'4 d' e' f' }"#;
//! let name = engrave::suggest_base_name(source, "my_sheet_music");
//!
//! match converter.convert(source, &name, lilypond.path()).await {
//!     ConversionResult::Success(out) => println!("{} bytes of PDF", out.pdf.bytes.len()),
//!     ConversionResult::Failure { message } => eprintln!("{}", message),
//! }
//! # }
//! ```

pub mod cache;
pub mod convert;
pub mod error;
pub mod locator;
pub mod reencode;
pub mod templates;
pub mod title;

pub use cache::ArtifactCache;
pub use convert::{
    validate_base_name, Artifact, ConversionArtifacts, ConversionResult, Converter,
};
pub use error::{EngraveError, Result};
pub use locator::{locate, locate_with, ExecutableLocation, LocationSource, Locator};
pub use reencode::midi_to_notation;
pub use templates::Template;
pub use title::{extract_title, sanitize_filename, suggest_base_name};

/// Where to send people who do not have LilyPond installed.
pub const DOWNLOAD_URL: &str = "https://lilypond.org/download.html";

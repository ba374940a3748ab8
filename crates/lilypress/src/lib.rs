//! lilypress: engrave LilyPond scores over HTTP or from the command line.
//!
//! The heavy lifting lives in the `engrave` crate; this crate wires it to
//! configuration, logging, and the HTTP API.

pub mod telemetry;
pub mod web;

use engrave::{ArtifactCache, Converter, ExecutableLocation, Locator};
use pressconf::PressConfig;

/// Fallback output name when a score has no title.
pub const DEFAULT_BASE_NAME: &str = "my_sheet_music";

/// Converter writing to the configured cache with the configured timeout.
pub fn converter(config: &PressConfig) -> Converter {
    Converter::new(ArtifactCache::at_path(&config.paths.cache_dir))
        .with_timeout(config.engraver.timeout())
}

/// Locate LilyPond once per process, honouring `engraver.lilypond_path`.
pub fn lilypond(config: &PressConfig) -> Option<ExecutableLocation> {
    let locator = Locator::new().with_configured(config.engraver.lilypond_path.clone());
    engrave::locate_with(&locator).cloned()
}

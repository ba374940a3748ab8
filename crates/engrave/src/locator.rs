//! Finding the LilyPond executable.
//!
//! Lookup order: an explicitly configured path, then the bare program name
//! on `PATH` (probed with `--version`), then a short per-platform list of
//! conventional install locations. Not finding LilyPond is a normal outcome;
//! callers disable conversion and point the user at the download page.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Program name looked up on `PATH`.
pub const PROGRAM_NAME: &str = "lilypond";

/// Where a LilyPond executable came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    /// Set in config or on the command line.
    Configured,
    /// Bare program name resolved through `PATH`.
    SearchPath,
    /// One of the platform's conventional install paths.
    Conventional,
}

/// A usable LilyPond executable: an absolute path or a bare command name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutableLocation {
    pub program: PathBuf,
    pub source: LocationSource,
}

impl ExecutableLocation {
    pub fn path(&self) -> &Path {
        &self.program
    }
}

/// Uncached LilyPond lookup. See [`locate`] for the memoized entry point.
#[derive(Debug, Clone)]
pub struct Locator {
    program: String,
    configured: Option<PathBuf>,
    candidates: Vec<PathBuf>,
}

impl Default for Locator {
    fn default() -> Self {
        Self::new()
    }
}

impl Locator {
    /// Locator for `lilypond` with this platform's conventional paths.
    pub fn new() -> Self {
        Self {
            program: PROGRAM_NAME.to_string(),
            configured: None,
            candidates: platform_candidates(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_configured(mut self, path: Option<PathBuf>) -> Self {
        self.configured = path;
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Run the lookup. Spawns at most one `--version` probe.
    pub fn resolve(&self) -> Option<ExecutableLocation> {
        if let Some(path) = &self.configured {
            if is_executable(path) {
                info!("Using configured LilyPond at {}", path.display());
                return Some(ExecutableLocation {
                    program: path.clone(),
                    source: LocationSource::Configured,
                });
            }
            warn!(
                "Configured LilyPond path {} is not an executable file, searching instead",
                path.display()
            );
        }

        if self.probe_search_path() {
            info!("Found {} on PATH", self.program);
            return Some(ExecutableLocation {
                program: PathBuf::from(&self.program),
                source: LocationSource::SearchPath,
            });
        }

        let found = self.candidates.iter().find(|path| is_executable(path)).cloned();
        match &found {
            Some(path) => info!("Found LilyPond at {}", path.display()),
            None => warn!(
                "LilyPond not found on PATH or in {} conventional locations",
                self.candidates.len()
            ),
        }

        found.map(|program| ExecutableLocation {
            program,
            source: LocationSource::Conventional,
        })
    }

    fn probe_search_path(&self) -> bool {
        match Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) => {
                debug!("{} --version exited with {}", self.program, status);
                status.success()
            }
            Err(e) => {
                debug!("{} is not runnable from PATH: {}", self.program, e);
                false
            }
        }
    }
}

static LOCATION: OnceLock<Option<ExecutableLocation>> = OnceLock::new();

/// Memoized lookup with the default [`Locator`].
pub fn locate() -> Option<&'static ExecutableLocation> {
    locate_with(&Locator::new())
}

/// Memoized lookup. The first call in the process runs `locator`; every
/// later call returns that result regardless of the locator passed.
pub fn locate_with(locator: &Locator) -> Option<&'static ExecutableLocation> {
    LOCATION.get_or_init(|| locator.resolve()).as_ref()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(windows)]
fn platform_candidates() -> Vec<PathBuf> {
    let program_files =
        std::env::var("PROGRAMFILES").unwrap_or_else(|_| r"C:\Program Files".to_string());
    let program_files_x86 = std::env::var("PROGRAMFILES(X86)")
        .unwrap_or_else(|_| r"C:\Program Files (x86)".to_string());

    [program_files, program_files_x86]
        .iter()
        .flat_map(|base| {
            let base = PathBuf::from(base).join("LilyPond");
            [
                base.join("usr").join("bin").join("lilypond.exe"),
                base.join("bin").join("lilypond.exe"),
            ]
        })
        .collect()
}

#[cfg(target_os = "macos")]
fn platform_candidates() -> Vec<PathBuf> {
    const APP_BINARY: &str = "Applications/LilyPond.app/Contents/Resources/bin/lilypond";

    let mut candidates = vec![PathBuf::from("/").join(APP_BINARY)];
    if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
        candidates.push(home.join(APP_BINARY));
    }
    candidates.push(PathBuf::from("/opt/homebrew/bin/lilypond"));
    candidates.push(PathBuf::from("/usr/local/bin/lilypond"));
    candidates
}

#[cfg(not(any(windows, target_os = "macos")))]
fn platform_candidates() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/bin/lilypond"),
        PathBuf::from("/usr/local/bin/lilypond"),
    ]
}

//! CLI command implementations

use anyhow::{bail, Context, Result};
use engrave::{templates, DOWNLOAD_URL};
use lilypress::web::{self, WebState};
use lilypress::DEFAULT_BASE_NAME;
use pressconf::{ConfigSources, PressConfig};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::info;

/// Read a source file, with `-` meaning stdin.
async fn read_source(input: &Path) -> Result<String> {
    if input.as_os_str() == "-" {
        let mut source = String::new();
        tokio::io::stdin()
            .read_to_string(&mut source)
            .await
            .context("Failed to read LilyPond source from stdin")?;
        return Ok(source);
    }
    tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))
}

fn not_found_help() -> String {
    format!(
        "LilyPond executable not found.\n\n\
         Install it from {}\n\
         or point lilypress at it with LILYPRESS_LILYPOND=/path/to/lilypond\n\
         or `lilypond_path` under [engraver] in lilypress.toml.",
        DOWNLOAD_URL
    )
}

/// Run the HTTP API until SIGINT/SIGTERM
pub async fn serve(config: &PressConfig, port: Option<u16>, host: Option<String>) -> Result<()> {
    let lilypond = lilypress::lilypond(config);
    match &lilypond {
        Some(location) => info!("Using LilyPond at {}", location.path().display()),
        None => tracing::warn!("LilyPond not found, /convert will answer 503. {}", DOWNLOAD_URL),
    }

    let state = WebState::new(lilypress::converter(config), lilypond);
    let app = web::router(state);

    let addr = format!(
        "{}:{}",
        host.as_deref().unwrap_or(&config.bind.host),
        port.unwrap_or(config.bind.http_port)
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("🎼 lilypress ready!");
    info!("   Convert: POST http://{}/convert", addr);
    info!("   Health: GET http://{}/health", addr);
    info!("   Cache: {}", config.paths.cache_dir.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// Engrave a file into `out_dir`
pub async fn convert(
    config: &PressConfig,
    input: &Path,
    output: Option<&str>,
    out_dir: &Path,
) -> Result<()> {
    let source = read_source(input).await?;

    let Some(lilypond) = lilypress::lilypond(config) else {
        bail!("{}", not_found_help());
    };

    let fallback = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| *stem != "-")
        .unwrap_or(DEFAULT_BASE_NAME);
    let base = match output {
        Some(name) => name.to_string(),
        None => engrave::suggest_base_name(&source, fallback),
    };

    let artifacts = lilypress::converter(config)
        .try_convert(&source, &base, lilypond.path())
        .await?;

    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    for artifact in std::iter::once(&artifacts.pdf).chain(artifacts.midi.as_ref()) {
        let target = out_dir.join(&artifact.filename);
        tokio::fs::write(&target, &artifact.bytes)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))?;
        println!("{} ({} bytes)", target.display(), artifact.bytes.len());
    }

    Ok(())
}

/// Print the extracted title
pub async fn title(input: &Path) -> Result<()> {
    let source = read_source(input).await?;
    match engrave::extract_title(&source) {
        Some(title) => {
            println!("{}", title);
            Ok(())
        }
        None => bail!("No title found in {}", input.display()),
    }
}

/// Re-encode a MIDI file, printing or writing the LilyPond source
pub async fn from_midi(
    input: &Path,
    title: Option<&str>,
    composer: &str,
    enhance: bool,
    output: Option<&Path>,
) -> Result<()> {
    let midi = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string());
    let title = title.map(str::to_string).unwrap_or(stem);

    let source = engrave::midi_to_notation(&midi, &title, composer, enhance)
        .with_context(|| format!("Failed to re-encode {}", input.display()))?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &source)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => print!("{}", source),
    }
    Ok(())
}

/// Report where LilyPond was found
pub fn locate(config: &PressConfig) -> Result<()> {
    match lilypress::lilypond(config) {
        Some(location) => {
            let source = serde_json::to_value(location.source)?;
            println!(
                "{} ({})",
                location.path().display(),
                source.as_str().unwrap_or("unknown")
            );
            Ok(())
        }
        None => bail!("{}", not_found_help()),
    }
}

/// List template names, or print one template
pub fn templates(name: Option<&str>) -> Result<()> {
    match name {
        None => {
            for name in templates::names() {
                println!("{}", name);
            }
            Ok(())
        }
        Some(name) => match templates::get(name) {
            Some(source) => {
                print!("{}", source);
                Ok(())
            }
            None => bail!(
                "Unknown template '{}'. Available: {}",
                name,
                templates::names().join(", ")
            ),
        },
    }
}

/// Print the merged configuration and its sources
pub fn show_config(config: &PressConfig, sources: &ConfigSources) {
    print!("{}", config.to_toml());

    println!();
    if sources.files.is_empty() {
        println!("# No config files found; using defaults");
    } else {
        for file in &sources.files {
            println!("# Loaded from: {}", file.display());
        }
    }
    for var in &sources.env_overrides {
        println!("# Overridden by: {}", var);
    }
}

use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::cmp::Ordering;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{LookupOutcome, MediaEntry, MediaLookup};
use crate::audio::track::{StreamLocator, TrackDescriptor};
use crate::config::LookupOptions;
use crate::error::LookupError;

/// Búsquedas de usuario simultáneas contra yt-dlp.
const SEARCH_CONCURRENCY: usize = 3;

/// Cliente de búsqueda basado en el ejecutable `yt-dlp`.
///
/// Sólo las búsquedas y resoluciones de URL pasan por el limitador; los
/// localizadores de stream se piden sin esperar, porque cada guild depende
/// del suyo para avanzar la cola.
pub struct YtDlpClient {
    search_limiter: Semaphore,
}

/// Documento JSON de `--dump-single-json`.
#[derive(Debug, Deserialize)]
struct YtDlpDocument {
    url: Option<String>,
    webpage_url: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    entries: Option<Vec<Option<YtDlpDocument>>>,
    formats: Option<Vec<YtDlpFormat>>,
    requested_formats: Option<Vec<YtDlpFormat>>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    format_id: Option<String>,
    url: Option<String>,
    acodec: Option<String>,
    abr: Option<f64>,
}

impl YtDlpClient {
    pub fn new() -> Self {
        Self {
            search_limiter: Semaphore::new(SEARCH_CONCURRENCY),
        }
    }

    /// Verifica que yt-dlp esté instalado y responda
    pub async fn version(options: &LookupOptions) -> anyhow::Result<String> {
        let output = Command::new(&options.executable)
            .arg("--version")
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!("{} no puede ejecutarse correctamente", options.executable);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn common_args(options: &LookupOptions) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--no-warnings".to_string(),
            "--no-check-certificate".to_string(),
            "--retries".to_string(),
            options.network_retries.to_string(),
            "--socket-timeout".to_string(),
            options.socket_timeout.as_secs().max(1).to_string(),
        ];

        if let Some(cookies) = &options.cookies_file {
            if cookies.exists() {
                args.push("--cookies".to_string());
                args.push(cookies.display().to_string());
            } else {
                warn!("🍪 No se encontraron cookies en: {}", cookies.display());
            }
        }

        args
    }

    async fn run_limited(&self, args: Vec<String>, options: &LookupOptions) -> Result<String, LookupError> {
        let _permit = self
            .search_limiter
            .acquire()
            .await
            .map_err(|e| LookupError::Process(e.to_string()))?;

        Self::run(args, options).await
    }

    async fn run(args: Vec<String>, options: &LookupOptions) -> Result<String, LookupError> {
        debug!("⚙️ {} {}", options.executable, args.join(" "));

        let mut command = Command::new(&options.executable);
        command.args(&args).kill_on_drop(true);

        let output = tokio::time::timeout(options.lookup_timeout, command.output())
            .await
            .map_err(|_| LookupError::Timeout(options.lookup_timeout))?
            .map_err(|e| LookupError::Process(format!("error al ejecutar yt-dlp: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        // Con --ignore-errors yt-dlp termina con error aunque haya salida útil
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stdout.trim().is_empty() {
                return Err(LookupError::Process(format!("yt-dlp error: {}", stderr.trim())));
            }
            warn!("⚠️ yt-dlp terminó con errores parciales: {}", stderr.trim());
        }

        Ok(stdout)
    }
}

impl Default for YtDlpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaLookup for YtDlpClient {
    async fn search(
        &self,
        text: &str,
        top_n: usize,
        options: &LookupOptions,
    ) -> Result<Vec<MediaEntry>, LookupError> {
        let mut args = Self::common_args(options);
        args.push("--flat-playlist".to_string());
        args.push(format!("ytsearch{}:{}", top_n, text));

        let stdout = self.run_limited(args, options).await?;
        let document = parse_document(&stdout)?;
        Ok(search_entries(document))
    }

    async fn resolve(&self, url: &str, options: &LookupOptions) -> Result<LookupOutcome, LookupError> {
        info!("📊 Obteniendo info de: {}", url);

        let mut args = Self::common_args(options);
        args.extend(
            ["--flat-playlist", "--ignore-errors", "--yes-playlist", url]
                .into_iter()
                .map(String::from),
        );

        let stdout = self.run_limited(args, options).await?;
        Ok(into_outcome(parse_document(&stdout)?))
    }

    async fn get_stream_locator(
        &self,
        track: &TrackDescriptor,
        options: &LookupOptions,
    ) -> Result<StreamLocator, LookupError> {
        let mut args = Self::common_args(options);
        args.extend(
            ["--no-playlist", "-f", options.format.as_str(), track.source_locator()]
                .into_iter()
                .map(String::from),
        );

        let stdout = Self::run(args, options).await?;
        let document = parse_document(&stdout)?;

        select_stream_url(&document)
            .map(StreamLocator::new)
            .ok_or_else(|| LookupError::NoStream(track.source_locator().to_string()))
    }
}

fn parse_document(stdout: &str) -> Result<YtDlpDocument, LookupError> {
    serde_json::from_str(stdout.trim())
        .map_err(|e| LookupError::InvalidResponse(format!("JSON de yt-dlp inválido: {e}")))
}

fn search_entries(document: YtDlpDocument) -> Vec<MediaEntry> {
    document
        .entries
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .map(entry_from_flat)
        .collect()
}

fn into_outcome(document: YtDlpDocument) -> LookupOutcome {
    match document.entries {
        Some(entries) => LookupOutcome::Collection(
            entries
                .into_iter()
                .enumerate()
                .map(|(i, entry)| {
                    entry
                        .map(entry_from_flat)
                        .ok_or_else(|| LookupError::Unavailable(format!("elemento {}", i + 1)))
                })
                .collect(),
        ),
        // En un documento completo `url` es el stream elegido, no la página
        None => LookupOutcome::Single(MediaEntry {
            url: document.webpage_url.or(document.url),
            title: document.title,
            duration: document.duration,
        }),
    }
}

fn entry_from_flat(entry: YtDlpDocument) -> MediaEntry {
    MediaEntry {
        url: entry.url.or(entry.webpage_url),
        title: entry.title,
        duration: entry.duration,
    }
}

/// URL del formato elegido por `-f`; si el documento no la trae, el audio
/// de `requested_formats` o, por último, el de mayor bitrate.
fn select_stream_url(document: &YtDlpDocument) -> Option<String> {
    if let Some(url) = &document.url {
        return Some(url.clone());
    }

    let requested = document
        .requested_formats
        .iter()
        .flatten()
        .find(|f| f.url.is_some() && f.acodec.as_deref() != Some("none"));
    if let Some(format) = requested {
        debug!(
            "🎯 Formato pedido: {}",
            format.format_id.as_deref().unwrap_or("unknown")
        );
        return format.url.clone();
    }

    let best = document
        .formats
        .iter()
        .flatten()
        .filter(|f| f.url.is_some() && f.acodec.as_deref() != Some("none"))
        .max_by(|a, b| {
            a.abr
                .unwrap_or(0.0)
                .partial_cmp(&b.abr.unwrap_or(0.0))
                .unwrap_or(Ordering::Equal)
        });

    if let Some(format) = best {
        debug!(
            "🎯 Formato seleccionado: {} - {:?} - {:?}kbps",
            format.format_id.as_deref().unwrap_or("unknown"),
            format.acodec,
            format.abr
        );
        return format.url.clone();
    }

    None
}

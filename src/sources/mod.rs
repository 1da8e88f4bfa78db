//! Resolución de consultas de usuario a descriptores de track.
//!
//! [`MediaResolver`] clasifica la consulta (URL o texto libre), delega en un
//! [`MediaLookup`] y convierte sus respuestas en [`TrackDescriptor`]s sin
//! iniciar reproducción. El localizador del stream se pide aparte, en el
//! momento de reproducir.

pub mod ytdlp;

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use crate::audio::track::{StreamLocator, TrackDescriptor};
use crate::config::LookupOptions;
use crate::error::{LookupError, ResolutionError};

pub use ytdlp::YtDlpClient;

static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:http|ftp)s?://(?:(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+(?:[A-Z]{2,6}\.?|[A-Z0-9-]{2,}\.?)|localhost|\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})(?::\d+)?(?:/?|[/?]\S+)$",
    )
    .expect("URL_REGEX es una expresión válida")
});

/// Entrada cruda devuelta por el servicio de búsqueda.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaEntry {
    pub url: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
}

impl MediaEntry {
    pub fn new(url: impl Into<String>, title: impl Into<String>, duration: f64) -> Self {
        Self {
            url: Some(url.into()),
            title: Some(title.into()),
            duration: Some(duration),
        }
    }

    fn into_descriptor(self) -> Option<TrackDescriptor> {
        let url = self.url.filter(|u| !u.trim().is_empty())?;
        Some(TrackDescriptor::from_partial(url, self.title, self.duration))
    }
}

/// Resultado de resolver una URL.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Single(MediaEntry),
    /// Playlist; cada elemento puede fallar por separado
    Collection(Vec<Result<MediaEntry, LookupError>>),
}

/// Servicio externo de búsqueda de medios
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaLookup: Send + Sync {
    /// Busca `top_n` candidatos para un texto libre
    async fn search(
        &self,
        text: &str,
        top_n: usize,
        options: &LookupOptions,
    ) -> Result<Vec<MediaEntry>, LookupError>;

    /// Obtiene el elemento o la playlist a la que apunta una URL
    async fn resolve(&self, url: &str, options: &LookupOptions) -> Result<LookupOutcome, LookupError>;

    /// Obtiene un localizador fresco para reproducir el track
    async fn get_stream_locator(
        &self,
        track: &TrackDescriptor,
        options: &LookupOptions,
    ) -> Result<StreamLocator, LookupError>;
}

/// Tipo de consulta escrita por el usuario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    Url(String),
    Search(String),
}

impl QueryKind {
    pub fn classify(query: &str) -> Self {
        let query = query.trim();
        if URL_REGEX.is_match(query) && url::Url::parse(query).is_ok() {
            QueryKind::Url(query.to_string())
        } else {
            QueryKind::Search(query.to_string())
        }
    }
}

/// Resultado de [`MediaResolver::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Candidatos de búsqueda; el llamador elige uno
    Candidates(Vec<TrackDescriptor>),
    /// Tracks listos para encolar, en orden
    Tracks(Vec<TrackDescriptor>),
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        match self {
            Resolution::Candidates(tracks) | Resolution::Tracks(tracks) => tracks.is_empty(),
        }
    }
}

pub struct MediaResolver {
    lookup: Arc<dyn MediaLookup>,
    options: LookupOptions,
}

impl MediaResolver {
    pub fn new(lookup: Arc<dyn MediaLookup>, options: LookupOptions) -> Self {
        Self { lookup, options }
    }

    /// Resuelve una consulta sin iniciar reproducción.
    ///
    /// "Sin resultados" devuelve una secuencia vacía; sólo un fallo del
    /// servicio produce [`ResolutionError`].
    pub async fn resolve(&self, query: &str) -> Result<Resolution, ResolutionError> {
        match QueryKind::classify(query) {
            QueryKind::Url(url) => self.resolve_url(&url).await.map(Resolution::Tracks),
            QueryKind::Search(text) => self.search(&text).await.map(Resolution::Candidates),
        }
    }

    /// Busca los mejores candidatos para un texto libre
    pub async fn search(&self, text: &str) -> Result<Vec<TrackDescriptor>, ResolutionError> {
        let top_n = self.options.search_results;
        info!("🔍 Buscando: {}", text);

        let entries = self
            .lookup
            .search(text, top_n, &self.options)
            .await
            .map_err(|source| ResolutionError {
                query: text.to_string(),
                source,
            })?;

        let candidates: Vec<_> = entries
            .into_iter()
            .filter_map(MediaEntry::into_descriptor)
            .take(top_n)
            .collect();

        debug!("🔍 {} candidatos para '{}'", candidates.len(), text);
        Ok(candidates)
    }

    /// Resuelve una URL a uno o varios tracks, omitiendo los que fallen
    pub async fn resolve_url(&self, url: &str) -> Result<Vec<TrackDescriptor>, ResolutionError> {
        let outcome = self
            .lookup
            .resolve(url, &self.options)
            .await
            .map_err(|source| ResolutionError {
                query: url.to_string(),
                source,
            })?;

        match outcome {
            LookupOutcome::Single(entry) => Ok(entry.into_descriptor().into_iter().collect()),
            LookupOutcome::Collection(items) => {
                let total = items.len();
                let mut tracks = Vec::with_capacity(total);

                for (position, item) in items.into_iter().enumerate() {
                    match item.map(MediaEntry::into_descriptor) {
                        Ok(Some(track)) => tracks.push(track),
                        Ok(None) => {
                            warn!("⏭️ Elemento {} de la playlist sin URL, omitido", position + 1)
                        }
                        Err(e) => warn!("⏭️ Elemento {} de la playlist omitido: {}", position + 1, e),
                    }
                }

                info!("📋 Playlist resuelta: {}/{} elementos", tracks.len(), total);
                Ok(tracks)
            }
        }
    }

    /// Pide al servicio un localizador nuevo; nunca se cachea.
    pub async fn stream_locator(&self, track: &TrackDescriptor) -> Result<StreamLocator, LookupError> {
        self.lookup.get_stream_locator(track, &self.options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn resolver(mock: MockMediaLookup) -> MediaResolver {
        MediaResolver::new(Arc::new(mock), LookupOptions::default())
    }

    #[test]
    fn classifies_urls_and_text() {
        assert_eq!(
            QueryKind::classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            QueryKind::Url("https://www.youtube.com/watch?v=dQw4w9WgXcQ".into())
        );
        assert_eq!(
            QueryKind::classify("  http://localhost:8080/track.mp3 "),
            QueryKind::Url("http://localhost:8080/track.mp3".into())
        );
        assert_eq!(
            QueryKind::classify("bad bunny titi me pregunto"),
            QueryKind::Search("bad bunny titi me pregunto".into())
        );
        assert_eq!(
            QueryKind::classify("youtube.com/watch?v=abc"),
            QueryKind::Search("youtube.com/watch?v=abc".into())
        );
    }

    #[tokio::test]
    async fn playlist_skips_individual_failures() {
        let mut mock = MockMediaLookup::new();
        mock.expect_resolve().returning(|_, _| {
            let items = (1..=10)
                .map(|i| {
                    if i == 4 {
                        Err(LookupError::Unavailable(format!("video {i}")))
                    } else {
                        Ok(MediaEntry::new(format!("https://youtu.be/{i}"), format!("Track {i}"), 60.0))
                    }
                })
                .collect();
            Ok(LookupOutcome::Collection(items))
        });

        let resolution = resolver(mock)
            .resolve("https://www.youtube.com/playlist?list=PL123")
            .await
            .unwrap();

        let Resolution::Tracks(tracks) = resolution else {
            panic!("una URL debe producir tracks");
        };
        let titles: Vec<_> = tracks.iter().map(|t| t.display_title().to_string()).collect();
        let expected: Vec<_> = [1, 2, 3, 5, 6, 7, 8, 9, 10]
            .iter()
            .map(|i| format!("Track {i}"))
            .collect();
        assert_eq!(titles, expected);
    }

    #[tokio::test]
    async fn playlist_entries_without_url_are_skipped() {
        let mut mock = MockMediaLookup::new();
        mock.expect_resolve().returning(|_, _| {
            Ok(LookupOutcome::Collection(vec![
                Ok(MediaEntry::default()),
                Ok(MediaEntry::new("https://youtu.be/ok", "Ok", 10.0)),
            ]))
        });

        let tracks = resolver(mock).resolve_url("https://youtube.com/playlist?list=x").await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].source_locator(), "https://youtu.be/ok");
    }

    #[tokio::test]
    async fn single_url_defaults_missing_metadata() {
        let mut mock = MockMediaLookup::new();
        mock.expect_resolve().returning(|url, _| {
            Ok(LookupOutcome::Single(MediaEntry {
                url: Some(url.to_string()),
                title: None,
                duration: None,
            }))
        });

        let tracks = resolver(mock).resolve_url("https://youtu.be/abc").await.unwrap();
        assert_eq!(
            tracks,
            vec![TrackDescriptor::new("https://youtu.be/abc", TrackDescriptor::UNKNOWN_TITLE, 0)]
        );
    }

    #[tokio::test]
    async fn search_returns_top_candidates() {
        let mut mock = MockMediaLookup::new();
        mock.expect_search()
            .withf(|text, top_n, _| text == "lofi" && *top_n == 5)
            .returning(|_, _, _| {
                Ok((1..=7)
                    .map(|i| MediaEntry::new(format!("https://youtu.be/{i}"), format!("Lofi {i}"), 120.0))
                    .collect())
            });

        let resolution = resolver(mock).resolve("lofi").await.unwrap();
        let Resolution::Candidates(candidates) = resolution else {
            panic!("el texto libre debe producir candidatos");
        };
        assert_eq!(candidates.len(), 5);
        assert_eq!(candidates[0].display_title(), "Lofi 1");
    }

    #[tokio::test]
    async fn no_results_is_not_an_error() {
        let mut mock = MockMediaLookup::new();
        mock.expect_search().returning(|_, _, _| Ok(Vec::new()));
        mock.expect_resolve()
            .returning(|_, _| Ok(LookupOutcome::Collection(Vec::new())));

        let resolver = resolver(mock);
        assert!(resolver.resolve("nada").await.unwrap().is_empty());
        assert!(resolver
            .resolve("https://youtube.com/playlist?list=empty")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn service_failure_is_a_resolution_error() {
        let mut mock = MockMediaLookup::new();
        mock.expect_search()
            .returning(|_, _, _| Err(LookupError::Process("red caída".into())));

        let err = resolver(mock).resolve("algo").await.unwrap_err();
        assert_eq!(err.query, "algo");
        assert_eq!(err.source, LookupError::Process("red caída".into()));
    }

    #[tokio::test]
    async fn stream_locator_is_requested_every_time() {
        let mut mock = MockMediaLookup::new();
        mock.expect_get_stream_locator()
            .times(2)
            .returning(|track, _| Ok(StreamLocator::new(format!("{}?sig=fresh", track.source_locator()))));

        let resolver = resolver(mock);
        let track = TrackDescriptor::new("https://youtu.be/a", "A", 30);
        let first = resolver.stream_locator(&track).await.unwrap();
        let second = resolver.stream_locator(&track).await.unwrap();
        assert_eq!(first, second);
    }
}

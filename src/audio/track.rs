use std::fmt;

/// Metadatos resueltos de un elemento reproducible.
///
/// No contiene el stream: el localizador se obtiene justo antes de
/// reproducir, porque suele ser una URL firmada de vida corta.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackDescriptor {
    source_locator: String,
    display_title: String,
    duration_seconds: u64,
}

impl TrackDescriptor {
    /// Título usado cuando el servicio no devuelve uno.
    pub const UNKNOWN_TITLE: &'static str = "No disponible";

    pub fn new(
        source_locator: impl Into<String>,
        display_title: impl Into<String>,
        duration_seconds: u64,
    ) -> Self {
        Self {
            source_locator: source_locator.into(),
            display_title: display_title.into(),
            duration_seconds,
        }
    }

    /// Construye un descriptor tolerando metadatos ausentes.
    pub fn from_partial(
        source_locator: impl Into<String>,
        display_title: Option<String>,
        duration_seconds: Option<f64>,
    ) -> Self {
        let title = display_title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| Self::UNKNOWN_TITLE.to_string());

        let duration = duration_seconds
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d as u64)
            .unwrap_or(0);

        Self::new(source_locator, title, duration)
    }

    pub fn source_locator(&self) -> &str {
        &self.source_locator
    }

    pub fn display_title(&self) -> &str {
        &self.display_title
    }

    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }
}

impl fmt::Display for TrackDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_title)
    }
}

/// Dirección efímera desde la que el transporte puede leer audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLocator {
    pub url: String,
}

impl StreamLocator {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_metadata_falls_back_to_sentinels() {
        let track = TrackDescriptor::from_partial("https://youtu.be/abc", None, None);
        assert_eq!(track.display_title(), TrackDescriptor::UNKNOWN_TITLE);
        assert_eq!(track.duration_seconds(), 0);

        let blank = TrackDescriptor::from_partial("https://youtu.be/abc", Some("  ".into()), Some(f64::NAN));
        assert_eq!(blank.display_title(), TrackDescriptor::UNKNOWN_TITLE);
        assert_eq!(blank.duration_seconds(), 0);
    }

    #[test]
    fn fractional_durations_are_truncated() {
        let track = TrackDescriptor::from_partial("u", Some("Canción".into()), Some(212.9));
        assert_eq!(track.duration_seconds(), 212);
        assert_eq!(track.to_string(), "Canción");
    }
}

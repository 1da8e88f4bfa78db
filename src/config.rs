use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::queue::DEFAULT_CAPACITY;
use crate::audio::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Cola y reproducción
    pub max_queue_size: usize,
    pub start_attempts: u32,
    pub retry_base_delay: Duration,
    pub start_timeout: Duration,

    // Audio
    pub opus_bitrate_kbps: u32,
    pub default_volume: f32,

    // yt-dlp
    pub ytdlp_path: String,
    pub ytdlp_format: String,
    pub ytdlp_cookies: Option<PathBuf>,
    pub search_results: usize,
    pub network_retries: u32,
    pub socket_timeout: Duration,
    pub lookup_timeout: Duration,

    // Interacción
    pub selection_timeout: Duration,

    // Paths
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")
                .context("DISCORD_TOKEN no definido")?
                .trim()
                .to_string(),
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Cola y reproducción
            max_queue_size: env_or("MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            start_attempts: env_or("START_ATTEMPTS", defaults.start_attempts)?,
            retry_base_delay: env_duration_or("RETRY_BASE_DELAY", defaults.retry_base_delay)?,
            start_timeout: env_duration_or("START_TIMEOUT", defaults.start_timeout)?,

            // Audio
            opus_bitrate_kbps: env_or("OPUS_BITRATE", defaults.opus_bitrate_kbps)?,
            default_volume: env_or("DEFAULT_VOLUME", defaults.default_volume)?,

            // yt-dlp
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ytdlp_format: std::env::var("YTDLP_FORMAT").unwrap_or(defaults.ytdlp_format),
            ytdlp_cookies: std::env::var("YTDLP_COOKIES")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            search_results: env_or("SEARCH_RESULTS", defaults.search_results)?,
            network_retries: env_or("NETWORK_RETRIES", defaults.network_retries)?,
            socket_timeout: env_duration_or("SOCKET_TIMEOUT", defaults.socket_timeout)?,
            lookup_timeout: env_duration_or("LOOKUP_TIMEOUT", defaults.lookup_timeout)?,

            selection_timeout: env_duration_or("SELECTION_TIMEOUT", defaults.selection_timeout)?,

            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
        };

        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("No se pudo crear {}", config.data_dir.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Token must not be empty
    /// - Opus bitrate must be between 32 and 320 kbps
    /// - Volume must be between 0.0 and 2.0
    /// - Queue size, attempts and search results must be > 0
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.is_empty() {
            anyhow::bail!("Token de Discord no encontrado");
        }

        if !(32..=320).contains(&self.opus_bitrate_kbps) {
            anyhow::bail!(
                "Bitrate inválido: {} (debe estar entre 32 y 320 kbps)",
                self.opus_bitrate_kbps
            );
        }

        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "El volumen debe estar entre 0.0 y 2.0, recibido: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("El tamaño máximo de la cola debe ser mayor que 0");
        }

        if self.start_attempts == 0 {
            anyhow::bail!("START_ATTEMPTS debe ser al menos 1");
        }

        if self.search_results == 0 || self.search_results > 25 {
            anyhow::bail!(
                "SEARCH_RESULTS debe estar entre 1 y 25, recibido: {}",
                self.search_results
            );
        }

        if self.start_timeout.is_zero() || self.lookup_timeout.is_zero() {
            anyhow::bail!("Los timeouts deben ser mayores que 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging,
    /// without the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: guild {}\n  \
            Queue: {} max, {} intentos (base {}), timeout {}\n  \
            Audio: {}kbps, {}% vol\n  \
            yt-dlp: {} ({}), top {}, {} reintentos de red",
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.max_queue_size,
            self.start_attempts,
            humantime::format_duration(self.retry_base_delay),
            humantime::format_duration(self.start_timeout),
            self.opus_bitrate_kbps,
            (self.default_volume * 100.0) as u32,
            self.ytdlp_path,
            self.ytdlp_format,
            self.search_results,
            self.network_retries,
        )
    }

    pub fn lookup_options(&self) -> LookupOptions {
        LookupOptions {
            executable: self.ytdlp_path.clone(),
            format: self.ytdlp_format.clone(),
            cookies_file: self.ytdlp_cookies.clone(),
            search_results: self.search_results,
            network_retries: self.network_retries,
            socket_timeout: self.socket_timeout,
            lookup_timeout: self.lookup_timeout,
        }
    }

    pub fn playback_options(&self) -> PlaybackOptions {
        PlaybackOptions {
            queue_capacity: self.max_queue_size,
            retry: RetryPolicy::new(self.start_attempts, self.retry_base_delay),
            start_timeout: self.start_timeout,
            format: self.format_options(),
        }
    }

    pub fn format_options(&self) -> FormatOptions {
        FormatOptions {
            bitrate_kbps: self.opus_bitrate_kbps,
            volume: self.default_volume,
        }
    }

    pub fn playlists_path(&self) -> PathBuf {
        self.data_dir.join("playlists.json")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            guild_id: None,

            max_queue_size: DEFAULT_CAPACITY,
            start_attempts: 3,
            retry_base_delay: Duration::from_secs(2),
            start_timeout: Duration::from_secs(30),

            opus_bitrate_kbps: 128,
            default_volume: 0.5,

            ytdlp_path: "yt-dlp".to_string(),
            ytdlp_format: "bestaudio/best".to_string(),
            ytdlp_cookies: None,
            search_results: 5,
            network_retries: 3,
            socket_timeout: Duration::from_secs(10),
            lookup_timeout: Duration::from_secs(60),

            selection_timeout: Duration::from_secs(30),

            data_dir: "./data".into(),
        }
    }
}

/// Opciones tipadas del servicio de búsqueda de medios.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupOptions {
    pub executable: String,
    /// Preferencia de formato (`-f` de yt-dlp)
    pub format: String,
    pub cookies_file: Option<PathBuf>,
    pub search_results: usize,
    pub network_retries: u32,
    pub socket_timeout: Duration,
    /// Límite de reloj para una consulta completa
    pub lookup_timeout: Duration,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Config::default().lookup_options()
    }
}

/// Parámetros del controlador de reproducción de cada guild.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackOptions {
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
    pub start_timeout: Duration,
    pub format: FormatOptions,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Config::default().playback_options()
    }
}

/// Formato de salida pedido al transporte.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormatOptions {
    pub bitrate_kbps: u32,
    pub volume: f32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Config::default().format_options()
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .with_context(|| format!("Valor inválido para {}: {}", key, val)),
        _ => Ok(default),
    }
}

fn env_duration_or(key: &str, default: Duration) -> Result<Duration> {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => humantime::parse_duration(val.trim())
            .with_context(|| format!("Duración inválida para {}: {}", key, val)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            discord_token: "token".into(),
            ..Config::default()
        }
    }

    #[test]
    fn defaults_are_valid_once_token_is_set() {
        assert!(Config::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_audio() {
        let config = Config {
            opus_bitrate_kbps: 16,
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = Config {
            default_volume: 3.0,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn builds_typed_options() {
        let config = Config {
            start_attempts: 4,
            retry_base_delay: Duration::from_millis(250),
            ..valid()
        };

        let playback = config.playback_options();
        assert_eq!(playback.retry.max_attempts, 4);
        assert_eq!(playback.retry.base_delay, Duration::from_millis(250));
        assert_eq!(playback.queue_capacity, DEFAULT_CAPACITY);
        assert_eq!(playback.format.bitrate_kbps, 128);

        let lookup = config.lookup_options();
        assert_eq!(lookup.search_results, 5);
        assert_eq!(lookup.format, "bestaudio/best");
    }

    #[test]
    fn summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".into(),
            ..Config::default()
        };
        assert!(!config.summary().contains("super-secret"));
    }
}

//! # Audio Module
//!
//! Núcleo de reproducción por guild, independiente de Discord.
//!
//! ## Architecture
//!
//! ### [`registry`] - Guild Registry
//! - Un [`PlaybackController`](controller::PlaybackController) por guild,
//!   creado bajo demanda
//!
//! ### [`controller`] - Playback Controller
//! - Máquina de estados `Idle → Resolving → Playing ⇄ Paused`
//! - Avance de cola serializado, reintentos con backoff y cancelación
//!
//! ### [`queue`] - Queue Management
//! - Cola FIFO acotada con edición por posición (base 1) y mezcla
//!
//! ### [`transport`] - Colaboradores externos
//! - [`AudioTransport`](transport::AudioTransport) convierte un localizador
//!   en sonido; [`MessagingSink`](transport::MessagingSink) publica avisos
//!
//! Las implementaciones concretas (songbird, canales de Discord) viven en
//! [`crate::bot`].

pub mod controller;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod state;
pub mod track;
pub mod transport;

pub use controller::{EnqueueOutcome, PlaybackController, SkipOutcome};
pub use registry::GuildRegistry;
pub use state::{PlaybackState, PlayerSnapshot, PlayerStatus};
pub use track::{StreamLocator, TrackDescriptor};

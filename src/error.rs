//! Taxonomía de errores del núcleo de reproducción.
//!
//! Los errores del servicio de búsqueda y del transporte se reintentan dentro
//! del controlador y nunca llegan al usuario como fallo; los de cola y de
//! control ([`QueueError`], [`PlaybackError`]) se devuelven directamente al
//! comando que los provocó.

use std::time::Duration;
use thiserror::Error;

/// Fallo del servicio externo de búsqueda de medios.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LookupError {
    #[error("no se pudo ejecutar la búsqueda: {0}")]
    Process(String),

    #[error("la búsqueda superó el tiempo límite de {0:?}")]
    Timeout(Duration),

    #[error("respuesta inválida del servicio: {0}")]
    InvalidResponse(String),

    #[error("elemento no disponible: {0}")]
    Unavailable(String),

    #[error("no hay stream de audio para {0}")]
    NoStream(String),
}

/// Fallo duro al resolver una consulta (distinto de "sin resultados").
#[derive(Debug, Clone, Error, PartialEq)]
#[error("no se pudo resolver '{query}': {source}")]
pub struct ResolutionError {
    pub query: String,
    #[source]
    pub source: LookupError,
}

/// Fallo reportado por la implementación del transporte de audio.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("el transporte no está conectado a un canal de voz")]
    NotConnected,

    #[error("no se pudo iniciar el stream: {0}")]
    Start(String),

    #[error("error de control del stream: {0}")]
    Control(String),
}

/// Fallo al arrancar un track; siempre reintentable.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StreamStartError {
    #[error("no se obtuvo el localizador del stream: {0}")]
    Locator(#[from] LookupError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("el transporte no arrancó en {0:?}")]
    Timeout(Duration),
}

/// Fallo a mitad de reproducción, recibido por el callback de finalización.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("el stream falló durante la reproducción: {cause}")]
pub struct TransportRuntimeError {
    pub cause: String,
}

impl TransportRuntimeError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

/// Errores de operaciones sobre la cola, mostrados tal cual al usuario.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("la posición {index} no existe (la cola tiene {len} canciones)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("la cola está llena (máximo {capacity} canciones)")]
    CapacityExceeded { capacity: usize },

    #[error("se necesitan al menos 2 canciones para mezclar (hay {len})")]
    NotEnoughTracks { len: usize },
}

/// Errores de los comandos de control de reproducción.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaybackError {
    #[error("no hay nada reproduciéndose")]
    NothingPlaying,

    #[error("la reproducción ya está pausada")]
    AlreadyPaused,

    #[error("la reproducción no está pausada")]
    NotPaused,

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

//! Contratos con los colaboradores externos del controlador: el transporte
//! de audio que convierte un localizador en sonido dentro de un canal de voz
//! y el canal de mensajes donde se avisa al usuario.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::controller::ControllerEvent;
use super::track::StreamLocator;
use crate::config::FormatOptions;
use crate::error::{TransportError, TransportRuntimeError};

/// Identificador de una sesión de transporte, único dentro de una guild.
pub type SessionId = u64;

/// Todo lo necesario para arrancar un stream.
pub struct StartRequest {
    pub session: SessionId,
    pub locator: StreamLocator,
    pub format: FormatOptions,
    /// Se invoca una sola vez cuando la sesión termina después de arrancar
    pub completion: CompletionHook,
}

/// Sumidero de audio de una guild (p. ej. una llamada de voz).
#[async_trait]
pub trait AudioTransport: Send + Sync {
    /// Indica si hay un canal de voz conectado
    async fn is_connected(&self) -> bool;

    /// Arranca un stream. Devuelve la sesión una vez que el audio es
    /// reproducible; un fallo aquí no dispara el `CompletionHook`.
    async fn start(&self, request: StartRequest) -> Result<Arc<dyn TransportSession>, TransportError>;
}

/// Stream activo. Detenerlo provoca la notificación de finalización.
#[async_trait]
pub trait TransportSession: Send + Sync {
    fn id(&self) -> SessionId;

    async fn pause(&self) -> Result<(), TransportError>;

    async fn resume(&self) -> Result<(), TransportError>;

    async fn stop(&self) -> Result<(), TransportError>;
}

/// Canal por el que el transporte devuelve el fin de una sesión al
/// controlador dueño, sin ejecutar lógica del controlador en su contexto.
#[derive(Clone)]
pub struct CompletionHook {
    session: SessionId,
    events: mpsc::UnboundedSender<ControllerEvent>,
}

impl CompletionHook {
    pub(crate) fn new(session: SessionId, events: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        Self { session, events }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Fin natural del stream
    pub fn finished(&self) {
        self.post(Ok(()));
    }

    /// Fin por error a mitad de reproducción
    pub fn failed(&self, cause: impl Into<String>) {
        self.post(Err(TransportRuntimeError::new(cause)));
    }

    fn post(&self, outcome: Result<(), TransportRuntimeError>) {
        let event = ControllerEvent::SessionEnded {
            session: self.session,
            outcome,
        };
        if self.events.send(event).is_err() {
            debug!("Controlador cerrado, fin de sesión {} descartado", self.session);
        }
    }
}

impl std::fmt::Debug for CompletionHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHook")
            .field("session", &self.session)
            .finish()
    }
}

/// Canal de texto donde se publican los avisos de una guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotifyContext {
    pub channel_id: u64,
}

impl NotifyContext {
    pub fn new(channel_id: u64) -> Self {
        Self { channel_id }
    }
}

/// Mensajes de usuario "dispara y olvida"; sus fallos sólo se registran.
#[async_trait]
pub trait MessagingSink: Send + Sync {
    async fn notify(&self, context: NotifyContext, text: &str) -> anyhow::Result<()>;
}

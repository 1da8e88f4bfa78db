//! # Playback Controller
//!
//! Máquina de estados de reproducción de una guild.
//!
//! Cada controlador posee su [`TrackQueue`], su [`PlaybackState`] y, como
//! mucho, una sesión de transporte activa. Los avances de cola y los fines
//! de sesión se procesan en serie en una tarea propia (el "worker"), de modo
//! que nunca hay dos avances simultáneos en la misma guild y una resolución
//! lenta en una guild no retrasa a las demás.
//!
//! ## Transiciones
//!
//! ```text
//! Idle --advance--> Resolving --stream listo--> Playing <--> Paused
//!                      |  ^                        |
//!          fallo (retry)  |                        | fin / skip / error
//!                      v  |                        v
//!                   agotado ---> Idle ---------> advance
//! ```
//!
//! Los comandos de usuario (pausa, skip, stop) actúan directamente sobre el
//! estado compartido y no esperan al worker: un skip durante `Resolving`
//! sólo marca la preparación como cancelada y el worker descarta el stream
//! cuando termine de obtenerlo.

use chrono::Utc;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::queue::TrackQueue;
use super::state::{PlaybackState, PlayerSnapshot, PlayerStatus};
use super::track::TrackDescriptor;
use super::transport::{
    AudioTransport, CompletionHook, MessagingSink, NotifyContext, SessionId, StartRequest,
    TransportSession,
};
use crate::config::PlaybackOptions;
use crate::error::{PlaybackError, QueueError, StreamStartError, TransportRuntimeError};
use crate::sources::MediaResolver;

/// Eventos procesados en serie por el worker del controlador.
pub(crate) enum ControllerEvent {
    Advance,
    SessionEnded {
        session: SessionId,
        outcome: Result<(), TransportRuntimeError>,
    },
    Shutdown,
}

/// Resultado de encolar tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub added: usize,
    /// Descartados por falta de espacio
    pub dropped: usize,
    /// Posición (base 1) del primer track agregado
    pub first_position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    /// Se detuvo el stream activo; el fin de sesión avanzará la cola
    Stopped,
    /// Se canceló el track que se estaba preparando
    CancelledPreparation,
}

/// Manejador clonable del controlador de una guild.
#[derive(Clone)]
pub struct PlaybackController {
    shared: Arc<Shared>,
}

struct Shared {
    guild_id: GuildId,
    inner: Mutex<Inner>,
    events: mpsc::UnboundedSender<ControllerEvent>,
    resolver: Arc<MediaResolver>,
    sink: Arc<dyn MessagingSink>,
    options: PlaybackOptions,
}

struct Inner {
    status: PlayerStatus,
    queue: TrackQueue,
    state: PlaybackState,
    preparing: Option<TrackDescriptor>,
    session: Option<Arc<dyn TransportSession>>,
    transport: Option<Arc<dyn AudioTransport>>,
    context: Option<NotifyContext>,
    // Se incrementa con cada skip/stop para invalidar la preparación en curso
    epoch: u64,
    last_session: SessionId,
}

enum Prepared {
    Started(Arc<dyn TransportSession>),
    Cancelled,
    Exhausted(StreamStartError),
}

enum Attempt {
    Started(Arc<dyn TransportSession>),
    Cancelled,
}

impl PlaybackController {
    /// Crea el controlador y lanza su worker en el runtime actual.
    pub fn spawn(
        guild_id: GuildId,
        resolver: Arc<MediaResolver>,
        sink: Arc<dyn MessagingSink>,
        options: PlaybackOptions,
    ) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            guild_id,
            inner: Mutex::new(Inner {
                status: PlayerStatus::Idle,
                queue: TrackQueue::new(options.queue_capacity),
                state: PlaybackState::default(),
                preparing: None,
                session: None,
                transport: None,
                context: None,
                epoch: 0,
                last_session: 0,
            }),
            events,
            resolver,
            sink,
            options,
        });

        tokio::spawn(run_worker(shared.clone(), receiver));

        Self { shared }
    }

    /// Indica si dos manejadores apuntan al mismo controlador
    pub fn same_as(&self, other: &PlaybackController) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Conecta el transporte de voz de la guild
    pub fn attach_transport(&self, transport: Arc<dyn AudioTransport>) {
        self.shared.inner.lock().transport = Some(transport);
        debug!("🔊 Transporte conectado para guild {}", self.shared.guild_id);
    }

    pub fn has_transport(&self) -> bool {
        self.shared.inner.lock().transport.is_some()
    }

    /// Canal de texto donde se publican los avisos
    pub fn bind_context(&self, context: NotifyContext) {
        self.shared.inner.lock().context = Some(context);
    }

    pub fn status(&self) -> PlayerStatus {
        self.shared.inner.lock().status
    }

    /// Agrega tracks al final de la cola; no inicia la reproducción.
    pub fn enqueue(&self, tracks: Vec<TrackDescriptor>) -> Result<EnqueueOutcome, QueueError> {
        let offered = tracks.len();
        let mut inner = self.shared.inner.lock();
        let first_position = inner.queue.len() + 1;
        let added = inner.queue.extend(tracks);

        if added == 0 && offered > 0 {
            return Err(QueueError::CapacityExceeded {
                capacity: inner.queue.capacity(),
            });
        }

        Ok(EnqueueOutcome {
            added,
            dropped: offered - added,
            first_position,
        })
    }

    /// Pide un avance de cola. Devuelve si el controlador estaba inactivo;
    /// si no lo estaba, el worker ignora la petición.
    pub fn advance_if_idle(&self) -> bool {
        let idle = self.status() == PlayerStatus::Idle;
        self.shared.post(ControllerEvent::Advance);
        idle
    }

    /// Salta el track actual (o el que se está preparando)
    pub async fn skip(&self) -> Result<SkipOutcome, PlaybackError> {
        let session = {
            let mut inner = self.shared.inner.lock();
            match inner.status {
                PlayerStatus::Playing | PlayerStatus::Paused => inner.session.clone(),
                PlayerStatus::Resolving => {
                    inner.epoch += 1;
                    info!(
                        "⏭️ Skip durante la preparación en guild {}",
                        self.shared.guild_id
                    );
                    return Ok(SkipOutcome::CancelledPreparation);
                }
                PlayerStatus::Idle | PlayerStatus::Stopping => None,
            }
        };

        let Some(session) = session else {
            return Err(PlaybackError::NothingPlaying);
        };

        info!("⏭️ Saltando track en guild {}", self.shared.guild_id);
        if let Err(e) = session.stop().await {
            // Sin fin de sesión la cola quedaría detenida
            warn!("⚠️ El transporte no pudo detenerse: {}", e);
            self.shared.post(ControllerEvent::SessionEnded {
                session: session.id(),
                outcome: Err(TransportRuntimeError::new(e.to_string())),
            });
        }

        Ok(SkipOutcome::Stopped)
    }

    pub async fn pause(&self) -> Result<(), PlaybackError> {
        let session = {
            let inner = self.shared.inner.lock();
            match (inner.status, &inner.session) {
                (PlayerStatus::Playing, Some(session)) => session.clone(),
                (PlayerStatus::Paused, _) => return Err(PlaybackError::AlreadyPaused),
                _ => return Err(PlaybackError::NothingPlaying),
            }
        };

        session.pause().await?;

        let applied = {
            let mut inner = self.shared.inner.lock();
            let same = inner.session.as_ref().map(|s| s.id()) == Some(session.id());
            if same && inner.status == PlayerStatus::Playing {
                inner.status = PlayerStatus::Paused;
                inner.state.pause(Utc::now());
                true
            } else {
                false
            }
        };

        if applied {
            info!("⏸️ Reproducción pausada en guild {}", self.shared.guild_id);
            self.shared.notify("⏸️ Reproducción pausada").await;
        }
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), PlaybackError> {
        let session = {
            let inner = self.shared.inner.lock();
            match (inner.status, &inner.session) {
                (PlayerStatus::Paused, Some(session)) => session.clone(),
                (PlayerStatus::Playing, _) => return Err(PlaybackError::NotPaused),
                _ => return Err(PlaybackError::NothingPlaying),
            }
        };

        session.resume().await?;

        let applied = {
            let mut inner = self.shared.inner.lock();
            let same = inner.session.as_ref().map(|s| s.id()) == Some(session.id());
            if same && inner.status == PlayerStatus::Paused {
                inner.status = PlayerStatus::Playing;
                inner.state.resume(Utc::now());
                true
            } else {
                false
            }
        };

        if applied {
            info!("▶️ Reproducción reanudada en guild {}", self.shared.guild_id);
            self.shared.notify("▶️ Reproducción reanudada").await;
        }
        Ok(())
    }

    /// Detiene el audio y vacía la cola; devuelve cuántos tracks se quitaron.
    pub async fn stop_and_clear(&self) -> usize {
        let (session, cleared, was_audible) = {
            let mut inner = self.shared.inner.lock();
            inner.epoch += 1;
            let cleared = inner.queue.clear();
            let session = inner.session.take();
            let was_audible = session.is_some() || inner.preparing.is_some();
            if session.is_some() {
                inner.status = PlayerStatus::Stopping;
            }
            inner.state.reset();
            (session, cleared, was_audible)
        };

        if let Some(session) = session {
            if let Err(e) = session.stop().await {
                warn!("⚠️ Error al detener el transporte: {}", e);
            }
            let pending = {
                let mut inner = self.shared.inner.lock();
                if inner.status == PlayerStatus::Stopping {
                    inner.status = PlayerStatus::Idle;
                    !inner.queue.is_empty()
                } else {
                    false
                }
            };
            // Lo encolado mientras se detenía no recibió su avance
            if pending {
                self.shared.post(ControllerEvent::Advance);
            }
        }

        if was_audible {
            info!("⏹️ Reproducción detenida en guild {}", self.shared.guild_id);
            self.shared.notify("⏹️ Reproducción detenida y cola limpiada").await;
        }
        cleared
    }

    /// Salida del canal de voz: detiene, vacía y suelta el transporte.
    pub async fn leave(&self) {
        self.stop_and_clear().await;
        let mut inner = self.shared.inner.lock();
        inner.transport = None;
        info!("👋 Controlador liberado en guild {}", self.shared.guild_id);
    }

    /// Termina el worker; el manejador deja de avanzar la cola.
    pub fn shutdown(&self) {
        self.shared.post(ControllerEvent::Shutdown);
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let inner = self.shared.inner.lock();
        PlayerSnapshot {
            status: inner.status,
            state: inner.state.clone(),
            preparing: inner.preparing.clone(),
            queue: inner.queue.snapshot(),
        }
    }

    /// Quita de la cola el track en `index` (base 1)
    pub fn remove(&self, index: usize) -> Result<TrackDescriptor, QueueError> {
        self.shared.inner.lock().queue.remove(index)
    }

    /// Mueve el track en `index` (base 1) al principio de la cola
    pub fn move_to_front(&self, index: usize) -> Result<TrackDescriptor, QueueError> {
        self.shared.inner.lock().queue.move_to_front(index).cloned()
    }

    /// Mezcla la cola; devuelve cuántos tracks se mezclaron
    pub fn shuffle(&self) -> Result<usize, QueueError> {
        let mut inner = self.shared.inner.lock();
        inner.queue.shuffle()?;
        Ok(inner.queue.len())
    }
}

async fn run_worker(shared: Arc<Shared>, mut receiver: mpsc::UnboundedReceiver<ControllerEvent>) {
    debug!("🎛️ Worker iniciado para guild {}", shared.guild_id);

    while let Some(event) = receiver.recv().await {
        match event {
            ControllerEvent::Advance => shared.advance().await,
            ControllerEvent::SessionEnded { session, outcome } => {
                shared.on_session_ended(session, outcome).await
            }
            ControllerEvent::Shutdown => break,
        }
    }

    debug!("🎛️ Worker detenido para guild {}", shared.guild_id);
}

impl Shared {
    fn post(&self, event: ControllerEvent) {
        if self.events.send(event).is_err() {
            debug!("Worker de guild {} cerrado, evento descartado", self.guild_id);
        }
    }

    fn is_cancelled(&self, epoch: u64) -> bool {
        self.inner.lock().epoch != epoch
    }

    /// Avanza la cola hasta que un track suene o no queden candidatos.
    ///
    /// Cada vuelta consume un track; el número de vueltas se limita al largo
    /// de la cola al empezar, así una cola entera imposible de reproducir
    /// termina en `Idle` en lugar de repetirse sin fin.
    async fn advance(&self) {
        let mut budget = {
            let inner = self.inner.lock();
            if inner.status != PlayerStatus::Idle {
                debug!(
                    "Avance ignorado en guild {}: estado {}",
                    self.guild_id, inner.status
                );
                return;
            }
            inner.queue.len()
        };

        while budget > 0 {
            budget -= 1;

            let transport = self.inner.lock().transport.clone();
            let Some(transport) = transport else {
                debug!("Sin transporte en guild {}, cola en espera", self.guild_id);
                return;
            };
            if !transport.is_connected().await {
                info!("🔇 Sin canal de voz en guild {}, cola en espera", self.guild_id);
                return;
            }

            let (track, epoch) = {
                let mut inner = self.inner.lock();
                if inner.status != PlayerStatus::Idle {
                    return;
                }
                let Some(track) = inner.queue.pop_front() else {
                    break;
                };
                inner.status = PlayerStatus::Resolving;
                inner.preparing = Some(track.clone());
                (track, inner.epoch)
            };

            info!("🎵 Preparando: {} (guild {})", track, self.guild_id);

            match self.prepare(&track, epoch, &transport).await {
                Prepared::Started(session) => {
                    let accepted = {
                        let mut inner = self.inner.lock();
                        inner.preparing = None;
                        if inner.epoch == epoch {
                            inner.status = PlayerStatus::Playing;
                            inner.state.begin(track.clone(), Utc::now());
                            inner.session = Some(session.clone());
                            true
                        } else {
                            inner.status = PlayerStatus::Idle;
                            false
                        }
                    };

                    if accepted {
                        info!("▶️ Reproduciendo: {} (guild {})", track, self.guild_id);
                        self.notify(format!("🎵 Reproduciendo: {}", track)).await;
                        return;
                    }

                    info!("⏭️ Stream de {} descartado tras cancelación", track);
                    if let Err(e) = session.stop().await {
                        warn!("⚠️ No se pudo detener el stream descartado: {}", e);
                    }
                }
                Prepared::Cancelled => {
                    self.finish_preparation();
                    info!("⏭️ Preparación de {} cancelada", track);
                }
                Prepared::Exhausted(e) => {
                    self.finish_preparation();
                    error!(
                        "❌ Track descartado tras {} intentos: {} - {}",
                        self.options.retry.max_attempts, track, e
                    );
                    self.notify(format!("❌ No se pudo reproducir: {}", track)).await;
                }
            }
        }

        let remaining = self.inner.lock().queue.len();
        if remaining > 0 {
            debug!(
                "Límite de avance alcanzado en guild {} con {} tracks pendientes",
                self.guild_id, remaining
            );
        } else {
            info!("📭 Cola vacía en guild {}", self.guild_id);
        }
    }

    fn finish_preparation(&self) {
        let mut inner = self.inner.lock();
        inner.preparing = None;
        inner.status = PlayerStatus::Idle;
    }

    /// Obtiene un localizador fresco y arranca el transporte, con backoff.
    async fn prepare(
        &self,
        track: &TrackDescriptor,
        epoch: u64,
        transport: &Arc<dyn AudioTransport>,
    ) -> Prepared {
        let policy = self.options.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            if self.is_cancelled(epoch) {
                return Prepared::Cancelled;
            }

            match self.attempt_start(track, epoch, transport).await {
                Ok(Attempt::Started(session)) => return Prepared::Started(session),
                Ok(Attempt::Cancelled) => return Prepared::Cancelled,
                Err(e) if policy.is_exhausted(attempt) => return Prepared::Exhausted(e),
                Err(e) => {
                    let delay = policy.delay_after(attempt);
                    warn!(
                        "⚠️ Intento {}/{} falló para {}: {}. Reintentando en {:?}",
                        attempt, policy.max_attempts, track, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt_start(
        &self,
        track: &TrackDescriptor,
        epoch: u64,
        transport: &Arc<dyn AudioTransport>,
    ) -> Result<Attempt, StreamStartError> {
        let locator = self.resolver.stream_locator(track).await?;

        // Lo que llegue después de un skip/stop no debe sonar
        let session = {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch {
                return Ok(Attempt::Cancelled);
            }
            inner.last_session += 1;
            inner.last_session
        };

        let request = StartRequest {
            session,
            locator,
            format: self.options.format,
            completion: CompletionHook::new(session, self.events.clone()),
        };

        let timeout = self.options.start_timeout;
        match tokio::time::timeout(timeout, transport.start(request)).await {
            Ok(started) => Ok(Attempt::Started(started?)),
            Err(_) => Err(StreamStartError::Timeout(timeout)),
        }
    }

    async fn on_session_ended(&self, session: SessionId, outcome: Result<(), TransportRuntimeError>) {
        let ended = {
            let mut inner = self.inner.lock();
            let active = inner.session.as_ref().map(|s| s.id()) == Some(session);
            if active {
                inner.session = None;
                inner.status = PlayerStatus::Idle;
                inner.state.reset();
            }
            active
        };

        if !ended {
            debug!(
                "Fin de sesión {} ignorado en guild {} (ya no está activa)",
                session, self.guild_id
            );
            return;
        }

        match outcome {
            Ok(()) => info!("✅ Track terminado en guild {}", self.guild_id),
            Err(e) => error!("❌ Error de transporte en guild {}: {}", self.guild_id, e),
        }

        self.advance().await;
    }

    async fn notify(&self, text: impl AsRef<str>) {
        let context = self.inner.lock().context;
        let Some(context) = context else {
            debug!("Sin canal de avisos en guild {}", self.guild_id);
            return;
        };

        if let Err(e) = self.sink.notify(context, text.as_ref()).await {
            warn!("📪 No se pudo enviar aviso en guild {}: {:?}", self.guild_id, e);
        }
    }
}

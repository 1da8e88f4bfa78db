use serenity::{async_trait, model::id::GuildId};
use songbird::{
    driver::Bitrate,
    input::{HttpRequest, Input},
    tracks::TrackHandle,
    Call, Event as VoiceEvent, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::events::{SessionSignal, TrackWatcher};
use crate::audio::transport::{AudioTransport, SessionId, StartRequest, TransportSession};
use crate::error::TransportError;

/// Transporte de audio sobre una llamada de voz de songbird.
pub struct SongbirdTransport {
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
}

impl SongbirdTransport {
    pub fn new(guild_id: GuildId, call: Arc<Mutex<Call>>, http: reqwest::Client) -> Self {
        Self {
            guild_id,
            call,
            http,
        }
    }
}

#[async_trait]
impl AudioTransport for SongbirdTransport {
    async fn is_connected(&self) -> bool {
        self.call.lock().await.current_channel().is_some()
    }

    async fn start(&self, request: StartRequest) -> Result<Arc<dyn TransportSession>, TransportError> {
        let StartRequest {
            session,
            locator,
            format,
            completion,
        } = request;

        let input = Input::from(HttpRequest::new(self.http.clone(), locator.url));
        let (signal, ready) = SessionSignal::new(completion);

        let handle = {
            let mut call = self.call.lock().await;
            if call.current_channel().is_none() {
                return Err(TransportError::NotConnected);
            }
            call.set_bitrate(Bitrate::BitsPerSecond(format.bitrate_kbps as i32 * 1000));
            call.play_only_input(input)
        };

        // Si el arranque se abandona (timeout), el track no debe quedar sonando
        let guard = StopOnDrop(Some(handle.clone()));

        if let Err(e) = handle.set_volume(format.volume) {
            warn!("🔊 No se pudo ajustar el volumen: {}", e);
        }

        for event in [TrackEvent::Playable, TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    VoiceEvent::Track(event),
                    TrackWatcher {
                        event,
                        signal: signal.clone(),
                    },
                )
                .map_err(|e| TransportError::Start(format!("error al registrar eventos: {e}")))?;
        }

        match ready.await {
            Ok(Ok(())) => {
                guard.disarm();
                info!("🔊 Sesión {} sonando en guild {}", session, self.guild_id);
                Ok(Arc::new(SongbirdSession { id: session, handle }))
            }
            Ok(Err(cause)) => Err(TransportError::Start(cause)),
            Err(_) => Err(TransportError::Start("el reproductor descartó el track".into())),
        }
    }
}

struct StopOnDrop(Option<TrackHandle>);

impl StopOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            debug!("⏹️ Deteniendo track abandonado");
            let _ = handle.stop();
        }
    }
}

/// Track en curso dentro de una llamada de songbird.
pub struct SongbirdSession {
    id: SessionId,
    handle: TrackHandle,
}

#[async_trait]
impl TransportSession for SongbirdSession {
    fn id(&self) -> SessionId {
        self.id
    }

    async fn pause(&self) -> Result<(), TransportError> {
        self.handle
            .pause()
            .map_err(|e| TransportError::Control(e.to_string()))
    }

    async fn resume(&self) -> Result<(), TransportError> {
        self.handle
            .play()
            .map_err(|e| TransportError::Control(e.to_string()))
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.handle
            .stop()
            .map_err(|e| TransportError::Control(e.to_string()))
    }
}

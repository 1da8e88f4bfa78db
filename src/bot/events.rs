use parking_lot::Mutex;
use serenity::async_trait;
use songbird::{
    tracks::PlayMode, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler,
    TrackEvent,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::audio::transport::CompletionHook;

/// Estado compartido entre el arranque de un track y sus eventos de voz.
///
/// Antes de ser reproducible, un fin o error responde al arranque pendiente;
/// después, se reporta una sola vez por el `CompletionHook`.
pub struct SessionSignal {
    ready: Mutex<Option<oneshot::Sender<Result<(), String>>>>,
    started: AtomicBool,
    ended: AtomicBool,
    completion: CompletionHook,
}

impl SessionSignal {
    pub fn new(completion: CompletionHook) -> (Arc<Self>, oneshot::Receiver<Result<(), String>>) {
        let (ready, receiver) = oneshot::channel();
        let signal = Arc::new(Self {
            ready: Mutex::new(Some(ready)),
            started: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            completion,
        });
        (signal, receiver)
    }

    fn playable(&self) {
        if let Some(ready) = self.ready.lock().take() {
            self.started.store(true, Ordering::SeqCst);
            let _ = ready.send(Ok(()));
        }
    }

    fn ended(&self, failure: Option<String>) {
        if let Some(ready) = self.ready.lock().take() {
            let cause = failure.unwrap_or_else(|| "el track terminó antes de poder reproducirse".into());
            let _ = ready.send(Err(cause));
            return;
        }

        if !self.started.load(Ordering::SeqCst) || self.ended.swap(true, Ordering::SeqCst) {
            return;
        }

        match failure {
            Some(cause) => self.completion.failed(cause),
            None => self.completion.finished(),
        }
    }
}

/// Handler de eventos de un track de songbird
pub struct TrackWatcher {
    pub event: TrackEvent,
    pub signal: Arc<SessionSignal>,
}

#[async_trait]
impl VoiceEventHandler for TrackWatcher {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let session = self.signal.completion.session();

        match self.event {
            TrackEvent::Playable => {
                debug!("🎧 Sesión {} lista para reproducir", session);
                self.signal.playable();
            }
            TrackEvent::End => {
                debug!("🎵 Sesión {} terminó", session);
                self.signal.ended(None);
            }
            TrackEvent::Error => {
                let cause = describe_error(ctx);
                error!("❌ Error en sesión {}: {}", session, cause);
                self.signal.ended(Some(cause));
            }
            _ => {}
        }

        None
    }
}

fn describe_error(ctx: &EventContext<'_>) -> String {
    if let EventContext::Track(track_list) = ctx {
        for (state, _handle) in *track_list {
            if let PlayMode::Errored(e) = &state.playing {
                return format!("{e:?}");
            }
        }
    }
    "error desconocido del reproductor".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::controller::ControllerEvent;
    use tokio::sync::mpsc;

    fn signal() -> (
        Arc<SessionSignal>,
        oneshot::Receiver<Result<(), String>>,
        mpsc::UnboundedReceiver<ControllerEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (signal, ready) = SessionSignal::new(CompletionHook::new(4, tx));
        (signal, ready, rx)
    }

    #[tokio::test]
    async fn end_after_start_fires_completion_once() {
        let (signal, ready, mut events) = signal();

        signal.playable();
        assert_eq!(ready.await.unwrap(), Ok(()));

        signal.ended(None);
        signal.ended(Some("tarde".into()));

        match events.try_recv() {
            Ok(ControllerEvent::SessionEnded { session, outcome }) => {
                assert_eq!(session, 4);
                assert!(outcome.is_ok());
            }
            _ => panic!("se esperaba un fin de sesión"),
        }
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn error_before_start_fails_the_start_only() {
        let (signal, ready, mut events) = signal();

        signal.ended(Some("403 Forbidden".into()));
        assert_eq!(ready.await.unwrap(), Err("403 Forbidden".to_string()));

        signal.ended(None);
        assert!(events.try_recv().is_err());
    }
}

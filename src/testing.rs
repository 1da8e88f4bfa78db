//! Dobles de prueba compartidos por los tests del núcleo de reproducción.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::audio::retry::RetryPolicy;
use crate::audio::track::{StreamLocator, TrackDescriptor};
use crate::audio::transport::{
    AudioTransport, CompletionHook, MessagingSink, NotifyContext, SessionId, StartRequest,
    TransportSession,
};
use crate::config::{LookupOptions, PlaybackOptions};
use crate::error::{LookupError, TransportError};
use crate::sources::{LookupOutcome, MediaEntry, MediaLookup};

/// Track de prueba con locator `https://youtu.be/{title}`.
pub fn track(title: &str, duration: u64) -> TrackDescriptor {
    TrackDescriptor::new(format!("https://youtu.be/{title}"), title, duration)
}

/// Opciones con esperas de milisegundos para que los tests sean rápidos.
pub fn test_options() -> PlaybackOptions {
    PlaybackOptions {
        retry: RetryPolicy::new(3, Duration::from_millis(1)),
        start_timeout: Duration::from_millis(50),
        ..PlaybackOptions::default()
    }
}

/// Espera hasta que `check` se cumpla o falla tras 5 segundos.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "la condición no se cumplió a tiempo");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Servicio de búsqueda en memoria con fallos programables.
#[derive(Default)]
pub struct FakeLookup {
    locator_calls: Mutex<HashMap<String, usize>>,
    // Fallos pendientes por locator; `usize::MAX` falla siempre
    failures: Mutex<HashMap<String, usize>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeLookup {
    pub fn fail_always(&self, track: &TrackDescriptor) {
        self.fail_times(track, usize::MAX);
    }

    pub fn fail_times(&self, track: &TrackDescriptor, times: usize) {
        self.failures
            .lock()
            .insert(track.source_locator().to_string(), times);
    }

    pub fn locator_calls_for(&self, track: &TrackDescriptor) -> usize {
        self.locator_calls
            .lock()
            .get(track.source_locator())
            .copied()
            .unwrap_or(0)
    }

    /// Bloquea cada petición de locator hasta `release_locator`
    pub fn hold_locators(&self) {
        *self.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_locator(&self) {
        if let Some(gate) = self.gate.lock().as_ref() {
            gate.add_permits(1);
        }
    }
}

#[async_trait]
impl MediaLookup for FakeLookup {
    async fn search(
        &self,
        text: &str,
        top_n: usize,
        _options: &LookupOptions,
    ) -> Result<Vec<MediaEntry>, LookupError> {
        Ok((1..=top_n)
            .map(|i| MediaEntry::new(format!("https://youtu.be/{text}{i}"), format!("{text} {i}"), 60.0))
            .collect())
    }

    async fn resolve(&self, url: &str, _options: &LookupOptions) -> Result<LookupOutcome, LookupError> {
        Ok(LookupOutcome::Single(MediaEntry::new(url, url, 60.0)))
    }

    async fn get_stream_locator(
        &self,
        track: &TrackDescriptor,
        _options: &LookupOptions,
    ) -> Result<StreamLocator, LookupError> {
        let locator = track.source_locator().to_string();

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        *self.locator_calls.lock().entry(locator.clone()).or_default() += 1;

        let failing = {
            let mut failures = self.failures.lock();
            match failures.get_mut(&locator) {
                Some(remaining) if *remaining > 0 => {
                    if *remaining != usize::MAX {
                        *remaining -= 1;
                    }
                    true
                }
                _ => false,
            }
        };

        if failing {
            return Err(LookupError::Unavailable(locator));
        }
        Ok(StreamLocator::new(format!("{locator}#stream")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Start(String),
    Pause(SessionId),
    Resume(SessionId),
    Stop(SessionId),
}

/// Transporte que registra las llamadas y termina sesiones a pedido.
pub struct FakeTransport {
    connected: AtomicBool,
    calls: Arc<Mutex<Vec<TransportCall>>>,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    start_gate: Mutex<Option<Arc<Semaphore>>>,
    starts_waiting: AtomicUsize,
    stop_gate: Arc<Mutex<Option<Arc<Semaphore>>>>,
}

impl FakeTransport {
    pub fn connected() -> Self {
        Self {
            connected: AtomicBool::new(true),
            calls: Arc::new(Mutex::new(Vec::new())),
            sessions: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            hanging: Mutex::new(HashSet::new()),
            start_gate: Mutex::new(None),
            starts_waiting: AtomicUsize::new(0),
            stop_gate: Arc::new(Mutex::new(None)),
        }
    }

    /// Bloquea cada arranque hasta `release_start`
    pub fn hold_starts(&self) {
        *self.start_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_start(&self) {
        if let Some(gate) = self.start_gate.lock().as_ref() {
            gate.add_permits(1);
        }
    }

    /// Arranques detenidos en la compuerta
    pub fn starts_waiting(&self) -> usize {
        self.starts_waiting.load(Ordering::SeqCst)
    }

    /// Bloquea cada `stop` de sesión hasta `release_stop`
    pub fn hold_stops(&self) {
        *self.stop_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_stop(&self) {
        if let Some(gate) = self.stop_gate.lock().as_ref() {
            gate.add_permits(1);
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn fail_starts_for(&self, locator: &str) {
        self.failing.lock().insert(locator.to_string());
    }

    /// El arranque de este locator nunca termina
    pub fn hang_starts_for(&self, locator: &str) {
        self.hanging.lock().insert(locator.to_string());
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    /// Locators efectivamente arrancados, en orden
    pub fn started(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Start(locator) => Some(locator.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn current_session_id(&self) -> Option<SessionId> {
        self.sessions.lock().last().map(|s| s.id)
    }

    /// Simula el fin natural del stream más reciente
    pub fn finish_current(&self) {
        let session = self.sessions.lock().last().cloned();
        if let Some(session) = session {
            session.end(None);
        }
    }

    /// Simula un error a mitad de reproducción
    pub fn fail_current(&self, cause: &str) {
        let session = self.sessions.lock().last().cloned();
        if let Some(session) = session {
            session.end(Some(cause));
        }
    }
}

#[async_trait]
impl AudioTransport for FakeTransport {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn start(&self, request: StartRequest) -> Result<Arc<dyn TransportSession>, TransportError> {
        let locator = request.locator.url.clone();

        let gate = self.start_gate.lock().clone();
        if let Some(gate) = gate {
            self.starts_waiting.fetch_add(1, Ordering::SeqCst);
            let acquired = gate.acquire().await;
            self.starts_waiting.fetch_sub(1, Ordering::SeqCst);
            if let Ok(permit) = acquired {
                permit.forget();
            }
        }

        let hangs = self.hanging.lock().contains(&locator);
        if hangs {
            std::future::pending::<()>().await;
        }
        let fails = self.failing.lock().contains(&locator);
        if fails {
            return Err(TransportError::Start(format!("no se pudo abrir {locator}")));
        }

        self.calls.lock().push(TransportCall::Start(locator));
        let session = Arc::new(FakeSession {
            id: request.session,
            hook: request.completion,
            calls: self.calls.clone(),
            stop_gate: self.stop_gate.clone(),
            ended: AtomicBool::new(false),
        });
        self.sessions.lock().push(session.clone());
        Ok(session)
    }
}

pub struct FakeSession {
    id: SessionId,
    hook: CompletionHook,
    calls: Arc<Mutex<Vec<TransportCall>>>,
    stop_gate: Arc<Mutex<Option<Arc<Semaphore>>>>,
    ended: AtomicBool,
}

impl FakeSession {
    fn end(&self, failure: Option<&str>) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        match failure {
            Some(cause) => self.hook.failed(cause),
            None => self.hook.finished(),
        }
    }
}

#[async_trait]
impl TransportSession for FakeSession {
    fn id(&self) -> SessionId {
        self.id
    }

    async fn pause(&self) -> Result<(), TransportError> {
        self.calls.lock().push(TransportCall::Pause(self.id));
        Ok(())
    }

    async fn resume(&self) -> Result<(), TransportError> {
        self.calls.lock().push(TransportCall::Resume(self.id));
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let gate = self.stop_gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.calls.lock().push(TransportCall::Stop(self.id));
        self.end(None);
        Ok(())
    }
}

/// Sumidero de mensajes que guarda lo enviado.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
    failing: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl MessagingSink for RecordingSink {
    async fn notify(&self, _context: NotifyContext, text: &str) -> anyhow::Result<()> {
        if self.failing {
            anyhow::bail!("canal no disponible");
        }
        self.messages.lock().push(text.to_string());
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use super::track::TrackDescriptor;

/// Fase del controlador de una guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    /// Sin stream activo ni preparación en curso
    Idle,
    /// Obteniendo un localizador fresco para el siguiente track
    Resolving,
    Playing,
    Paused,
    /// Transitorio mientras se detiene el transporte
    Stopping,
}

impl PlayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerStatus::Idle => "idle",
            PlayerStatus::Resolving => "resolving",
            PlayerStatus::Playing => "playing",
            PlayerStatus::Paused => "paused",
            PlayerStatus::Stopping => "stopping",
        }
    }
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estado audible de una guild; sólo lo modifica el controlador.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackState {
    pub current: Option<TrackDescriptor>,
    pub is_playing: bool,
    pub is_paused: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    /// Tiempo acumulado en pausas ya reanudadas
    pub paused_total: Duration,
}

impl PlaybackState {
    pub(crate) fn begin(&mut self, track: TrackDescriptor, now: DateTime<Utc>) {
        self.current = Some(track);
        self.is_playing = true;
        self.is_paused = false;
        self.started_at = Some(now);
        self.paused_at = None;
        self.paused_total = Duration::ZERO;
    }

    pub(crate) fn pause(&mut self, now: DateTime<Utc>) {
        self.is_paused = true;
        self.paused_at = Some(now);
    }

    pub(crate) fn resume(&mut self, now: DateTime<Utc>) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += (now - paused_at).to_std().unwrap_or_default();
        }
        self.is_paused = false;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Tiempo reproducido del track actual, sin contar las pausas.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let Some(started_at) = self.started_at else {
            return Duration::ZERO;
        };

        let until = self.paused_at.unwrap_or(now);
        (until - started_at)
            .to_std()
            .unwrap_or_default()
            .saturating_sub(self.paused_total)
    }
}

/// Copia de sólo lectura para mostrar al usuario.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub status: PlayerStatus,
    pub state: PlaybackState,
    /// Track sacado de la cola cuyo stream se está preparando
    pub preparing: Option<TrackDescriptor>,
    pub queue: Vec<TrackDescriptor>,
}

impl PlayerSnapshot {
    pub fn current(&self) -> Option<&TrackDescriptor> {
        self.state.current.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.state.current.is_none() && self.preparing.is_none() && self.queue.is_empty()
    }

    pub fn queued_duration(&self) -> u64 {
        self.queue.iter().map(TrackDescriptor::duration_seconds).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn elapsed_excludes_paused_time() {
        let t0 = Utc::now();
        let mut state = PlaybackState::default();
        state.begin(TrackDescriptor::new("u", "A", 180), t0);

        assert_eq!(state.elapsed(t0 + TimeDelta::seconds(10)), Duration::from_secs(10));

        state.pause(t0 + TimeDelta::seconds(10));
        assert_eq!(state.elapsed(t0 + TimeDelta::seconds(50)), Duration::from_secs(10));

        state.resume(t0 + TimeDelta::seconds(40));
        assert!(state.paused_at.is_none());
        assert_eq!(state.started_at, Some(t0));
        assert_eq!(state.elapsed(t0 + TimeDelta::seconds(45)), Duration::from_secs(15));
    }

    #[test]
    fn reset_clears_everything() {
        let mut state = PlaybackState::default();
        state.begin(TrackDescriptor::new("u", "A", 180), Utc::now());
        state.reset();
        assert_eq!(state, PlaybackState::default());
        assert_eq!(state.elapsed(Utc::now()), Duration::ZERO);
    }
}

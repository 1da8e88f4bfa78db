use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::info;

use super::controller::{EnqueueOutcome, PlaybackController, SkipOutcome};
use super::state::PlayerSnapshot;
use super::track::TrackDescriptor;
use super::transport::MessagingSink;
use crate::config::PlaybackOptions;
use crate::error::{PlaybackError, QueueError};
use crate::sources::MediaResolver;

/// Un controlador por guild, creado bajo demanda.
///
/// Las operaciones de control sobre una guild sin controlador no lo crean:
/// responden como un reproductor vacío.
pub struct GuildRegistry {
    controllers: DashMap<GuildId, PlaybackController>,
    resolver: Arc<MediaResolver>,
    sink: Arc<dyn MessagingSink>,
    options: PlaybackOptions,
}

impl GuildRegistry {
    pub fn new(
        resolver: Arc<MediaResolver>,
        sink: Arc<dyn MessagingSink>,
        options: PlaybackOptions,
    ) -> Self {
        Self {
            controllers: DashMap::new(),
            resolver,
            sink,
            options,
        }
    }

    pub fn resolver(&self) -> &Arc<MediaResolver> {
        &self.resolver
    }

    /// Devuelve el controlador de la guild, creándolo si hace falta
    pub fn get_or_create(&self, guild_id: GuildId) -> PlaybackController {
        self.controllers
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🎛️ Nuevo controlador para guild {}", guild_id);
                PlaybackController::spawn(
                    guild_id,
                    self.resolver.clone(),
                    self.sink.clone(),
                    self.options.clone(),
                )
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<PlaybackController> {
        self.controllers.get(&guild_id).map(|c| c.clone())
    }

    /// Detiene y descarta el controlador de la guild
    pub async fn remove(&self, guild_id: GuildId) -> bool {
        let Some((_, controller)) = self.controllers.remove(&guild_id) else {
            return false;
        };

        controller.leave().await;
        controller.shutdown();
        info!("🗑️ Controlador eliminado para guild {}", guild_id);
        true
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn enqueue(
        &self,
        guild_id: GuildId,
        tracks: Vec<TrackDescriptor>,
    ) -> Result<EnqueueOutcome, QueueError> {
        self.get_or_create(guild_id).enqueue(tracks)
    }

    pub fn advance_if_idle(&self, guild_id: GuildId) -> bool {
        self.get_or_create(guild_id).advance_if_idle()
    }

    pub async fn skip(&self, guild_id: GuildId) -> Result<SkipOutcome, PlaybackError> {
        self.existing(guild_id)?.skip().await
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        self.existing(guild_id)?.pause().await
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        self.existing(guild_id)?.resume().await
    }

    pub async fn stop_and_clear(&self, guild_id: GuildId) -> usize {
        match self.get(guild_id) {
            Some(controller) => controller.stop_and_clear().await,
            None => 0,
        }
    }

    pub fn snapshot(&self, guild_id: GuildId) -> Option<PlayerSnapshot> {
        self.get(guild_id).map(|c| c.snapshot())
    }

    pub fn remove_at(&self, guild_id: GuildId, index: usize) -> Result<TrackDescriptor, QueueError> {
        match self.get(guild_id) {
            Some(controller) => controller.remove(index),
            None => Err(QueueError::IndexOutOfRange { index, len: 0 }),
        }
    }

    pub fn move_to_front(
        &self,
        guild_id: GuildId,
        index: usize,
    ) -> Result<TrackDescriptor, QueueError> {
        match self.get(guild_id) {
            Some(controller) => controller.move_to_front(index),
            None => Err(QueueError::IndexOutOfRange { index, len: 0 }),
        }
    }

    pub fn shuffle(&self, guild_id: GuildId) -> Result<usize, QueueError> {
        match self.get(guild_id) {
            Some(controller) => controller.shuffle(),
            None => Err(QueueError::NotEnoughTracks { len: 0 }),
        }
    }

    fn existing(&self, guild_id: GuildId) -> Result<PlaybackController, PlaybackError> {
        self.get(guild_id).ok_or(PlaybackError::NothingPlaying)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::state::PlayerStatus;
    use crate::testing::{eventually, test_options, track, FakeLookup, FakeTransport, RecordingSink};

    fn registry(lookup: Arc<FakeLookup>) -> GuildRegistry {
        let resolver = Arc::new(MediaResolver::new(lookup, Default::default()));
        GuildRegistry::new(resolver, Arc::new(RecordingSink::default()), test_options())
    }

    #[tokio::test]
    async fn same_guild_shares_one_controller() {
        let registry = registry(Arc::new(FakeLookup::default()));
        let first = registry.get_or_create(GuildId::new(1));
        let again = registry.get_or_create(GuildId::new(1));
        let other = registry.get_or_create(GuildId::new(2));

        assert!(first.same_as(&again));
        assert!(!first.same_as(&other));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn control_on_unknown_guild_does_not_create_controller() {
        let registry = registry(Arc::new(FakeLookup::default()));
        let guild = GuildId::new(5);

        assert_eq!(registry.skip(guild).await, Err(PlaybackError::NothingPlaying));
        assert_eq!(registry.pause(guild).await, Err(PlaybackError::NothingPlaying));
        assert_eq!(registry.stop_and_clear(guild).await, 0);
        assert_eq!(
            registry.remove_at(guild, 1),
            Err(QueueError::IndexOutOfRange { index: 1, len: 0 })
        );
        assert!(registry.snapshot(guild).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn guilds_are_isolated() {
        let lookup = Arc::new(FakeLookup::default());
        let registry = registry(lookup.clone());
        let slow = GuildId::new(1);
        let fast = GuildId::new(2);

        lookup.fail_always(&track("roto", 10));
        for guild in [slow, fast] {
            registry
                .get_or_create(guild)
                .attach_transport(Arc::new(FakeTransport::connected()));
        }

        registry.enqueue(slow, vec![track("roto", 10)]).unwrap();
        registry.enqueue(fast, vec![track("bien", 10)]).unwrap();
        registry.advance_if_idle(slow);
        registry.advance_if_idle(fast);

        eventually(|| {
            registry
                .snapshot(fast)
                .is_some_and(|s| s.status == PlayerStatus::Playing)
        })
        .await;
        eventually(|| lookup.locator_calls_for(&track("roto", 10)) == 3).await;
        eventually(|| registry.snapshot(slow).is_some_and(|s| s.is_empty())).await;

        let fast_snapshot = registry.snapshot(fast).unwrap();
        assert_eq!(fast_snapshot.current().map(|t| t.display_title()), Some("bien"));
    }

    #[tokio::test]
    async fn remove_stops_and_forgets_the_guild() {
        let registry = registry(Arc::new(FakeLookup::default()));
        let guild = GuildId::new(9);
        let transport = Arc::new(FakeTransport::connected());
        let controller = registry.get_or_create(guild);
        controller.attach_transport(transport.clone());

        registry
            .enqueue(guild, vec![track("A", 10), track("B", 10)])
            .unwrap();
        registry.advance_if_idle(guild);
        eventually(|| controller.status() == PlayerStatus::Playing).await;

        assert!(registry.remove(guild).await);
        assert!(!registry.remove(guild).await);
        assert!(registry.get(guild).is_none());
        assert!(controller.snapshot().is_empty());

        let fresh = registry.get_or_create(guild);
        assert!(!fresh.same_as(&controller));
        assert!(!fresh.has_transport());
    }
}

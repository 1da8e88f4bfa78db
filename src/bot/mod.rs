//! # Bot Module
//!
//! Superficie de Discord del bot: registro de comandos slash, conexión de
//! voz y adaptación de songbird al transporte de audio del controlador.
//!
//! [`GabiMusicBot`] implementa el [`EventHandler`] de serenity y delega toda
//! la lógica de reproducción en el [`GuildRegistry`]; aquí sólo se traducen
//! interacciones a operaciones del controlador y se gestiona el ciclo de
//! vida de las llamadas de voz.

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, UserId, VoiceState},
    async_trait,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;
pub mod notifier;
pub mod search;
pub mod transport;

use crate::{
    audio::{registry::GuildRegistry, track::TrackDescriptor},
    config::Config,
    storage::PlaylistStore,
};
use transport::SongbirdTransport;

/// Candidatos de búsqueda esperando la elección del usuario
pub struct PendingSearch {
    pub results: Vec<TrackDescriptor>,
    pub created_at: Instant,
}

pub struct GabiMusicBot {
    config: Arc<Config>,
    pub registry: Arc<GuildRegistry>,
    pub playlists: Arc<tokio::sync::Mutex<PlaylistStore>>,
    /// Cliente HTTP compartido por los streams de songbird
    http_client: reqwest::Client,
    pub pending_searches: DashMap<(GuildId, UserId), PendingSearch>,
}

impl GabiMusicBot {
    pub fn new(
        config: Config,
        registry: Arc<GuildRegistry>,
        playlists: Arc<tokio::sync::Mutex<PlaylistStore>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            playlists,
            http_client: reqwest::Client::new(),
            pending_searches: DashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Conecta el bot a un canal de voz y entrega la llamada al controlador
    pub async fn join_voice_channel(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<()> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        let call = manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al conectar al canal de voz: {:?}", e);
            anyhow::anyhow!("Error al conectar al canal de voz")
        })?;

        let transport = SongbirdTransport::new(guild_id, call, self.http_client.clone());
        self.registry
            .get_or_create(guild_id)
            .attach_transport(Arc::new(transport));

        info!("🔊 Conectado al canal de voz en guild {}", guild_id);
        Ok(())
    }

    /// Conecta al canal del usuario si el bot aún no tiene llamada activa
    pub async fn ensure_voice(&self, ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<()> {
        let channel_id = handlers::get_user_voice_channel(ctx, guild_id, user_id).await?;

        let connected = match songbird::get(ctx).await.and_then(|m| m.get(guild_id)) {
            Some(call) => call.lock().await.current_channel().is_some(),
            None => false,
        };
        let attached = self
            .registry
            .get(guild_id)
            .is_some_and(|controller| controller.has_transport());

        if connected && attached {
            return Ok(());
        }
        self.join_voice_channel(ctx, guild_id, channel_id).await
    }

    /// Detiene, limpia y desconecta la guild
    pub async fn leave_voice_channel(&self, ctx: &Context, guild_id: GuildId) -> Result<()> {
        self.registry.remove(guild_id).await;

        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        if manager.get(guild_id).is_some() {
            manager.remove(guild_id).await?;
        }

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }

    /// Humanos (no bots) en el canal de voz donde está el bot
    fn humans_with_bot(ctx: &Context, guild_id: GuildId) -> Option<usize> {
        let bot_id = ctx.cache.current_user().id;
        let guild = ctx.cache.guild(guild_id)?;
        let bot_channel = guild.voice_states.get(&bot_id)?.channel_id?;

        let humans = guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(bot_channel) && state.user_id != bot_id)
            .filter(|state| {
                let member = state.member.as_ref().or_else(|| guild.members.get(&state.user_id));
                !member.is_some_and(|member| member.user.bot)
            })
            .count();

        Some(humans)
    }
}

#[async_trait]
impl EventHandler for GabiMusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let current_user_id = ctx.cache.current_user().id;

        // El bot fue desconectado del canal
        if new.user_id == current_user_id {
            if old.is_some() && new.channel_id.is_none() {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                if let Err(e) = self.leave_voice_channel(&ctx, guild_id).await {
                    warn!("Error al limpiar la guild {}: {:?}", guild_id, e);
                }
            }
            return;
        }

        // Salir si el último humano abandonó el canal del bot
        match Self::humans_with_bot(&ctx, guild_id) {
            Some(0) => {
                info!("🚪 Canal vacío, desconectando en guild {}", guild_id);
                if let Err(e) = self.leave_voice_channel(&ctx, guild_id).await {
                    error!("Error al desconectar de guild {}: {:?}", guild_id, e);
                }
            }
            Some(humans) => debug!("👥 {} usuarios con el bot en guild {}", humans, guild_id),
            None => {}
        }
    }
}

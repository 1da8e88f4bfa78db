use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::{CommandDataOption, CommandDataOptionValue, CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{controller::SkipOutcome, track::TrackDescriptor, transport::NotifyContext},
    bot::GabiMusicBot,
    error::PlaybackError,
    sources::Resolution,
    storage::SavedTrack,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &GabiMusicBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Los avisos del reproductor van al último canal que lo usó
    bot.registry
        .get_or_create(guild_id)
        .bind_context(NotifyContext::new(command.channel_id.get()));

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "remove" => handle_remove(ctx, &command, bot, guild_id).await?,
        "top" => handle_top(ctx, &command, bot, guild_id).await?,
        "shuffle" => handle_shuffle(ctx, &command, bot, guild_id).await?,
        "join" => handle_join(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await?,
        "playlist" => handle_playlist(ctx, &command, bot, guild_id).await?,
        _ => reply(ctx, &command, "❌ Comando no reconocido", true).await?,
    }

    Ok(())
}

/// Maneja interacciones con componentes (menús de selección)
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &GabiMusicBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Componente {} usado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    match component.data.custom_id.as_str() {
        super::search::SELECTION_MENU_ID => {
            let index = super::search::selected_index(&component.data.kind);
            super::search::handle_track_selection(ctx, &component, bot, guild_id, index).await?;
        }
        _ => {
            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::UpdateMessage(
                        CreateInteractionResponseMessage::new().content("❌ Acción no reconocida"),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GabiMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = string_option(&command.data.options, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    if let Err(e) = bot.ensure_voice(ctx, guild_id, command.user.id).await {
        return edit_error(ctx, command, "Sin canal de voz", &e.to_string()).await;
    }

    let resolution = match bot.registry.resolver().resolve(&query).await {
        Ok(resolution) => resolution,
        Err(e) => {
            warn!("🔍 Error resolviendo '{}': {}", query, e);
            return edit_error(ctx, command, "Error al buscar", &e.to_string()).await;
        }
    };

    if resolution.is_empty() {
        return edit_error(
            ctx,
            command,
            "Sin Resultados",
            &format!("No se encontraron canciones para: **{}**", query),
        )
        .await;
    }

    match resolution {
        Resolution::Tracks(tracks) => {
            let embed = enqueue_and_describe(bot, guild_id, tracks)?;
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
        }
        Resolution::Candidates(candidates) => {
            super::search::present_candidates(ctx, command, bot, guild_id, &query, candidates)
                .await?;
        }
    }

    Ok(())
}

/// Encola, arranca si está inactivo y describe el resultado
pub(crate) fn enqueue_and_describe(
    bot: &GabiMusicBot,
    guild_id: GuildId,
    tracks: Vec<TrackDescriptor>,
) -> Result<CreateEmbed> {
    let embed = match bot.registry.enqueue(guild_id, tracks.clone()) {
        Ok(outcome) => {
            info!(
                "➕ {} tracks encolados en guild {} ({} descartados)",
                outcome.added, guild_id, outcome.dropped
            );
            embeds::create_tracks_added_embed(
                &tracks[..outcome.added],
                outcome.first_position,
                outcome.dropped,
            )
        }
        Err(e) => embeds::create_error_embed("Cola llena", &e.to_string()),
    };

    bot.registry.advance_if_idle(guild_id);
    Ok(embed)
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GabiMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.registry.pause(guild_id).await {
        Ok(()) => reply(ctx, command, "⏸️ Pausado", true).await,
        Err(e) => reply(ctx, command, &format!("❌ {}", capitalize(&e.to_string())), true).await,
    }
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GabiMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.registry.resume(guild_id).await {
        Ok(()) => reply(ctx, command, "▶️ Reanudado", true).await,
        Err(e) => reply(ctx, command, &format!("❌ {}", capitalize(&e.to_string())), true).await,
    }
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GabiMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let message = match bot.registry.skip(guild_id).await {
        Ok(SkipOutcome::Stopped) => "⏭️ Saltando a la siguiente canción".to_string(),
        Ok(SkipOutcome::CancelledPreparation) => "⏭️ Canción en preparación descartada".to_string(),
        Err(PlaybackError::NothingPlaying) => "❌ No hay nada reproduciéndose".to_string(),
        Err(e) => format!("❌ {}", capitalize(&e.to_string())),
    };
    reply(ctx, command, &message, false).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GabiMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let cleared = bot.registry.stop_and_clear(guild_id).await;
    reply(
        ctx,
        command,
        &format!("⏹️ Detenido ({} canciones quitadas de la cola)", cleared),
        true,
    )
    .await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GabiMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let snapshot = bot.registry.get_or_create(guild_id).snapshot();

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embeds::create_queue_embed(&snapshot)),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_remove(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GabiMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let position = position_option(&command.data.options, "position");
    let message = match bot.registry.remove_at(guild_id, position) {
        Ok(track) => format!("🗑️ Eliminada: {}", track),
        Err(e) => format!("❌ {}", capitalize(&e.to_string())),
    };
    reply(ctx, command, &message, false).await
}

async fn handle_top(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GabiMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let position = position_option(&command.data.options, "position");
    let message = match bot.registry.move_to_front(guild_id, position) {
        Ok(track) => format!("⬆️ Siguiente: {}", track),
        Err(e) => format!("❌ {}", capitalize(&e.to_string())),
    };
    reply(ctx, command, &message, false).await
}

async fn handle_shuffle(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GabiMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let message = match bot.registry.shuffle(guild_id) {
        Ok(count) => format!("🔀 Cola mezclada ({} canciones)", count),
        Err(e) => format!("❌ {}", capitalize(&e.to_string())),
    };
    reply(ctx, command, &message, false).await
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GabiMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let voice_channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id).await {
        Ok(channel_id) => channel_id,
        Err(e) => return reply(ctx, command, &format!("❌ {}", e), true).await,
    };

    bot.join_voice_channel(ctx, guild_id, voice_channel_id).await?;
    bot.registry.advance_if_idle(guild_id);

    reply(ctx, command, "🔊 Conectado al canal de voz", false).await
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GabiMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.leave_voice_channel(ctx, guild_id).await?;
    reply(ctx, command, "👋 ¡Hasta luego! Cola limpiada", false).await
}

async fn handle_playlist(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GabiMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(subcommand) = command.data.options.first() else {
        return reply(ctx, command, "❌ Subcomando no reconocido", true).await;
    };
    let CommandDataOptionValue::SubCommand(args) = &subcommand.value else {
        return reply(ctx, command, "❌ Subcomando no reconocido", true).await;
    };

    let user_id = command.user.id.get();
    let name = string_option(args, "name").unwrap_or_default().to_string();

    match subcommand.name.as_str() {
        "create" => {
            let created = bot.playlists.lock().await.create(user_id, &name).await?;
            let message = if created {
                format!("✅ Lista de reproducción '{}' creada", name)
            } else {
                "❌ Ya existe una lista con ese nombre".to_string()
            };
            reply(ctx, command, &message, true).await
        }
        "add" => {
            let query = string_option(args, "query").unwrap_or_default().to_string();
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Defer(
                        CreateInteractionResponseMessage::new().ephemeral(true),
                    ),
                )
                .await?;

            let first = match bot.registry.resolver().resolve(&query).await {
                Ok(Resolution::Tracks(tracks)) | Ok(Resolution::Candidates(tracks)) => {
                    tracks.into_iter().next()
                }
                Err(e) => {
                    warn!("🔍 Error resolviendo '{}': {}", query, e);
                    None
                }
            };

            let message = match first {
                Some(track) => {
                    let saved = SavedTrack::from_track(&track);
                    if bot.playlists.lock().await.add(user_id, &name, saved).await? {
                        format!("✅ Añadida: {}", track)
                    } else {
                        "❌ Lista no encontrada".to_string()
                    }
                }
                None => "❌ Error añadiendo la canción".to_string(),
            };
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().content(message))
                .await?;
            Ok(())
        }
        "remove" => {
            let index = position_option(args, "index");
            let removed = bot.playlists.lock().await.remove(user_id, &name, index).await?;
            let message = if removed {
                format!("✅ Canción {} eliminada de '{}'", index, name)
            } else {
                "❌ Lista o índice no válido".to_string()
            };
            reply(ctx, command, &message, true).await
        }
        "show" => {
            let embed = {
                let store = bot.playlists.lock().await;
                store
                    .get(user_id, &name)
                    .filter(|tracks| !tracks.is_empty())
                    .map(|tracks| embeds::create_playlist_embed(&name, tracks))
            };
            match embed {
                Some(embed) => reply_embed(ctx, command, embed).await,
                None => reply(ctx, command, "❌ Lista no encontrada o vacía", true).await,
            }
        }
        "play" => {
            let tracks: Vec<TrackDescriptor> = {
                let store = bot.playlists.lock().await;
                store
                    .get(user_id, &name)
                    .map(|saved| saved.iter().map(SavedTrack::to_track).collect())
                    .unwrap_or_default()
            };
            if tracks.is_empty() {
                return reply(ctx, command, "❌ Lista no encontrada o vacía", true).await;
            }

            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
                )
                .await?;

            if let Err(e) = bot.ensure_voice(ctx, guild_id, command.user.id).await {
                return edit_error(ctx, command, "Sin canal de voz", &e.to_string()).await;
            }

            let embed = enqueue_and_describe(bot, guild_id, tracks)?;
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
            Ok(())
        }
        "list" => {
            let names = bot.playlists.lock().await.user_playlists(user_id);
            if names.is_empty() {
                return reply(ctx, command, "❌ No tienes listas de reproducción", true).await;
            }
            reply_embed(ctx, command, embeds::create_user_playlists_embed(&names)).await
        }
        _ => reply(ctx, command, "❌ Subcomando no reconocido", true).await,
    }
}

// Funciones auxiliares

fn string_option<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

/// Posición base 1; un valor ausente o negativo se trata como 0 (inválido)
fn position_option(options: &[CommandDataOption], name: &str) -> usize {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
        .and_then(|value| usize::try_from(value).ok())
        .unwrap_or(0)
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

async fn reply(ctx: &Context, command: &CommandInteraction, content: &str, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn reply_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

async fn edit_error(ctx: &Context, command: &CommandInteraction, title: &str, description: &str) -> Result<()> {
    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(embeds::create_error_embed(title, description)),
        )
        .await?;
    Ok(())
}

pub async fn get_user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("¡Necesitas estar en un canal de voz!"))?;

    Ok(channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capitalizes_error_messages() {
        assert_eq!(capitalize("no hay nada reproduciéndose"), "No hay nada reproduciéndose");
        assert_eq!(capitalize("ñandú"), "Ñandú");
        assert_eq!(capitalize(""), "");
    }
}

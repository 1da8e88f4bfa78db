use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    builder::{
        CreateActionRow, CreateInteractionResponse, CreateInteractionResponseMessage,
        CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption, EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction, ComponentInteractionDataKind},
        id::{GuildId, UserId},
    },
    prelude::Context,
};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{handlers::enqueue_and_describe, GabiMusicBot, PendingSearch};
use crate::{audio::track::TrackDescriptor, ui::embeds};

pub const SELECTION_MENU_ID: &str = "track_selection";

/// Muestra los candidatos de búsqueda y guarda la selección pendiente
pub async fn present_candidates(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GabiMusicBot,
    guild_id: GuildId,
    query: &str,
    candidates: Vec<TrackDescriptor>,
) -> Result<()> {
    info!(
        "🔍 {} candidatos para {} en guild {}",
        candidates.len(),
        command.user.name,
        guild_id
    );

    let embed = embeds::create_search_results_embed(query, &candidates);
    let select_menu = create_track_selection_menu(&candidates);

    prune_expired(&bot.pending_searches, bot.config().selection_timeout);
    bot.pending_searches.insert(
        (guild_id, command.user.id),
        PendingSearch {
            results: candidates,
            created_at: Instant::now(),
        },
    );

    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new()
                .embed(embed)
                .components(vec![CreateActionRow::SelectMenu(select_menu)]),
        )
        .await?;

    Ok(())
}

/// Descarta búsquedas que nadie eligió a tiempo
fn prune_expired(pending: &DashMap<(GuildId, UserId), PendingSearch>, timeout: Duration) {
    let before = pending.len();
    pending.retain(|_, search| search.created_at.elapsed() <= timeout);

    let pruned = before.saturating_sub(pending.len());
    if pruned > 0 {
        debug!("🧹 {} búsquedas expiradas descartadas", pruned);
    }
}

/// Índice elegido en el menú (`track_{i}`)
pub fn selected_index(kind: &ComponentInteractionDataKind) -> Option<usize> {
    let ComponentInteractionDataKind::StringSelect { values } = kind else {
        return None;
    };
    values
        .first()?
        .strip_prefix("track_")?
        .parse()
        .ok()
}

/// Encola el candidato elegido por el usuario que hizo la búsqueda
pub async fn handle_track_selection(
    ctx: &Context,
    interaction: &ComponentInteraction,
    bot: &GabiMusicBot,
    guild_id: GuildId,
    index: Option<usize>,
) -> Result<()> {
    let pending = bot
        .pending_searches
        .remove(&(guild_id, interaction.user.id))
        .map(|(_, pending)| pending)
        .filter(|pending| pending.created_at.elapsed() <= bot.config().selection_timeout);

    let chosen = pending.zip(index).and_then(|(pending, i)| pending.results.into_iter().nth(i));

    let Some(track) = chosen else {
        interaction
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("⌛ La búsqueda expiró o no es tuya. Usa `/play` de nuevo.")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    info!("✅ Canción seleccionada por {}: {}", interaction.user.name, track);

    if let Err(e) = bot.ensure_voice(ctx, guild_id, interaction.user.id).await {
        interaction
            .create_response(
                &ctx.http,
                CreateInteractionResponse::UpdateMessage(
                    CreateInteractionResponseMessage::new()
                        .content(format!("❌ {}", e))
                        .embeds(Vec::new())
                        .components(Vec::new()),
                ),
            )
            .await?;
        return Ok(());
    }

    let embed = enqueue_and_describe(bot, guild_id, vec![track])?;
    interaction
        .create_response(
            &ctx.http,
            CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .components(Vec::new()),
            ),
        )
        .await?;

    Ok(())
}

/// Crea menú de selección para tracks
fn create_track_selection_menu(tracks: &[TrackDescriptor]) -> CreateSelectMenu {
    let options = tracks
        .iter()
        .enumerate()
        .map(|(i, track)| {
            CreateSelectMenuOption::new(option_label(track), format!("track_{}", i))
                .description(format!("YouTube • {}", embeds::format_duration(track.duration_seconds())))
        })
        .collect();

    CreateSelectMenu::new(SELECTION_MENU_ID, CreateSelectMenuKind::String { options })
        .placeholder("Selecciona una canción para reproducir...")
        .min_values(1)
        .max_values(1)
}

/// Etiqueta de opción, dentro del límite de 100 caracteres de Discord
fn option_label(track: &TrackDescriptor) -> String {
    let label = track.display_title();
    if label.chars().count() > 100 {
        format!("{}...", label.chars().take(97).collect::<String>())
    } else {
        label.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_selected_value() {
        let kind = ComponentInteractionDataKind::StringSelect {
            values: vec!["track_3".to_string()],
        };
        assert_eq!(selected_index(&kind), Some(3));

        let bad = ComponentInteractionDataKind::StringSelect {
            values: vec!["otro".to_string()],
        };
        assert_eq!(selected_index(&bad), None);
        assert_eq!(selected_index(&ComponentInteractionDataKind::Button), None);
    }

    #[test]
    fn expired_searches_are_pruned() {
        let pending = DashMap::new();
        let timeout = Duration::from_secs(30);
        let fresh = (GuildId::new(1), UserId::new(10));
        let stale = (GuildId::new(1), UserId::new(11));

        pending.insert(
            fresh,
            PendingSearch {
                results: Vec::new(),
                created_at: Instant::now(),
            },
        );
        pending.insert(
            stale,
            PendingSearch {
                results: Vec::new(),
                created_at: Instant::now() - Duration::from_secs(120),
            },
        );

        prune_expired(&pending, timeout);
        assert!(pending.contains_key(&fresh));
        assert!(!pending.contains_key(&stale));
    }

    #[test]
    fn long_titles_fit_the_menu() {
        let track = TrackDescriptor::new("https://youtu.be/x", "é".repeat(150), 10);
        let label = option_label(&track);
        assert_eq!(label.chars().count(), 100);
        assert!(label.ends_with("..."));
    }
}

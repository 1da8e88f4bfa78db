use chrono::Utc;
use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::audio::state::{PlayerSnapshot, PlayerStatus};
use crate::audio::track::TrackDescriptor;
use crate::storage::SavedTrack;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Gabi Music";

/// Límite de Discord para el valor de un campo
const FIELD_LIMIT: usize = 1024;

/// `m:ss`, o `h:mm:ss` a partir de una hora
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// `transcurrido/total` del track actual
pub fn progress(elapsed_seconds: u64, total_seconds: u64) -> String {
    let elapsed = if total_seconds > 0 {
        elapsed_seconds.min(total_seconds)
    } else {
        elapsed_seconds
    };
    format!("{}/{}", format_duration(elapsed), format_duration(total_seconds))
}

/// Corta el texto en el límite de un campo, sin partir caracteres
pub fn truncate_field(text: &str) -> String {
    if text.chars().count() <= FIELD_LIMIT {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(FIELD_LIMIT - 3).collect();
    truncated.push_str("...");
    truncated
}

/// Lista numerada de la cola
pub fn queue_lines(queue: &[TrackDescriptor]) -> String {
    queue
        .iter()
        .enumerate()
        .map(|(i, track)| {
            format!(
                "{}. {} [{}]",
                i + 1,
                track.display_title(),
                format_duration(track.duration_seconds())
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn now_playing_line(snapshot: &PlayerSnapshot) -> Option<String> {
    if let Some(current) = snapshot.current() {
        let elapsed = snapshot.state.elapsed(Utc::now()).as_secs();
        let paused = if snapshot.status == PlayerStatus::Paused {
            " ⏸️"
        } else {
            ""
        };
        return Some(format!(
            "{} [{}]{}",
            current.display_title(),
            progress(elapsed, current.duration_seconds()),
            paused
        ));
    }

    snapshot
        .preparing
        .as_ref()
        .map(|track| format!("⏳ Preparando: {}", track.display_title()))
}

/// Embed de `/queue`
pub fn create_queue_embed(snapshot: &PlayerSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.is_empty() {
        return embed
            .description("📪 La cola está vacía\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    if let Some(line) = now_playing_line(snapshot) {
        embed = embed.field("▶️ Reproduciendo ahora:", line, false);
    }

    if !snapshot.queue.is_empty() {
        embed = embed
            .field(
                "📋 Próximas canciones:",
                truncate_field(&queue_lines(&snapshot.queue)),
                false,
            )
            .footer(CreateEmbedFooter::new(format!(
                "{} canciones • {} en cola",
                snapshot.queue.len(),
                format_duration(snapshot.queued_duration())
            )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

/// Embed de confirmación al encolar
pub fn create_tracks_added_embed(tracks: &[TrackDescriptor], first_position: usize, dropped: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default().color(colors::SUCCESS_GREEN);

    embed = match tracks {
        [track] => embed
            .title("✅ Canción Agregada")
            .description(format!("**{}**", track.display_title()))
            .field("⏱️ Duración", format_duration(track.duration_seconds()), true)
            .field("📍 Posición", first_position.to_string(), true)
            .url(track.source_locator()),
        _ => embed
            .title("📋 Playlist Agregada")
            .description(format!("Se agregaron **{} canciones** a la cola", tracks.len()))
            .color(colors::MUSIC_PURPLE),
    };

    if dropped > 0 {
        embed = embed.field(
            "⚠️ Cola llena",
            format!("{} canciones no se agregaron", dropped),
            false,
        );
    }

    embed.footer(CreateEmbedFooter::new(
        "🎵 Se reproducirá automáticamente si no hay música sonando",
    ))
}

/// Embed con los candidatos de una búsqueda
pub fn create_search_results_embed(query: &str, results: &[TrackDescriptor]) -> CreateEmbed {
    let listing = results
        .iter()
        .enumerate()
        .map(|(i, track)| {
            format!(
                "**{}**. {} `[{}]`",
                i + 1,
                track.display_title(),
                format_duration(track.duration_seconds())
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    CreateEmbed::default()
        .title("🔍 Resultados de Búsqueda")
        .description(format!(
            "Búsqueda: **{}**\nSelecciona una canción del menú inferior:",
            query
        ))
        .field("Canciones Encontradas", truncate_field(&listing), false)
        .color(colors::INFO_BLUE)
}

/// Embed de `/playlist show`
pub fn create_playlist_embed(name: &str, tracks: &[SavedTrack]) -> CreateEmbed {
    let listing = tracks
        .iter()
        .enumerate()
        .map(|(i, track)| format!("{}. {}", i + 1, track.title))
        .collect::<Vec<_>>()
        .join("\n");

    CreateEmbed::default()
        .title(format!("📋 Lista: {}", name))
        .description(truncate_field(&listing))
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(format!("{} canciones", tracks.len())))
}

/// Embed de `/playlist list`
pub fn create_user_playlists_embed(names: &[String]) -> CreateEmbed {
    let listing = names
        .iter()
        .map(|name| format!("• {}", name))
        .collect::<Vec<_>>()
        .join("\n");

    CreateEmbed::default()
        .title("📚 Tus listas de reproducción")
        .description(truncate_field(&listing))
        .color(colors::MUSIC_PURPLE)
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
}

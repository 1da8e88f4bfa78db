use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        queue_command(),
        remove_command(),
        top_command(),
        shuffle_command(),
        join_command(),
        leave_command(),
        playlist_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o playlist")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

// Comandos de control

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Muestra la cola de reproducción")
}

fn position_option() -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición en la cola")
        .min_int_value(1)
        .required(true)
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita una canción de la cola")
        .add_option(position_option())
}

fn top_command() -> CreateCommand {
    CreateCommand::new("top")
        .description("Mueve una canción al principio de la cola")
        .add_option(position_option())
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla las canciones de la cola")
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot y limpia la cola")
}

// Playlists de usuario

fn name_option() -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::String, "name", "Nombre de la lista").required(true)
}

fn playlist_command() -> CreateCommand {
    CreateCommand::new("playlist")
        .description("Gestiona tus listas de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "create", "Crea una lista vacía")
                .add_sub_option(name_option()),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "add", "Añade una canción a una lista")
                .add_sub_option(name_option())
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "query",
                        "URL o término de búsqueda",
                    )
                    .required(true),
                ),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "remove", "Quita una canción de una lista")
                .add_sub_option(name_option())
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::Integer, "index", "Posición en la lista")
                        .min_int_value(1)
                        .required(true),
                ),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "show", "Muestra una lista")
                .add_sub_option(name_option()),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "play", "Encola una lista completa")
                .add_sub_option(name_option()),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "list",
            "Muestra tus listas",
        ))
}

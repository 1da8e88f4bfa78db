use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info};

use gabi_music::audio::GuildRegistry;
use gabi_music::bot::{notifier::ChannelNotifier, GabiMusicBot};
use gabi_music::config::Config;
use gabi_music::sources::{MediaResolver, YtDlpClient};
use gabi_music::storage::PlaylistStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gabi_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Gabi Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    let playlists = Arc::new(tokio::sync::Mutex::new(
        PlaylistStore::open(config.playlists_path()).await?,
    ));

    let resolver = Arc::new(MediaResolver::new(
        Arc::new(YtDlpClient::new()),
        config.lookup_options(),
    ));
    let notifier = Arc::new(ChannelNotifier::new(Arc::new(Http::new(&config.discord_token))));
    let registry = Arc::new(GuildRegistry::new(
        resolver,
        notifier,
        config.playback_options(),
    ));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES;

    let handler = GabiMusicBot::new(config.clone(), registry, playlists);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    let version = YtDlpClient::version(&config.lookup_options()).await?;
    info!("✅ yt-dlp {}", version);
    println!("OK");
    Ok(())
}

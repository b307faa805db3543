mod bot;
mod config;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use teloxide::types::BotCommand;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use bot::{
    Engine, PageScraper, Resolver, SessionMode, Sessions, TelegramClient, YoutubeApi, YtDlp,
    cleanup, query,
};
use config::Config;

struct BotState {
    config: Config,
    telegram: Arc<TelegramClient>,
    engine: Arc<Engine>,
    sessions: Arc<Sessions>,
    started_at: DateTime<Utc>,
}

impl BotState {
    fn new(config: Config, bot: &Bot) -> Self {
        let telegram = Arc::new(TelegramClient::new(bot.clone()));
        let ytdlp = Arc::new(YtDlp::new(
            config.ytdlp_bin.clone(),
            config.download_dir.clone(),
            config.fetch_timeout,
            config.download_timeout,
        ));
        let resolver = Resolver::new(ytdlp.clone(), PageScraper::new(config.fetch_timeout));
        let youtube_api = config.youtube_api_key.clone().map(YoutubeApi::new);

        let engine = Arc::new(Engine::new(
            telegram.clone(),
            ytdlp,
            resolver,
            youtube_api,
            config.scoring.clone(),
            config.max_playlist_tracks,
        ));

        Self {
            config,
            telegram,
            engine,
            sessions: Arc::new(Sessions::new()),
            started_at: Utc::now(),
        }
    }
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tunegrab.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("tunegrab.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🎵 Starting tunegrab...");
    info!("Loaded config from {config_path}");
    info!(
        "Auto-cleanup every {} minutes",
        config.cleanup_interval.as_secs() / 60
    );

    std::fs::create_dir_all(&config.download_dir).ok();
    // A job dir older than twice the download timeout cannot belong to
    // an in-flight request; everything younger is left alone.
    cleanup::spawn_sweeper(
        config.download_dir.clone(),
        config.cleanup_interval,
        config.download_timeout * 2,
    );

    let commands = vec![
        BotCommand::new("start", "🎉 Welcome & get started"),
        BotCommand::new("help", "📚 How to use the bot"),
        BotCommand::new("status", "🤖 Check bot status"),
        BotCommand::new("stop", "⏹️ Cancel the current download"),
        BotCommand::new("clean", "🧹 Clean temporary files"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("Failed to set commands: {e}");
    }

    let state = Arc::new(BotState::new(config, &bot));

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let text = text.trim();
    let chat_id = msg.chat.id.0;

    let username = msg
        .from
        .as_ref()
        .map(|u| u.username.as_deref().unwrap_or(&u.first_name))
        .unwrap_or("unknown");
    let preview: String = text.chars().take(100).collect();
    info!("Message from {username} ({chat_id}): \"{preview}\"");

    match text {
        "/start" => {
            say(
                &state,
                chat_id,
                "Hey there! 👋 I'm your music buddy! 🎵\n\n\
                 🎯 Commands:\n\
                 /help - 📚 Get help\n\
                 /status - 🤖 Bot status\n\
                 /stop - ⏹️ Cancel download\n\
                 /clean - 🧹 Clean temp files\n\n\
                 Send me music links or song names to download!",
            )
            .await;
        }
        "/help" => {
            say(
                &state,
                chat_id,
                "How to use me:\n\n\
                 🔗 Send music links from:\n\
                 • YouTube\n\
                 • Spotify\n\
                 • Apple Music\n\n\
                 🔍 Or just send song names like:\n\
                 \"Blinding Lights The Weeknd\"\n\n\
                 I'll find and download it for you! 🎵",
            )
            .await;
        }
        "/status" => {
            let active = state.sessions.active_count().await;
            let uptime_minutes = Utc::now()
                .signed_duration_since(state.started_at)
                .num_minutes();
            let cleanup_minutes = state.config.cleanup_interval.as_secs() / 60;
            say(
                &state,
                chat_id,
                &format!(
                    "🤖 Bot Status:\n\n\
                     ✅ Online and ready!\n\
                     📥 Active downloads: {active}\n\
                     🧹 Auto-cleanup: Every {cleanup_minutes} mins\n\
                     ⏱️ Up for {uptime_minutes} minutes"
                ),
            )
            .await;
        }
        "/clean" => {
            let removed = cleanup::sweep(
                &state.config.download_dir,
                state.config.download_timeout * 2,
            );
            say(&state, chat_id, &format!("Cleaned up {removed} temp files! 🧹")).await;
        }
        "/stop" => match state.sessions.cancel(chat_id).await {
            Some(SessionMode::Playlist) => {
                say(&state, chat_id, "Stopping after the current track... ⏹️").await;
            }
            Some(_) => {
                say(
                    &state,
                    chat_id,
                    "That download is already on its way and will finish on its own! 😌",
                )
                .await;
            }
            None => {
                say(&state, chat_id, "No download running! 🤷").await;
            }
        },
        t if t.starts_with("http://") || t.starts_with("https://") => {
            handle_url(&state, chat_id, t).await;
        }
        t if t.starts_with('/') => {
            say(&state, chat_id, "Unknown command! Use /help to see available commands 😊").await;
        }
        t if t.chars().count() > 3 => {
            handle_search(&state, chat_id, t).await;
        }
        _ => {
            say(&state, chat_id, "Send me a link or song name (at least 4 letters)! 🎵").await;
        }
    }

    Ok(())
}

async fn handle_url(state: &Arc<BotState>, chat_id: i64, url: &str) {
    let mode = if query::is_collection(url) {
        SessionMode::Playlist
    } else {
        SessionMode::Single
    };

    let Some(cancel) = state.sessions.begin(chat_id, mode).await else {
        say(state, chat_id, "Hold on, I'm still working on your last request! Use /stop to cancel it.").await;
        return;
    };

    let state = state.clone();
    let url = url.to_string();
    tokio::spawn(async move {
        match mode {
            SessionMode::Playlist => state.engine.run_playlist(chat_id, &url, cancel).await,
            _ => state.engine.run_single(chat_id, &url).await,
        }
        state.sessions.finish(chat_id).await;
    });
}

async fn handle_search(state: &Arc<BotState>, chat_id: i64, text: &str) {
    let Some(_cancel) = state.sessions.begin(chat_id, SessionMode::Search).await else {
        say(state, chat_id, "Hold on, I'm still working on your last request! Use /stop to cancel it.").await;
        return;
    };

    let state = state.clone();
    let text = text.to_string();
    tokio::spawn(async move {
        state.engine.run_search(chat_id, &text).await;
        state.sessions.finish(chat_id).await;
    });
}

async fn say(state: &Arc<BotState>, chat_id: i64, text: &str) {
    let _ = state.telegram.send_text(chat_id, text).await;
}

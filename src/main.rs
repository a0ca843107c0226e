use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};
use tubegrab_bot::bot::handlers::{get_user_id_safe, get_user_name, is_link_candidate, Command};
use tubegrab_bot::bot::views::{DefaultMenuView, MenuView};
use tubegrab_bot::bot::{self, MenuSessions, UnauthorizedCache};
use tubegrab_bot::config::{
    get_unauthorized_cache_max_size, get_unauthorized_cache_ttl, get_unauthorized_cooldown,
    Settings, STALE_DOWNLOAD_AGE_SECS,
};
use tubegrab_bot::download::{tools, DownloadService, YtDlp};
use tubegrab_bot::logging::{init_logging, RedactionPatterns};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Redaction must exist before the first log line
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);
    init_logging(patterns);

    info!("Starting Tubegrab bot...");

    let settings = init_settings();

    if let Err(e) = tools::ensure_ytdlp(&settings).await {
        error!("{e}");
        std::process::exit(1);
    }
    tools::ensure_ffmpeg(&settings).await;

    let service = init_download_service(&settings).await;
    let sessions = MenuSessions::new(settings.menu_ttl());
    let unauthorized_cache = init_unauthorized_cache();

    let bot = init_bot(&settings);
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {e}");
    }

    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![settings, service, sessions, unauthorized_cache])
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            if s.allowed_users().is_none() {
                info!("No allow-list configured; the bot answers everyone.");
            }
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_bot(settings: &Settings) -> Bot {
    // The default 17s client timeout would cut off large uploads
    match teloxide::net::default_reqwest_settings()
        .timeout(settings.upload_timeout())
        .build()
    {
        Ok(client) => {
            info!(
                "Bot client ready (timeout: {}s)",
                settings.upload_timeout_secs
            );
            Bot::with_client(settings.telegram_token.clone(), client)
        }
        Err(e) => {
            error!("Failed to build the HTTP client: {e}");
            std::process::exit(1);
        }
    }
}

async fn init_download_service(settings: &Settings) -> Arc<DownloadService> {
    let downloader = Arc::new(YtDlp::from_settings(settings));
    let service = DownloadService::new(downloader, settings);

    match service
        .purge_stale(Duration::from_secs(STALE_DOWNLOAD_AGE_SECS))
        .await
    {
        Ok(0) => {}
        Ok(n) => info!("Removed {n} stale files from {}", service.downloads_dir().display()),
        Err(e) => warn!("Failed to clean {}: {e}", service.downloads_dir().display()),
    }

    info!(
        "Download service ready (dir: {}, slots: {})",
        service.downloads_dir().display(),
        service.available_slots()
    );
    Arc::new(service)
}

fn init_unauthorized_cache() -> Arc<UnauthorizedCache> {
    let cooldown = get_unauthorized_cooldown();
    let ttl = get_unauthorized_cache_ttl();
    let max_size = get_unauthorized_cache_max_size();

    info!(
        "Initializing UnauthorizedCache (cooldown: {}s, ttl: {}s, max_size: {})",
        cooldown, ttl, max_size
    );

    Arc::new(UnauthorizedCache::new(cooldown, ttl, max_size))
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            Update::filter_callback_query()
                .branch(
                    dptree::filter(|q: CallbackQuery, settings: Arc<Settings>| {
                        settings.is_allowed(q.from.id.0.cast_signed())
                    })
                    .endpoint(handle_callback),
                )
                .branch(dptree::endpoint(handle_unauthorized_callback)),
        )
        .branch(
            Update::filter_message().branch(
                dptree::filter(|msg: Message, settings: Arc<Settings>| {
                    settings.is_allowed(get_user_id_safe(&msg))
                })
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter(|msg: Message| msg.text().is_some_and(is_link_candidate))
                        .endpoint(handle_text),
                ),
            ),
        )
        .branch(
            // Everyone not matched above is unauthorized
            Update::filter_message()
                .filter(|msg: Message, settings: Arc<Settings>| {
                    !settings.is_allowed(get_user_id_safe(&msg))
                })
                .endpoint(handle_unauthorized),
        )
}

async fn handle_unauthorized(
    bot: Bot,
    msg: Message,
    cache: Arc<UnauthorizedCache>,
) -> Result<(), teloxide::RequestError> {
    let user_id = get_user_id_safe(&msg);
    let user_name = get_user_name(msg.from.as_ref());

    if cache.should_send(user_id, &user_name).await {
        info!(
            "⛔️ Unauthorized access from user {} ({}). Sending denial message.",
            user_id, user_name
        );

        if let Err(e) = bot
            .send_message(msg.chat.id, DefaultMenuView::access_denied())
            .await
        {
            error!("Failed to send access denied message to {}: {}", user_id, e);
        } else {
            cache.mark_sent(user_id).await;
        }
    }

    respond(())
}

async fn handle_unauthorized_callback(
    bot: Bot,
    q: CallbackQuery,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        error!("Failed to answer unauthorized callback: {}", e);
    }
    respond(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => bot::handlers::start(bot, msg).await,
        Command::Help => bot::handlers::help(bot, msg).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_text(
    bot: Bot,
    msg: Message,
    sessions: MenuSessions,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_text(bot, msg, sessions).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    sessions: MenuSessions,
    service: Arc<DownloadService>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_callback(bot, q, sessions, service).await {
        error!("Callback handler error: {}", e);
    }
    respond(())
}

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use meld_mm::bot::{request_shutdown, Bot};
use meld_mm::Settings;

fn init_tracing(settings: &Settings) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));
    let file_appender = tracing_appender::rolling::never(".", "orders.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();
    guard
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let settings = Settings::from_env();
    let _log_guard = init_tracing(&settings);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.max_num_threads)
        .enable_all()
        .build()?;
    runtime.block_on(run(settings))
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let bot_id = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("BOT_ID").ok())
        .unwrap_or_else(|| "5".to_string());
    let profiles_path = std::env::var("MM_BOT_PROFILES")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/bot_profiles.yaml"));
    let venues_dir = std::env::var("MM_VENUE_SETTINGS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));

    let bot = Bot::from_profile(&bot_id, &profiles_path, &venues_dir, &settings)?;

    let handles = bot.shutdown_handles();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping exchanges after the current interval");
            request_shutdown(&handles);
        }
    });

    bot.run().await
}

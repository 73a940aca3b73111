// src/main.rs
use chrono::Utc;
use clap::Parser;
use dot_stage_tracker::config::Settings;
use dot_stage_tracker::notifications::{Notifier, TelegramNotifier};
use dot_stage_tracker::pattern_driver::PatternDriver;
use dot_stage_tracker::scheduler::PollingService;
use dot_stage_tracker::store::{
    IndicatorStore, InfluxIndicatorStore, ProgressStore, RedisProgressStore, TradeEventStore,
};
use reqwest::Client as HttpClient;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "dot-stage-tracker")]
#[command(about = "Tracks the big green dot -> red dot -> green dot sequence per ticker and timeframe")]
struct Args {
    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// dotenv file loaded before reading the environment
    #[arg(long, env = "ENV_FILE", default_value = "./config/.env")]
    env_file: String,

    /// Send a Telegram test message and exit
    #[arg(long)]
    test_notification: bool,
}

// Console, daily rolling file and a per-session file.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = tracing_appender::rolling::daily("logs", "dot_stage_tracker");

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let session_log_path = format!("logs/dot_stage_tracker_{}.log", timestamp);
    let session_file = std::fs::File::create(&session_log_path)?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stdout).with_target(false).compact())
        .with(fmt::layer().with_writer(file_appender).with_target(true).with_ansi(false))
        .with(fmt::layer().with_writer(session_file).with_target(true).with_ansi(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()?;

    info!("📋 Logging initialized, session log: {}", session_log_path);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let dotenv_result = dotenv::from_path(&args.env_file);

    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize file logging: {}", e);
        let _ = tracing_subscriber::fmt().with_target(false).try_init();
    }
    if let Err(e) = dotenv_result {
        warn!("Could not load {}: {}", args.env_file, e);
    }

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration error: {}", e);
            return Err(e.into());
        }
    };

    match &settings.version {
        Some(version) => info!("🚀 dot_stage_tracker version: {}", version),
        None => warn!("VERSION is not set in the environment"),
    }

    let telegram = Arc::new(TelegramNotifier::from_env());
    if args.test_notification {
        telegram.send_test_message().await?;
        return Ok(());
    }

    info!("⚙️  Configuration:");
    info!("   ⏱️  Interval: {} minute(s)", settings.schedule_interval_mins);
    info!("   📄 Tickers: {}", settings.tickers_file);
    info!("   📄 Dot tickers: {}", settings.dot_tickers_file);
    info!("   📈 Indicators: {}/{}", settings.influx.bucket, settings.influx.measurement);
    info!("   📱 Telegram enabled: {}", telegram.is_enabled());
    info!(
        "   🎯 Thresholds: red dot >= {}, green dot <= {}",
        settings.thresholds.red_dot_min, settings.thresholds.green_dot_max
    );

    let indicators: Arc<dyn IndicatorStore> = Arc::new(InfluxIndicatorStore::new(
        HttpClient::new(),
        settings.influx.clone(),
    ));
    let redis_store = Arc::new(RedisProgressStore::connect(&settings.redis_url).await?);
    let progress: Arc<dyn ProgressStore> = redis_store.clone();
    let trade_events: Arc<dyn TradeEventStore> = redis_store;
    let notifier: Arc<dyn Notifier> = telegram;

    let driver = PatternDriver::new(
        Arc::clone(&indicators),
        Arc::clone(&progress),
        trade_events,
        notifier,
        settings.thresholds,
    );
    let interval_mins = if args.once { 0 } else { settings.schedule_interval_mins };
    let service = PollingService::new(
        driver,
        indicators,
        progress,
        settings.tickers_file.clone(),
        settings.dot_tickers_file.clone(),
        interval_mins,
    );

    service
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("👋 dot_stage_tracker stopped");
    Ok(())
}

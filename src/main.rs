//! PostPilot entry point — config, database, runner, and the Telegram
//! routing loop.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use postpilot_channels::{TelegramChannel, TelegramConfig};
use postpilot_core::PostPilotConfig;
use postpilot_engine::{LeadIntake, PostingDispatcher, SessionStore, spawn_runner};
use postpilot_store::{
    AdminRegistry, Authorizer, ContentStore, Database, LeadStore, ScheduleStore, SettingsStore,
    UserDirectory,
};

#[derive(Parser)]
#[command(name = "postpilot", about = "Scheduled channel posting and lead capture")]
struct Cli {
    /// Config file path (defaults to ~/.postpilot/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the database path from the config
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PostPilotConfig::load_from(path)?,
        None => PostPilotConfig::load()?,
    };
    config.validate().context("invalid configuration")?;

    let db_path = cli
        .db
        .unwrap_or_else(|| PathBuf::from(&config.database_path));
    let db = Database::open(&db_path)?;

    let settings = SettingsStore::new(db.clone());
    let schedules = ScheduleStore::new(db.clone());
    let content = ContentStore::new(db.clone());
    let leads = LeadStore::new(db.clone());
    let users = UserDirectory::new(db.clone());
    let authorizer = Authorizer::new(&config.owner_ids, AdminRegistry::new(db.clone()));

    let channel = TelegramChannel::new(TelegramConfig {
        bot_token: config.bot_token.clone(),
        poll_interval: 1,
    });
    let me = channel.get_me().await.context("Telegram token check")?;
    tracing::info!(
        "Bot online: @{}",
        me.username.as_deref().unwrap_or("unknown")
    );

    let publisher: Arc<TelegramChannel> = Arc::new(channel.clone());
    let dispatcher = Arc::new(PostingDispatcher::new(
        settings.clone(),
        schedules.clone(),
        content.clone(),
        publisher.clone(),
    ));
    let intake = LeadIntake::new(
        users,
        leads.clone(),
        settings.clone(),
        publisher.clone(),
        &config.leads,
    );

    let _runner = spawn_runner(
        schedules.clone(),
        dispatcher.clone(),
        config.scheduler.tick_secs,
    );

    let ctx = commands::Context {
        settings,
        schedules,
        content,
        leads,
        registry: AdminRegistry::new(db),
        authorizer,
        dispatcher,
        publisher,
        intake,
        lead_sources: SessionStore::default(),
        pending_flows: SessionStore::default(),
    };

    let mut updates = channel.start_polling();
    while let Some(msg) = updates.recv().await {
        if let Err(e) = commands::route_message(&ctx, &msg).await {
            tracing::error!("Message handling failed: {e}");
        }
    }

    Ok(())
}

use clap::Parser;
use checkers_bot::adapters::SyncGatewayClient;
use checkers_bot::cli::Cli;
use checkers_bot::config::AppConfig;
use checkers_bot::controller::GameLoopController;
use checkers_bot::coordination::install_signal_handlers;
use anyhow::{Context, Result};
use checkers_bot::services::{UserRecordSynchronizer, VoteSubmitter};
use checkers_bot::store::{ChangeFeed, DocumentStore};
use checkers_bot::strategy::GameLimitObserver;
use std::sync::Arc;
use tracing::{error, info};

mod main_runtime;

use main_runtime::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match AppConfig::load_from(&cli.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };
    cli.apply(&mut config);

    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Invalid configuration: {}", e);
        }
        eprintln!("Usage: checkers-bot --team RED|BLUE [--sync-gateway-url URL] [--feed longpoll|normal]");
        std::process::exit(2);
    }

    init_logging(&config.logging);

    if let Err(e) = run(config).await {
        error!(error = %format!("{:#}", e), "Bot stopped on fatal error");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<()> {
    let team = config.team()?;
    info!(
        team = %team,
        url = %config.store.url,
        feed = %config.feed.mode,
        thinker = ?config.bot.thinker,
        "Starting checkers bot"
    );

    let gateway = Arc::new(
        SyncGatewayClient::new(&config.store.url, config.request_timeout())
            .context("failed to build Sync Gateway client")?,
    );
    let store: Arc<dyn DocumentStore> = gateway.clone();
    let feed: Arc<dyn ChangeFeed> = gateway;

    let user_sync = Arc::new(
        UserRecordSynchronizer::register(store.clone(), team, config.user.max_sync_attempts)
            .await
            .context("failed to register participant record")?,
    );
    let submitter = Arc::new(VoteSubmitter::new(
        store.clone(),
        user_sync.participant_id(),
        config.vote_submitter_config(),
    ));

    let mut controller = GameLoopController::new(
        config.controller_config(team),
        store,
        config.bot.thinker.build(),
        submitter,
        user_sync,
    );
    if let Some(max_games) = config.bot.max_games {
        controller = controller.with_observer(Arc::new(GameLimitObserver::new(max_games)));
    }

    let shutdown = controller.shutdown_handle();
    let signals = install_signal_handlers(shutdown.clone());

    let result = controller.start(feed, config.feed_settings()).await;
    signals.abort();

    let stats = result.context("game loop failed")?;
    info!(
        reason = ?shutdown.reason(),
        batches = stats.batches,
        decisions = stats.decisions,
        votes = stats.votes,
        "Checkers bot stopped"
    );
    Ok(())
}

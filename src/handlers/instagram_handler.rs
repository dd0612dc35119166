//! handlers/instagram_handler.rs

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::app_config::AppConfig;
use crate::handlers::browser_handler::{run_sharded, BrowserChannel, ShardedRun};
use crate::models::identity_model::IdentityKind;
use crate::models::outcome_model::RunSummary;
use crate::services::csv_source_service::UsernameFileSource;
use crate::services::ledger_service::{DeliveryLedger, SharedLedger};

pub async fn send_instagram(config: &AppConfig, quiet: bool) -> Result<RunSummary> {
    let ledger = SharedLedger::new(DeliveryLedger::load(
        &config.instagram.messaged_file,
        IdentityKind::Handle,
    ));
    let source = UsernameFileSource::new(&config.instagram.usernames_file, &config.instagram.message);
    let run = ShardedRun {
        channel: BrowserChannel::Instagram,
        browser: config.browser.clone(),
        cooldown: config.instagram.cooldown,
        prune_after_send: config.instagram.prune_after_send,
        quiet,
    };
    run_sharded(run, Arc::new(source), ledger)
        .await
        .context("Error en la corrida de Instagram")
}

//! handlers/whatsapp_handler.rs

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::app_config::AppConfig;
use crate::handlers::browser_handler::{run_sharded, BrowserChannel, ShardedRun};
use crate::models::identity_model::IdentityKind;
use crate::models::outcome_model::RunSummary;
use crate::services::csv_source_service::CsvFolderSource;
use crate::services::ledger_service::{DeliveryLedger, SharedLedger};
use crate::services::source_service::TargetSource;

fn contacts_source(config: &AppConfig) -> CsvFolderSource {
    CsvFolderSource::new(
        &config.whatsapp.csv_folder,
        &config.whatsapp.phone_column,
        &config.whatsapp.message,
    )
}

/// Envía el mensaje configurado a todos los contactos de la carpeta de CSV
pub async fn send_whatsapp(config: &AppConfig, quiet: bool) -> Result<RunSummary> {
    let ledger = SharedLedger::new(DeliveryLedger::load(
        &config.whatsapp.contacted_file,
        IdentityKind::Phone,
    ));
    let run = ShardedRun {
        channel: BrowserChannel::WhatsApp,
        browser: config.browser.clone(),
        cooldown: config.whatsapp.cooldown,
        prune_after_send: config.whatsapp.prune_after_send,
        quiet,
    };
    run_sharded(run, Arc::new(contacts_source(config)), ledger)
        .await
        .context("Error en la corrida de WhatsApp")
}

/// Quita de los CSV de origen todos los números que ya están en el ledger
pub async fn cleanup_contacted(config: &AppConfig) -> Result<usize> {
    let ledger = DeliveryLedger::load(&config.whatsapp.contacted_file, IdentityKind::Phone);
    if ledger.is_empty() {
        log::info!("(cleanup_contacted) No hay números contactados para quitar");
        return Ok(0);
    }
    let contacted: Vec<String> = ledger.entries().cloned().collect();
    log::info!(
        "(cleanup_contacted) Quitando {} números contactados de {}",
        contacted.len(),
        config.whatsapp.csv_folder.display()
    );
    contacts_source(config)
        .prune_delivered(&contacted)
        .await
        .context("Error limpiando los CSV de origen")
}

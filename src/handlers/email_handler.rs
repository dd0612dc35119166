//! handlers/email_handler.rs
//! Envío de correos y guardado de borradores desde hojas de Google Sheets.
//! Todo es secuencial: una hoja, una fila, un canal a la vez.

use anyhow::{bail, Result};

use crate::config::app_config::AppConfig;
use crate::models::channel_model::OutgoingMessage;
use crate::models::identity_model::IdentityKind;
use crate::models::outcome_model::{FilterReason, RunSummary};
use crate::services::batch_service::{filter_reason, BatchDriver};
use crate::services::email_service::EmailService;
use crate::services::ledger_service::{DeliveryLedger, SharedLedger};
use crate::services::sheets_service::{
    extract_sheet_id, SheetsService, WorksheetSource, REQUIRED_SEND_COLUMNS,
};
use crate::services::source_service::TargetSource;

fn require_credentials(config: &AppConfig, sheets: &SheetsService) -> Result<()> {
    if !config.email.has_credentials() {
        bail!("EMAIL_ADDRESS and EMAIL_PASSWORD must be set");
    }
    if !sheets.has_credentials() {
        bail!("GOOGLE_SHEETS_ACCESS_TOKEN must be set");
    }
    Ok(())
}

/// Hojas válidas de todos los documentos; las inválidas quedan en el resumen
async fn open_worksheets(
    sheets: &SheetsService,
    urls: &[String],
    summary: &mut RunSummary,
) -> Vec<WorksheetSource> {
    let mut sources = Vec::new();
    for (i, url) in urls.iter().enumerate() {
        let spreadsheet_id = extract_sheet_id(url);
        log::info!(
            "(open_worksheets) Documento {}/{}: {}",
            i + 1,
            urls.len(),
            spreadsheet_id
        );
        match sheets
            .load_worksheets(&spreadsheet_id, &REQUIRED_SEND_COLUMNS)
            .await
        {
            Ok(loaded) => {
                for (title, result) in loaded {
                    match result {
                        Ok(ws) => sources.push(WorksheetSource::new(sheets.clone(), ws)),
                        Err(e) => summary.add_error(&title, e),
                    }
                }
            }
            Err(e) => {
                log::error!(
                    "(open_worksheets) No se pudo abrir {}: {}. Verifique el ID y los permisos",
                    spreadsheet_id,
                    e
                );
                summary.add_error(&spreadsheet_id, e);
            }
        }
    }
    sources
}

pub async fn send_emails(config: &AppConfig, urls: &[String]) -> Result<RunSummary> {
    let sheets = SheetsService::new(config.sheets.clone());
    let mut summary = RunSummary::default();
    if let Err(e) = require_credentials(config, &sheets) {
        log::error!("(send_emails) {}", e);
        summary.add_error("config", e);
        return Ok(summary);
    }

    let email_service = EmailService::new(config.email.clone());
    let ledger = SharedLedger::new(DeliveryLedger::load(
        &config.email.ledger_file,
        IdentityKind::Email,
    ));
    let configs = email_service.settings().channel_configs();

    for source in open_worksheets(&sheets, urls, &mut summary).await {
        // Hoja protegida: no se envía nada que luego no se pueda marcar
        match source.probe_write_access().await {
            Ok(()) => {}
            Err(e) if e.halts_batch() => {
                log::error!(
                    "(send_emails) CRITICAL: '{}' no permite marcar enviados: {}",
                    source.name(),
                    e
                );
                summary.add_error(source.name(), e);
                continue;
            }
            Err(e) => log::warn!(
                "(send_emails) No se pudo verificar permisos de '{}': {}",
                source.name(),
                e
            ),
        }

        let driver = BatchDriver::new(
            &email_service,
            ledger.clone(),
            configs.clone(),
            config.email.send_delay,
        )
        .with_label(source.name());
        match driver.run(&source).await {
            Ok(report) => summary.add_report(&report),
            Err(e) => summary.add_error(source.name(), e),
        }
    }
    Ok(summary)
}

/// Guarda borradores en el buzón. No toca el ledger ni la columna de enviado.
pub async fn save_drafts(config: &AppConfig, urls: &[String]) -> Result<RunSummary> {
    let sheets = SheetsService::new(config.sheets.clone());
    let mut summary = RunSummary::default();
    if let Err(e) = require_credentials(config, &sheets) {
        log::error!("(save_drafts) {}", e);
        summary.add_error("config", e);
        return Ok(summary);
    }
    let email_service = EmailService::new(config.email.clone());

    for source in open_worksheets(&sheets, urls, &mut summary).await {
        let targets = match source.list_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                summary.add_error(source.name(), e);
                continue;
            }
        };

        for target in targets {
            let counters = &mut summary.counters;
            counters.total += 1;
            if target.approval.is_approved() {
                counters.approved += 1;
            } else {
                counters.not_approved += 1;
            }
            if let Some(reason) = filter_reason(&target) {
                counters.filtered += 1;
                if let FilterReason::MissingFields(_) = reason {
                    counters.missing_fields += 1;
                }
                continue;
            }

            let recipient = match IdentityKind::Email.normalize(&target.identity) {
                Ok(key) => key,
                Err(e) => {
                    log::warn!("(save_drafts) Fila {}: {}", target.row_ref, e);
                    counters.failed_permanent += 1;
                    continue;
                }
            };
            let message = OutgoingMessage {
                recipient,
                recipient_name: target.name.clone(),
                subject: target.subject.clone(),
                body: target.body.clone(),
            };
            match email_service.save_draft(&message).await {
                Ok(folder) => {
                    log::info!(
                        "(save_drafts) Borrador para {} guardado en '{}'",
                        message.recipient,
                        folder
                    );
                    summary.counters.delivered += 1;
                }
                Err(e) => {
                    log::error!("(save_drafts) Fila {}: {}", target.row_ref, e);
                    let counters = &mut summary.counters;
                    if e.is_channel_failure() {
                        counters.failed_transient += 1;
                    } else {
                        counters.failed_permanent += 1;
                    }
                }
            }
        }
    }
    Ok(summary)
}

//! services/batch_service.rs
//! Driver de una corrida: filtra, entrega, registra en ledger y fuente, cuenta.

use std::time::Duration;

use indicatif::ProgressBar;
use uuid::Uuid;

use crate::error::{OutreachError, OutreachResult};
use crate::models::channel_model::{ChannelConfig, OutgoingMessage};
use crate::models::outcome_model::{FilterReason, RunReport, TargetOutcome, TargetRecord};
use crate::models::target_model::Target;
use crate::services::delivery_service::{attempt_delivery, DeliveryOutcome, MessageTransport};
use crate::services::ledger_service::{ClaimResult, SharedLedger};
use crate::services::source_service::TargetSource;

pub struct BatchDriver<'a, T: MessageTransport + ?Sized> {
    transport: &'a T,
    ledger: SharedLedger,
    configs: Vec<ChannelConfig>,
    cooldown: Duration,
    label: String,
    progress: Option<ProgressBar>,
}

impl<'a, T: MessageTransport + ?Sized> BatchDriver<'a, T> {
    pub fn new(
        transport: &'a T,
        ledger: SharedLedger,
        configs: Vec<ChannelConfig>,
        cooldown: Duration,
    ) -> Self {
        Self {
            transport,
            ledger,
            configs,
            cooldown,
            label: transport.name().to_string(),
            progress: None,
        }
    }

    /// Prefijo de los logs, p.ej. "Profile: one"
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Lee la fuente completa y la procesa
    pub async fn run(&self, source: &dyn TargetSource) -> OutreachResult<RunReport> {
        let targets = source.list_targets().await?;
        log::info!(
            "(run_batch) [{}] {} filas leídas de '{}'",
            self.label,
            targets.len(),
            source.name()
        );
        Ok(self.run_targets(source, targets).await)
    }

    /// Procesa una lista ya cargada (p.ej. el shard de un worker)
    pub async fn run_targets(&self, source: &dyn TargetSource, targets: Vec<Target>) -> RunReport {
        let mut report = RunReport {
            run_id: Uuid::new_v4().to_string(),
            source: source.name().to_string(),
            ..Default::default()
        };

        if let Some(progress) = &self.progress {
            progress.set_length(targets.len() as u64);
        }

        for target in targets {
            let counters = &mut report.counters;
            counters.total += 1;
            if target.approval.is_approved() {
                counters.approved += 1;
            } else {
                counters.not_approved += 1;
            }

            let (outcome, halt) = self.process_target(source, &target).await;

            match &outcome {
                TargetOutcome::FilteredOut(reasons) => {
                    counters.filtered += 1;
                    if reasons
                        .iter()
                        .any(|r| matches!(r, FilterReason::MissingFields(_)))
                    {
                        counters.missing_fields += 1;
                    }
                }
                TargetOutcome::Sent { .. } => counters.delivered += 1,
                TargetOutcome::FailedTransient { .. } => counters.failed_transient += 1,
                TargetOutcome::FailedPermanent { .. } => counters.failed_permanent += 1,
            }

            let sent = outcome.is_sent();
            report.records.push(TargetRecord {
                row_ref: target.row_ref.clone(),
                identity: target.identity.clone(),
                outcome,
            });
            if let Some(progress) = &self.progress {
                progress.inc(1);
            }

            if let Some(err) = halt {
                log::error!(
                    "(run_batch) [{}] Deteniendo '{}' para evitar envíos duplicados: {}",
                    self.label,
                    source.name(),
                    err
                );
                report.halted = Some(err);
                break;
            }

            // Rate limiting fijo contra el servicio externo
            if sent && !self.cooldown.is_zero() {
                tokio::time::sleep(self.cooldown).await;
            }
        }

        if let Some(progress) = &self.progress {
            progress.finish();
        }
        log::info!(
            "(run_batch) [{}] '{}' terminado: {:?}",
            self.label,
            source.name(),
            report.counters
        );
        report
    }

    async fn process_target(
        &self,
        source: &dyn TargetSource,
        target: &Target,
    ) -> (TargetOutcome, Option<OutreachError>) {
        // 1) Filtro por estado, flag de enviado y campos obligatorios
        if let Some(reason) = filter_reason(target) {
            if let FilterReason::MissingFields(_) = reason {
                log::info!(
                    "(run_batch) [{}] Saltando fila {}: {}",
                    self.label,
                    target.row_ref,
                    reason
                );
            }
            return (TargetOutcome::FilteredOut(vec![reason]), None);
        }

        // 2) Identidad canónica (inválida => permanente)
        let key = match target.kind.normalize(&target.identity) {
            Ok(key) => key,
            Err(error) => {
                log::warn!(
                    "(run_batch) [{}] Fila {}: {}",
                    self.label,
                    target.row_ref,
                    error
                );
                return (TargetOutcome::FailedPermanent { error }, None);
            }
        };

        // 3) Ledger: check + reserva atómicos
        let claim = match self.ledger.try_claim(&key) {
            ClaimResult::Claimed(claim) => claim,
            ClaimResult::AlreadyContacted | ClaimResult::InFlight => {
                log::info!(
                    "(run_batch) [{}] Saltando {} - ya contactado",
                    self.label,
                    target.identity
                );
                return (
                    TargetOutcome::FilteredOut(vec![FilterReason::AlreadyContacted]),
                    None,
                );
            }
        };

        // 4) Entrega con configuraciones alternativas
        let message = OutgoingMessage {
            recipient: key,
            recipient_name: target.name.clone(),
            subject: target.subject.clone(),
            body: target.body.clone(),
        };

        match attempt_delivery(self.transport, &message, &self.configs).await {
            DeliveryOutcome::Delivered { channel, .. } => {
                if let Err(e) = claim.commit() {
                    log::error!(
                        "(run_batch) [{}] Enviado a {} pero no se pudo registrar en el ledger: {}",
                        self.label,
                        message.recipient,
                        e
                    );
                }

                let halt = match source.mark_sent(target).await {
                    Ok(()) => None,
                    Err(e) if e.halts_batch() => Some(e),
                    Err(e) => {
                        log::warn!(
                            "(run_batch) [{}] No se pudo marcar la fila {} como enviada: {}",
                            self.label,
                            target.row_ref,
                            e
                        );
                        None
                    }
                };
                (TargetOutcome::Sent { channel }, halt)
            }
            DeliveryOutcome::Exhausted {
                last_error,
                attempts,
            } => (
                TargetOutcome::FailedTransient {
                    error: last_error,
                    attempts,
                },
                None,
            ),
            DeliveryOutcome::Unreachable { error } => {
                (TargetOutcome::FailedPermanent { error }, None)
            }
        }
    }
}

/// Primera razón por la que la fila no se envía, en el orden:
/// no aprobada, ya enviada, campos vacíos.
pub fn filter_reason(target: &Target) -> Option<FilterReason> {
    if !target.approval.is_approved() {
        return Some(FilterReason::NotApproved);
    }
    if target.sent {
        return Some(FilterReason::AlreadySent);
    }
    let missing = target.missing_fields();
    if !missing.is_empty() {
        return Some(FilterReason::MissingFields(missing));
    }
    None
}

//! models/outcome_model.rs
//! Resultados por destinatario y contadores de la corrida.

use std::fmt;

use serde::Serialize;

use crate::error::OutreachError;
use crate::models::channel_model::ChannelConfig;
use crate::models::target_model::RowRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterReason {
    NotApproved,
    AlreadySent,
    /// La identidad normalizada ya está en el ledger (o en vuelo en otro shard)
    AlreadyContacted,
    MissingFields(Vec<String>),
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterReason::NotApproved => write!(f, "Not approved"),
            FilterReason::AlreadySent => write!(f, "Already sent"),
            FilterReason::AlreadyContacted => write!(f, "already contacted"),
            FilterReason::MissingFields(fields) => write!(f, "Missing {}", fields.join(", ")),
        }
    }
}

/// Estados terminales de un destinatario:
/// PENDING -> {FILTERED_OUT, SENT, FAILED_TRANSIENT, FAILED_PERMANENT}
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    FilteredOut(Vec<FilterReason>),
    Sent { channel: ChannelConfig },
    FailedTransient { error: OutreachError, attempts: usize },
    FailedPermanent { error: OutreachError },
}

impl TargetOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, TargetOutcome::Sent { .. })
    }
}

#[derive(Debug, Clone)]
pub struct TargetRecord {
    pub row_ref: RowRef,
    pub identity: String,
    pub outcome: TargetOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub total: usize,
    pub approved: usize,
    pub not_approved: usize,
    pub delivered: usize,
    pub filtered: usize,
    /// Aprobadas pero con campos vacíos
    pub missing_fields: usize,
    pub failed_transient: usize,
    pub failed_permanent: usize,
}

impl RunCounters {
    pub fn merge(&mut self, other: &RunCounters) {
        self.total += other.total;
        self.approved += other.approved;
        self.not_approved += other.not_approved;
        self.delivered += other.delivered;
        self.filtered += other.filtered;
        self.missing_fields += other.missing_fields;
        self.failed_transient += other.failed_transient;
        self.failed_permanent += other.failed_permanent;
    }

    pub fn zero_sent_reason(&self) -> Option<ZeroSentReason> {
        if self.delivered > 0 {
            return None;
        }
        let reason = if self.total == 0 {
            ZeroSentReason::NoData
        } else if self.approved == 0 {
            ZeroSentReason::NoApprovedRows
        } else if self.failed_transient + self.failed_permanent > 0 {
            ZeroSentReason::AllFailed
        } else if self.missing_fields == self.approved {
            ZeroSentReason::MissingFields
        } else if self.missing_fields == 0 {
            ZeroSentReason::AlreadySent
        } else {
            ZeroSentReason::ApprovedButIneligible
        };
        Some(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroSentReason {
    NoData,
    NoApprovedRows,
    /// Todas las aprobadas tienen campos vacíos
    MissingFields,
    /// Todas las aprobadas ya estaban enviadas o contactadas
    AlreadySent,
    /// Mezcla de las dos anteriores
    ApprovedButIneligible,
    AllFailed,
}

impl fmt::Display for ZeroSentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZeroSentReason::NoData => write!(f, "No data found in the target source."),
            ZeroSentReason::NoApprovedRows => write!(
                f,
                "No approved rows found. Set the 'Status' column to 'Approved' for rows to send."
            ),
            ZeroSentReason::MissingFields => write!(
                f,
                "All approved rows are missing required fields (identity, Subject or Body)."
            ),
            ZeroSentReason::AlreadySent => write!(
                f,
                "All approved rows were already sent or contacted before."
            ),
            ZeroSentReason::ApprovedButIneligible => write!(
                f,
                "Approved rows were either missing required fields or already sent."
            ),
            ZeroSentReason::AllFailed => write!(
                f,
                "Every delivery attempt failed; check the channel errors above."
            ),
        }
    }
}

/// Resultado de una corrida del driver sobre una fuente (o un shard)
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub run_id: String,
    pub source: String,
    pub counters: RunCounters,
    pub records: Vec<TargetRecord>,
    /// Si el lote se detuvo (p.ej. la hoja no permite marcar "enviado")
    pub halted: Option<OutreachError>,
}

impl RunReport {
    pub fn outcomes_for(&self, identity: &str) -> Vec<&TargetOutcome> {
        self.records
            .iter()
            .filter(|r| r.identity == identity)
            .map(|r| &r.outcome)
            .collect()
    }
}

/// Resumen final, agregado sobre hojas / shards
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub counters: RunCounters,
    pub halted: Vec<String>,
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn add_report(&mut self, report: &RunReport) {
        self.counters.merge(&report.counters);
        if let Some(err) = &report.halted {
            self.halted.push(format!("{}: {}", report.source, err));
        }
    }

    pub fn add_error(&mut self, source: &str, err: impl fmt::Display) {
        self.errors.push(format!("{}: {}", source, err));
    }

    /// Líneas del resumen; se imprime siempre, incluso si la corrida falló a medias
    pub fn render(&self, delivered_label: &str) -> Vec<String> {
        let c = &self.counters;
        let mut lines = vec![
            "Summary:".to_string(),
            format!("   Total rows processed: {}", c.total),
            format!("   Approved rows: {}", c.approved),
            format!("   Not approved rows: {}", c.not_approved),
            format!("   {}: {}", delivered_label, c.delivered),
        ];
        if c.failed_transient + c.failed_permanent > 0 {
            lines.push(format!(
                "   Failed: {} (retry next run: {}, needs attention: {})",
                c.failed_transient + c.failed_permanent,
                c.failed_transient,
                c.failed_permanent
            ));
        }
        for halted in &self.halted {
            lines.push(format!("   HALTED {}", halted));
        }
        for err in &self.errors {
            lines.push(format!("   ERROR {}", err));
        }
        if let Some(reason) = c.zero_sent_reason() {
            lines.push(format!("   Nothing delivered: {}", reason));
        }
        lines
    }
}

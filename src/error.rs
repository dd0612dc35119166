//! error.rs
//! Taxonomía de errores del dominio (envíos, ledger, fuentes de destinatarios).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutreachError {
    /// Identidad del destinatario mal formada (permanente, no se reintenta)
    #[error("Invalid identity '{raw}': {reason}")]
    InvalidIdentity { raw: String, reason: String },

    #[error("Connect error on {channel}: {message}")]
    Connect { channel: String, message: String },

    #[error("Auth error on {channel}: {message}")]
    Auth { channel: String, message: String },

    #[error("Send error on {channel}: {message}")]
    Send { channel: String, message: String },

    /// Perfil / número inexistente (variantes de navegador)
    #[error("Target unreachable '{target}': {message}")]
    TargetUnreachable { target: String, message: String },

    #[error("Ledger I/O error: {0}")]
    LedgerIo(String),

    /// Celda protegida o sin permisos de escritura
    #[error("Permission denied on {location}: {message}")]
    Permission { location: String, message: String },

    #[error("Missing required columns in '{sheet}': {}", columns.join(", "))]
    MissingColumn { sheet: String, columns: Vec<String> },

    #[error("Duplicate column header '{header}' in '{sheet}'")]
    DuplicateHeader { sheet: String, header: String },

    #[error("Target source error: {0}")]
    Source(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generation error: {0}")]
    Generation(String),
}

impl OutreachError {
    pub fn invalid_identity(raw: &str, reason: impl Into<String>) -> Self {
        OutreachError::InvalidIdentity {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    /// No tiene sentido reintentar con otra configuración de canal
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            OutreachError::InvalidIdentity { .. } | OutreachError::TargetUnreachable { .. }
        )
    }

    pub fn is_channel_failure(&self) -> bool {
        matches!(
            self,
            OutreachError::Connect { .. } | OutreachError::Auth { .. } | OutreachError::Send { .. }
        )
    }

    /// El único error que detiene el lote completo (no sólo el destinatario)
    pub fn halts_batch(&self) -> bool {
        matches!(self, OutreachError::Permission { .. })
    }
}

pub type OutreachResult<T> = std::result::Result<T, OutreachError>;

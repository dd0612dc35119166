//! models/channel_model.rs
//! Configuración de canal y mensaje saliente.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OutreachError, OutreachResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportMode {
    /// TLS implícito (SMTPS, p.ej. 465)
    Ssl,
    /// Texto plano + STARTTLS (587 / 25)
    StartTls,
    /// Sesión de navegador ya abierta por el worker
    Browser,
}

impl TransportMode {
    pub fn parse(raw: &str) -> OutreachResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "ssl" => Ok(TransportMode::Ssl),
            "tls" | "starttls" => Ok(TransportMode::StartTls),
            "browser" => Ok(TransportMode::Browser),
            other => Err(OutreachError::Config(format!(
                "Unknown transport mode '{}'",
                other
            ))),
        }
    }

    /// Modo por defecto según el puerto, igual que el servidor primario
    pub fn for_smtp_port(port: u16) -> Self {
        if port == 465 {
            TransportMode::Ssl
        } else {
            TransportMode::StartTls
        }
    }
}

/// Una forma concreta de llegar al endpoint. Se prueban en el orden listado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub endpoint: String,
    pub port: u16,
    pub mode: TransportMode,
    /// Ventana de espera de cada operación de red / de elemento
    pub timeout: Duration,
}

impl ChannelConfig {
    pub fn new(endpoint: &str, port: u16, mode: TransportMode, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            port,
            mode,
            timeout,
        }
    }

    /// "host:port:ssl|tls"
    pub fn parse_smtp(raw: &str, timeout: Duration) -> OutreachResult<Self> {
        let parts: Vec<&str> = raw.trim().split(':').collect();
        match parts.as_slice() {
            [host, port, mode] => {
                let port: u16 = port.parse().map_err(|_| {
                    OutreachError::Config(format!("Invalid SMTP port in '{}'", raw))
                })?;
                Ok(Self::new(host, port, TransportMode::parse(mode)?, timeout))
            }
            [host, port] => {
                let port: u16 = port.parse().map_err(|_| {
                    OutreachError::Config(format!("Invalid SMTP port in '{}'", raw))
                })?;
                Ok(Self::new(host, port, TransportMode::for_smtp_port(port), timeout))
            }
            _ => Err(OutreachError::Config(format!(
                "Invalid SMTP channel '{}', expected host:port:mode",
                raw
            ))),
        }
    }
}

impl fmt::Display for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            TransportMode::Ssl => write!(f, "{}:{} (SSL)", self.endpoint, self.port),
            TransportMode::StartTls => write!(f, "{}:{} (TLS)", self.endpoint, self.port),
            TransportMode::Browser => {
                write!(f, "{} (wait {}s)", self.endpoint, self.timeout.as_secs())
            }
        }
    }
}

/// Mensaje ya resuelto para un destinatario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Identidad normalizada (email, número, usuario)
    pub recipient: String,
    pub recipient_name: String,
    pub subject: Option<String>,
    pub body: String,
}

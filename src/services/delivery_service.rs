//! services/delivery_service.rs
//! Intento de entrega de un mensaje a un destinatario, recorriendo una lista
//! ordenada de configuraciones de canal. Cada configuración es una conexión
//! independiente: connect -> authenticate -> verify_target -> send -> close.

use async_trait::async_trait;

use crate::error::{OutreachError, OutreachResult};
use crate::models::channel_model::{ChannelConfig, OutgoingMessage};

#[async_trait]
pub trait MessageTransport: Send + Sync {
    type Session: Send;

    fn name(&self) -> &str;

    async fn connect(&self, config: &ChannelConfig) -> OutreachResult<Self::Session>;

    async fn authenticate(
        &self,
        session: &mut Self::Session,
        config: &ChannelConfig,
    ) -> OutreachResult<()>;

    /// Variantes de navegador: el perfil / número debe existir. Un error aquí es
    /// `TargetUnreachable` y no se reintenta con otras configuraciones.
    async fn verify_target(
        &self,
        _session: &mut Self::Session,
        _message: &OutgoingMessage,
        _config: &ChannelConfig,
    ) -> OutreachResult<()> {
        Ok(())
    }

    async fn send(
        &self,
        session: &mut Self::Session,
        message: &OutgoingMessage,
        config: &ChannelConfig,
    ) -> OutreachResult<()>;

    /// Efecto secundario best-effort tras un envío confirmado (p.ej. copia en "Enviados").
    /// Sus fallos sólo se registran.
    async fn on_delivered(&self, _session: &mut Self::Session, _message: &OutgoingMessage) {}

    async fn close(&self, session: Self::Session);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered {
        channel: ChannelConfig,
        attempts: usize,
    },
    /// Todas las configuraciones fallaron; se devuelve sólo el último error
    Exhausted {
        last_error: OutreachError,
        attempts: usize,
    },
    Unreachable {
        error: OutreachError,
    },
}

pub async fn attempt_delivery<T>(
    transport: &T,
    message: &OutgoingMessage,
    configs: &[ChannelConfig],
) -> DeliveryOutcome
where
    T: MessageTransport + ?Sized,
{
    let mut last_error = OutreachError::Config(format!(
        "No channel configurations for {}",
        transport.name()
    ));
    let mut attempts = 0;

    for config in configs {
        attempts += 1;
        log::info!(
            "(attempt_delivery) [{}] {} -> intento {}/{} vía {}",
            transport.name(),
            message.recipient,
            attempts,
            configs.len(),
            config
        );

        match try_channel(transport, message, config).await {
            Ok(()) => {
                log::info!(
                    "(attempt_delivery) [{}] Enviado a {} vía {}",
                    transport.name(),
                    message.recipient,
                    config
                );
                return DeliveryOutcome::Delivered {
                    channel: config.clone(),
                    attempts,
                };
            }
            Err(error) if error.is_permanent() => {
                log::warn!(
                    "(attempt_delivery) [{}] Destinatario inválido {}: {}",
                    transport.name(),
                    message.recipient,
                    error
                );
                return DeliveryOutcome::Unreachable { error };
            }
            Err(error) => {
                log::warn!(
                    "(attempt_delivery) [{}] Falló {} con {}: {}",
                    transport.name(),
                    message.recipient,
                    config,
                    error
                );
                last_error = error;
            }
        }
    }

    log::error!(
        "(attempt_delivery) [{}] Todas las configuraciones fallaron para {} ({} intentos)",
        transport.name(),
        message.recipient,
        attempts
    );
    DeliveryOutcome::Exhausted {
        last_error,
        attempts,
    }
}

/// Un intento completo con una configuración. La sesión se cierra siempre,
/// también cuando algún paso falla.
async fn try_channel<T>(
    transport: &T,
    message: &OutgoingMessage,
    config: &ChannelConfig,
) -> OutreachResult<()>
where
    T: MessageTransport + ?Sized,
{
    let mut session = transport.connect(config).await?;

    let result = async {
        transport.authenticate(&mut session, config).await?;
        transport.verify_target(&mut session, message, config).await?;
        transport.send(&mut session, message, config).await
    }
    .await;

    if result.is_ok() {
        transport.on_delivered(&mut session, message).await;
    }
    transport.close(session).await;
    result
}

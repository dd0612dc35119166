//! services/source_service.rs
//! Contrato de las fuentes de destinatarios (Google Sheets, carpeta de CSV, archivo de usuarios).

use async_trait::async_trait;

use crate::error::OutreachResult;
use crate::models::target_model::Target;

#[async_trait]
pub trait TargetSource: Send + Sync {
    fn name(&self) -> &str;

    /// Destinatarios en el orden de la fuente
    async fn list_targets(&self) -> OutreachResult<Vec<Target>>;

    /// Marca la fila como enviada. `Permission` aquí detiene el lote.
    async fn mark_sent(&self, target: &Target) -> OutreachResult<()>;

    /// Limpieza opcional: quitar de la fuente los destinatarios ya entregados
    /// (identidades normalizadas). Devuelve cuántas filas se quitaron.
    async fn prune_delivered(&self, _identities: &[String]) -> OutreachResult<usize> {
        Ok(0)
    }
}

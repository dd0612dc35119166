//! services/imap_service.rs
//! Copia de mensajes a una carpeta IMAP (Enviados / Borradores).

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use async_imap::Client;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{OutreachError, OutreachResult};

#[derive(Debug, Clone)]
pub struct ImapMailbox {
    host: String,
    port: u16,
    user: String,
    password: String,
    /// Límite para toda la operación: TCP, TLS, login, select, append y logout
    timeout: Duration,
}

impl ImapMailbox {
    pub fn new(host: &str, port: u16, user: &str, password: &str, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            port,
            user: user.to_string(),
            password: password.to_string(),
            timeout,
        }
    }

    fn channel(&self) -> String {
        format!("imap://{}:{}", self.host, self.port)
    }

    async fn within<T>(
        &self,
        step: &str,
        fut: impl Future<Output = OutreachResult<T>>,
    ) -> OutreachResult<T> {
        timeout(self.timeout, fut)
            .await
            .map_err(|_| OutreachError::Connect {
                channel: self.channel(),
                message: format!("{} timed out after {}s", step, self.timeout.as_secs()),
            })?
    }

    /// Agrega el mensaje a la primera carpeta que se pueda seleccionar.
    /// Devuelve el nombre de la carpeta usada.
    pub async fn append_to_first(
        &self,
        folders: &[String],
        flags: &str,
        content: &[u8],
    ) -> OutreachResult<String> {
        self.within("IMAP append", async {
            let channel = self.channel();
            let tcp = TcpStream::connect((self.host.as_str(), self.port))
                .await
                .map_err(|e| OutreachError::Connect {
                    channel: channel.clone(),
                    message: e.to_string(),
                })?;

            let tls_stream = async_native_tls::TlsConnector::new()
                .connect(self.host.as_str(), tcp)
                .await
                .map_err(|e| OutreachError::Connect {
                    channel: channel.clone(),
                    message: format!("TLS: {}", e),
                })?;

            self.append_with(Client::new(tls_stream), folders, flags, content)
                .await
        })
        .await
    }

    /// Login, selección de carpeta y APPEND sobre un stream ya abierto
    pub async fn append_with<S>(
        &self,
        client: Client<S>,
        folders: &[String],
        flags: &str,
        content: &[u8],
    ) -> OutreachResult<String>
    where
        S: AsyncRead + AsyncWrite + Unpin + Debug + Send,
    {
        let channel = self.channel();
        let mut session = client
            .login(&self.user, &self.password)
            .await
            .map_err(|(e, _)| OutreachError::Auth {
                channel: channel.clone(),
                message: e.to_string(),
            })?;

        let mut chosen = None;
        for folder in folders {
            match session.select(folder).await {
                Ok(_) => {
                    chosen = Some(folder.clone());
                    break;
                }
                Err(e) => log::debug!("(imap) Carpeta '{}' no disponible: {}", folder, e),
            }
        }

        let result = match chosen {
            Some(folder) => session
                .append(&folder, Some(flags), None, content)
                .await
                .map(|_| folder)
                .map_err(|e| OutreachError::Send {
                    channel: channel.clone(),
                    message: e.to_string(),
                }),
            None => Err(OutreachError::Send {
                channel: channel.clone(),
                message: format!("none of the folders {:?} exists", folders),
            }),
        };

        if let Err(e) = session.logout().await {
            log::debug!("(imap) Error cerrando sesión en {}: {}", channel, e);
        }
        result
    }
}

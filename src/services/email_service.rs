//! services/email_service.rs

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{
        authentication::{Credentials, Mechanism},
        client::{AsyncSmtpConnection, TlsParameters},
        extension::ClientId,
    },
    Message,
};

use crate::{
    config::app_config::EmailSettings,
    error::{OutreachError, OutreachResult},
    models::channel_model::{ChannelConfig, OutgoingMessage, TransportMode},
    services::{delivery_service::MessageTransport, imap_service::ImapMailbox},
};

pub const SENT_FLAGS: &str = "(\\Seen)";
pub const DRAFT_FLAGS: &str = "(\\Draft \\Seen)";

pub struct SmtpSession {
    conn: AsyncSmtpConnection,
    channel: String,
    /// Mensaje ya formateado, para copiarlo a "Enviados"
    last_sent: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct EmailService {
    settings: EmailSettings,
    mailbox: ImapMailbox,
}

impl EmailService {
    pub fn new(settings: EmailSettings) -> Self {
        let mailbox = ImapMailbox::new(
            &settings.imap_server,
            settings.imap_port,
            &settings.address,
            &settings.password,
            settings.smtp_timeout,
        );
        Self { settings, mailbox }
    }

    pub fn settings(&self) -> &EmailSettings {
        &self.settings
    }

    fn from_mailbox(&self) -> OutreachResult<Mailbox> {
        format!("{} <{}>", self.settings.display_name, self.settings.address)
            .parse()
            .map_err(|e| OutreachError::Config(format!("Invalid from address: {}", e)))
    }

    fn to_mailbox(&self, message: &OutgoingMessage, channel: &str) -> OutreachResult<Mailbox> {
        message
            .recipient
            .parse()
            .map_err(|e| OutreachError::Send {
                channel: channel.to_string(),
                message: format!("Invalid recipient address: {}", e),
            })
    }

    /// Texto + HTML, con firma y [Name] personalizado
    pub fn build_message(&self, message: &OutgoingMessage, channel: &str) -> OutreachResult<Message> {
        let body = personalize_body(&message.body, &message.recipient_name);
        let text_body = format!("{}{}", body, self.settings.text_signature);
        let html_body = format!(
            "{}{}",
            convert_text_to_html(&body),
            self.settings.html_signature
        );

        Message::builder()
            .from(self.from_mailbox()?)
            .to(self.to_mailbox(message, channel)?)
            .subject(message.subject.clone().unwrap_or_default())
            .multipart(lettre::message::MultiPart::alternative_plain_html(
                text_body, html_body,
            ))
            .map_err(|e| OutreachError::Send {
                channel: channel.to_string(),
                message: format!("Failed to build message: {}", e),
            })
    }

    /// Versión sólo texto, usada para borradores
    pub fn build_draft(&self, message: &OutgoingMessage) -> OutreachResult<Message> {
        let body = personalize_body(&message.body, &message.recipient_name);
        Message::builder()
            .from(self.from_mailbox()?)
            .to(self.to_mailbox(message, "drafts")?)
            .subject(message.subject.clone().unwrap_or_default())
            .header(ContentType::TEXT_PLAIN)
            .body(format!("{}{}", body, self.settings.text_signature))
            .map_err(|e| OutreachError::Send {
                channel: "drafts".to_string(),
                message: format!("Failed to build draft: {}", e),
            })
    }

    /// Guarda el mensaje en la carpeta de borradores (no envía)
    pub async fn save_draft(&self, message: &OutgoingMessage) -> OutreachResult<String> {
        let draft = self.build_draft(message)?;
        self.mailbox
            .append_to_first(&self.settings.draft_folders, DRAFT_FLAGS, &draft.formatted())
            .await
    }
}

#[async_trait]
impl MessageTransport for EmailService {
    type Session = SmtpSession;

    fn name(&self) -> &str {
        "smtp"
    }

    async fn connect(&self, config: &ChannelConfig) -> OutreachResult<SmtpSession> {
        let channel = config.to_string();
        let connect_err = |message: String| OutreachError::Connect {
            channel: channel.clone(),
            message,
        };
        let hello = ClientId::default();

        let implicit_tls = match config.mode {
            TransportMode::Ssl => Some(
                TlsParameters::new(config.endpoint.clone())
                    .map_err(|e| connect_err(e.to_string()))?,
            ),
            TransportMode::StartTls => None,
            TransportMode::Browser => {
                return Err(connect_err("browser channel is not valid for SMTP".to_string()))
            }
        };

        let mut conn = within(
            config.timeout,
            AsyncSmtpConnection::connect_tokio1(
                (config.endpoint.as_str(), config.port),
                Some(config.timeout),
                &hello,
                implicit_tls,
                None,
            ),
        )
        .await
        .map_err(|e| connect_err(e))?;

        if config.mode == TransportMode::StartTls {
            log::info!("(smtp) Iniciando STARTTLS con {}", channel);
            let params = TlsParameters::new(config.endpoint.clone())
                .map_err(|e| connect_err(e.to_string()))?;
            within(config.timeout, conn.starttls(params, &hello))
                .await
                .map_err(|e| connect_err(e))?;
        }

        Ok(SmtpSession {
            conn,
            channel,
            last_sent: None,
        })
    }

    async fn authenticate(
        &self,
        session: &mut SmtpSession,
        config: &ChannelConfig,
    ) -> OutreachResult<()> {
        let credentials = Credentials::new(
            self.settings.address.clone(),
            self.settings.password.clone(),
        );
        within(
            config.timeout,
            session
                .conn
                .auth(&[Mechanism::Plain, Mechanism::Login], &credentials),
        )
        .await
        .map(|_| ())
        .map_err(|message| OutreachError::Auth {
            channel: session.channel.clone(),
            message,
        })
    }

    async fn send(
        &self,
        session: &mut SmtpSession,
        message: &OutgoingMessage,
        config: &ChannelConfig,
    ) -> OutreachResult<()> {
        let email = self.build_message(message, &session.channel)?;
        let formatted = email.formatted();

        within(
            config.timeout,
            session.conn.send(email.envelope(), &formatted),
        )
        .await
        .map_err(|e| OutreachError::Send {
            channel: session.channel.clone(),
            message: e,
        })?;

        session.last_sent = Some(formatted);
        Ok(())
    }

    async fn on_delivered(&self, session: &mut SmtpSession, message: &OutgoingMessage) {
        let Some(formatted) = session.last_sent.take() else {
            return;
        };
        match self
            .mailbox
            .append_to_first(&self.settings.sent_folders, SENT_FLAGS, &formatted)
            .await
        {
            Ok(folder) => log::info!(
                "(smtp) Copia de {} guardada en '{}'",
                message.recipient,
                folder
            ),
            Err(e) => log::warn!(
                "(smtp) No se pudo guardar copia de {} en Enviados: {}",
                message.recipient,
                e
            ),
        }
    }

    async fn close(&self, mut session: SmtpSession) {
        if let Err(e) = session.conn.quit().await {
            log::debug!("(smtp) QUIT falló en {}: {}", session.channel, e);
        }
    }
}

/// Aplica la ventana de espera del canal y aplana el error a texto
async fn within<F, T, E>(limit: Duration, fut: F) -> Result<T, String>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {}s", limit.as_secs())),
    }
}

pub fn personalize_body(body: &str, name: &str) -> String {
    if !name.trim().is_empty() && body.contains("[Name]") {
        body.replace("[Name]", name.trim())
    } else {
        body.to_string()
    }
}

pub fn convert_text_to_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    format!(
        "<div style=\"font-family: Helvetica Neue, sans-serif; font-size: 14px; line-height: 1.4; color: #333;\">{}</div>",
        text.replace('\n', "<br>")
    )
}

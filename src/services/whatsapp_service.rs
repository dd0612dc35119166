//! services/whatsapp_service.rs
//! Envío por WhatsApp Web usando la sesión de navegador del worker.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::Page;

use crate::error::{OutreachError, OutreachResult};
use crate::models::channel_model::{ChannelConfig, OutgoingMessage};
use crate::services::browser_service::{page_contains_any, page_err, wait_for_element};
use crate::services::delivery_service::MessageTransport;

pub const WHATSAPP_WEB_URL: &str = "https://web.whatsapp.com";

const CHAT_LIST_SELECTOR: &str = "#pane-side";
const QR_SELECTOR: &str = "canvas[aria-label]";
const SEND_BUTTON_SELECTOR: &str = "span[data-icon=\"send\"]";
const INVALID_NUMBER_MARKERS: [&str; 2] = [
    "Phone number shared via url is invalid",
    "El número de teléfono compartido a través de la dirección URL no es válido",
];

pub struct WhatsAppTransport<'a> {
    browser: &'a Browser,
    profile: String,
}

impl<'a> WhatsAppTransport<'a> {
    pub fn new(browser: &'a Browser, profile: &str) -> Self {
        Self {
            browser,
            profile: profile.to_string(),
        }
    }

    /// Abre WhatsApp Web y espera a que el usuario escanee el QR (si hace falta)
    pub async fn wait_for_login(&self, limit: Duration) -> OutreachResult<()> {
        let channel = format!("whatsapp:{}", self.profile);
        let page = self
            .browser
            .new_page(WHATSAPP_WEB_URL)
            .await
            .map_err(|e| OutreachError::Connect {
                channel: channel.clone(),
                message: e.to_string(),
            })?;

        log::info!(
            "[Profile: {}] Escanee el código QR dentro de {} segundos si se solicita...",
            self.profile,
            limit.as_secs()
        );
        let logged_in = wait_for_element(&page, CHAT_LIST_SELECTOR, limit).await.is_some();
        let _ = page.close().await;

        if logged_in {
            log::info!("[Profile: {}] Sesión de WhatsApp activa", self.profile);
            Ok(())
        } else {
            Err(OutreachError::Auth {
                channel,
                message: format!("QR code scan timeout after {}s", limit.as_secs()),
            })
        }
    }

    pub fn chat_url(endpoint: &str, message: &OutgoingMessage) -> String {
        format!(
            "{}/send?phone={}&text={}",
            endpoint.trim_end_matches('/'),
            message.recipient,
            urlencoding::encode(&message.body)
        )
    }
}

#[async_trait]
impl<'a> MessageTransport for WhatsAppTransport<'a> {
    type Session = Page;

    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn connect(&self, config: &ChannelConfig) -> OutreachResult<Page> {
        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| OutreachError::Connect {
                channel: config.to_string(),
                message: e.to_string(),
            })
    }

    /// No hay login por intento: se comprueba que la sesión siga activa
    async fn authenticate(&self, page: &mut Page, config: &ChannelConfig) -> OutreachResult<()> {
        page.goto(config.endpoint.as_str())
            .await
            .map_err(|e| page_err(&config.to_string(), e))?;

        match wait_for_element(page, CHAT_LIST_SELECTOR, config.timeout).await {
            Some(_) => Ok(()),
            None => {
                let message = if page.find_element(QR_SELECTOR).await.is_ok() {
                    "session logged out (QR code shown)".to_string()
                } else {
                    "chat list did not load".to_string()
                };
                Err(OutreachError::Auth {
                    channel: config.to_string(),
                    message,
                })
            }
        }
    }

    async fn verify_target(
        &self,
        page: &mut Page,
        message: &OutgoingMessage,
        config: &ChannelConfig,
    ) -> OutreachResult<()> {
        let url = Self::chat_url(&config.endpoint, message);
        page.goto(url.as_str())
            .await
            .map_err(|e| page_err(&config.to_string(), e))?;

        // El chat abre con el botón de enviar o con el aviso de número inválido
        let opened = wait_for_element(page, SEND_BUTTON_SELECTOR, config.timeout).await;
        if opened.is_none() && page_contains_any(page, &INVALID_NUMBER_MARKERS).await {
            return Err(OutreachError::TargetUnreachable {
                target: message.recipient.clone(),
                message: "phone number is not on WhatsApp".to_string(),
            });
        }
        Ok(())
    }

    async fn send(
        &self,
        page: &mut Page,
        message: &OutgoingMessage,
        config: &ChannelConfig,
    ) -> OutreachResult<()> {
        let channel = config.to_string();
        let button = wait_for_element(page, SEND_BUTTON_SELECTOR, config.timeout)
            .await
            .ok_or_else(|| page_err(&channel, "send button not found"))?;
        button.click().await.map_err(|e| page_err(&channel, e))?;

        // Dar tiempo a que el mensaje salga
        tokio::time::sleep(Duration::from_secs(1)).await;
        log::info!(
            "[Profile: {}] Mensaje enviado a {}",
            self.profile,
            message.recipient
        );
        Ok(())
    }

    async fn close(&self, page: Page) {
        if let Err(e) = page.close().await {
            log::debug!("[Profile: {}] Error cerrando pestaña: {}", self.profile, e);
        }
    }
}

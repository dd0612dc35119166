//! services/instagram_service.rs
//! Mensajes directos de Instagram desde la sesión de navegador ya iniciada.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::Page;

use crate::config::app_config::BrowserSettings;
use crate::error::{OutreachError, OutreachResult};
use crate::models::channel_model::{ChannelConfig, OutgoingMessage};
use crate::services::browser_service::{
    click_button_with_text, page_contains_any, page_err, page_text_contains, wait_for_element,
};
use crate::services::delivery_service::MessageTransport;

pub const INSTAGRAM_URL: &str = "https://www.instagram.com";

const PROFILE_MISSING_MARKERS: [&str; 2] =
    ["Page Not Found", "Sorry, this page isn't available."];
const LOGIN_MARKERS: [&str; 2] = ["Log in", "Sign In"];
const TEXTBOX_SELECTOR: &str = "div[role=\"textbox\"]";
const SEND_BUTTON_WAIT: Duration = Duration::from_secs(8);

/// Primera línea no vacía del mensaje, usada para confirmar que quedó en la conversación
pub fn confirmation_text(body: &str) -> Option<&str> {
    body.lines().map(str::trim).find(|line| !line.is_empty())
}

pub struct InstagramTransport<'a> {
    browser: &'a Browser,
    profile: String,
    page_load_wait: Duration,
    char_delay: Duration,
}

impl<'a> InstagramTransport<'a> {
    pub fn new(browser: &'a Browser, profile: &str, settings: &BrowserSettings) -> Self {
        Self {
            browser,
            profile: profile.to_string(),
            page_load_wait: settings.page_load_wait,
            char_delay: settings.char_delay,
        }
    }

    pub fn profile_url(endpoint: &str, username: &str) -> String {
        format!("{}/{}/", endpoint.trim_end_matches('/'), username)
    }
}

#[async_trait]
impl<'a> MessageTransport for InstagramTransport<'a> {
    type Session = Page;

    fn name(&self) -> &str {
        "instagram"
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

    /// El login es manual; aquí sólo se comprueba que la sesión siga iniciada
    async fn authenticate(&self, page: &mut Page, config: &ChannelConfig) -> OutreachResult<()> {
        page.goto(config.endpoint.as_str())
            .await
            .map_err(|e| page_err(&config.to_string(), e))?;
        tokio::time::sleep(self.page_load_wait).await;

        let title = page.get_title().await.ok().flatten().unwrap_or_default();
        let login_form = page.find_element("input[name=\"username\"]").await.is_ok();
        if title.contains("Login") || login_form {
            return Err(OutreachError::Auth {
                channel: config.to_string(),
                message: "not logged in to Instagram".to_string(),
            });
        }
        Ok(())
    }

    async fn verify_target(
        &self,
        page: &mut Page,
        message: &OutgoingMessage,
        config: &ChannelConfig,
    ) -> OutreachResult<()> {
        let url = Self::profile_url(&config.endpoint, &message.recipient);
        page.goto(url.as_str())
            .await
            .map_err(|e| page_err(&config.to_string(), e))?;
        tokio::time::sleep(self.page_load_wait).await;

        if page_contains_any(page, &PROFILE_MISSING_MARKERS).await {
            return Err(OutreachError::TargetUnreachable {
                target: message.recipient.clone(),
                message: "profile not found or banned".to_string(),
            });
        }
        if page_contains_any(page, &LOGIN_MARKERS).await
            && page.find_element("input[name=\"username\"]").await.is_ok()
        {
            return Err(OutreachError::Auth {
                channel: config.to_string(),
                message: "redirected to login".to_string(),
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

        // 1) Abrir la ventana de mensajes
        if !click_button_with_text(page, "Message", config.timeout).await {
            return Err(page_err(&channel, "Message button not found"));
        }
        log::info!("[Profile: {}] Ventana de mensajes abierta", self.profile);
        tokio::time::sleep(Duration::from_secs(2)).await;

        // 2) Escribir carácter por carácter
        let textbox = wait_for_element(page, TEXTBOX_SELECTOR, config.timeout)
            .await
            .ok_or_else(|| page_err(&channel, "message textbox not found"))?;
        textbox.click().await.map_err(|e| page_err(&channel, e))?;
        let mut buf = [0u8; 4];
        for ch in message.body.chars() {
            textbox
                .type_str(ch.encode_utf8(&mut buf))
                .await
                .map_err(|e| page_err(&channel, e))?;
            tokio::time::sleep(self.char_delay).await;
        }

        // 3) Enviar. Después del click ya no se reintenta: el DM pudo haber salido
        if !click_button_with_text(page, "Send", SEND_BUTTON_WAIT).await {
            return Err(page_err(&channel, "Send button not found"));
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        if let Some(text) = confirmation_text(&message.body) {
            if !page_text_contains(page, text).await {
                log::warn!(
                    "[Profile: {}] Mensaje a {} enviado pero no visible en la conversación",
                    self.profile,
                    message.recipient
                );
            }
        }
        Ok(())
    }

    async fn close(&self, page: Page) {
        if let Err(e) = page.close().await {
            log::debug!("[Profile: {}] Error cerrando pestaña: {}", self.profile, e);
        }
    }
}

//! services/browser_service.rs
//! Sesión de Chrome por perfil (chromiumoxide) y utilidades de espera de elementos.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::config::app_config::{BrowserProfile, BrowserSettings};
use crate::error::{OutreachError, OutreachResult};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const CHROME_CANDIDATES: [&str; 4] = ["google-chrome", "chromium", "chromium-browser", "chrome"];

/// Navegador de un perfil. El proceso de Chrome se termina al salir de scope,
/// también si el worker termina con error.
pub struct BrowserSession {
    browser: Option<Browser>,
    handler: JoinHandle<()>,
    profile: String,
}

impl BrowserSession {
    pub async fn launch(settings: &BrowserSettings, profile: &BrowserProfile) -> OutreachResult<Self> {
        let label = profile.profile_dir.clone();
        std::fs::create_dir_all(&profile.user_data_dir).map_err(|e| OutreachError::Connect {
            channel: format!("browser:{}", label),
            message: format!("creating {:?}: {}", profile.user_data_dir, e),
        })?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&profile.user_data_dir)
            .arg(format!("--profile-directory={}", profile.profile_dir))
            .arg("--disable-notifications")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .request_timeout(settings.element_wait);
        if !settings.headless {
            builder = builder.with_head().arg("--start-maximized");
        }
        if let Some(path) = resolve_chrome(settings) {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(|e| OutreachError::Connect {
            channel: format!("browser:{}", label),
            message: format!("invalid browser config: {}", e),
        })?;

        let (browser, mut handler) =
            Browser::launch(config)
                .await
                .map_err(|e| OutreachError::Connect {
                    channel: format!("browser:{}", label),
                    message: e.to_string(),
                })?;

        // Eventos CDP en su propia tarea
        let handle = tokio::spawn(async move {
            while let Some(_evt) = handler.next().await {}
        });

        log::info!("[Profile: {}] Navegador iniciado", label);
        Ok(Self {
            browser: Some(browser),
            handler: handle,
            profile: label,
        })
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn browser(&self) -> OutreachResult<&Browser> {
        self.browser.as_ref().ok_or_else(|| OutreachError::Connect {
            channel: format!("browser:{}", self.profile),
            message: "browser already closed".to_string(),
        })
    }

    /// Cierre ordenado; si no se llama, `Drop` termina el proceso igual.
    pub async fn shutdown(mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                log::warn!("[Profile: {}] Error cerrando navegador: {}", self.profile, e);
            }
            let _ = browser.wait().await;
        }
        self.handler.abort();
        log::info!("[Profile: {}] Navegador cerrado", self.profile);
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Browser::drop mata el proceso hijo si sigue vivo
        self.browser.take();
        self.handler.abort();
    }
}

fn resolve_chrome(settings: &BrowserSettings) -> Option<PathBuf> {
    settings
        .chrome_path
        .clone()
        .or_else(|| CHROME_CANDIDATES.iter().find_map(|bin| which::which(bin).ok()))
}

// --------------------------------------------------------------------------------
// Helpers de página
// --------------------------------------------------------------------------------

pub fn page_err(channel: &str, e: impl std::fmt::Display) -> OutreachError {
    OutreachError::Send {
        channel: channel.to_string(),
        message: e.to_string(),
    }
}

/// Espera hasta que el selector exista o venza la ventana
pub async fn wait_for_element(
    page: &Page,
    selector: &str,
    limit: Duration,
) -> Option<Element> {
    let deadline = Instant::now() + limit;
    loop {
        if let Ok(element) = page.find_element(selector).await {
            return Some(element);
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

pub async fn page_contains_any(page: &Page, needles: &[&str]) -> bool {
    match page.content().await {
        Ok(html) => needles.iter().any(|needle| html.contains(needle)),
        Err(e) => {
            log::debug!("(browser) No se pudo leer el contenido de la página: {}", e);
            false
        }
    }
}

/// Script que busca `needle` en el texto visible de la página (no en el HTML serializado)
pub fn text_search_script(needle: &str) -> String {
    let literal = serde_json::to_string(needle).unwrap_or_else(|_| "\"\"".to_string());
    format!("(document.body ? document.body.innerText : '').includes({literal})")
}

pub async fn page_text_contains(page: &Page, needle: &str) -> bool {
    match page.evaluate(text_search_script(needle).as_str()).await {
        Ok(result) => result.into_value::<bool>().unwrap_or(false),
        Err(e) => {
            log::debug!("(browser) No se pudo leer el texto de la página: {}", e);
            false
        }
    }
}

/// Click por JS en el primer `[role=button]` cuyo texto coincide exactamente
pub async fn click_button_with_text(page: &Page, text: &str, limit: Duration) -> bool {
    let literal = serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string());
    let script = format!(
        r#"(() => {{
            const wanted = {literal};
            const nodes = Array.from(document.querySelectorAll('[role="button"]'));
            const button = nodes.find(n => (n.innerText || '').trim() === wanted);
            if (!button) {{ return false; }}
            button.click();
            return true;
        }})()"#
    );

    let deadline = Instant::now() + limit;
    loop {
        let clicked = match page.evaluate(script.as_str()).await {
            Ok(result) => result.into_value::<bool>().unwrap_or(false),
            Err(e) => {
                log::debug!("(browser) evaluate falló: {}", e);
                false
            }
        };
        if clicked {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

//! config/app_config.rs
//! Configuración explícita de la aplicación, leída del entorno (.env) una sola vez
//! y pasada a cada servicio por constructor.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OutreachError, OutreachResult};
use crate::models::channel_model::{ChannelConfig, TransportMode};

/// Servidores alternativos que se prueban después del primario
pub const DEFAULT_SMTP_FALLBACKS: [(&str, u16, TransportMode); 5] = [
    ("smtpout.secureserver.net", 465, TransportMode::Ssl),
    ("smtpout.secureserver.net", 587, TransportMode::StartTls),
    ("smtpout.secureserver.net", 25, TransportMode::StartTls),
    ("smtp.secureserver.net", 465, TransportMode::Ssl),
    ("smtp.secureserver.net", 587, TransportMode::StartTls),
];

pub const SENT_FOLDER_NAMES: [&str; 3] = ["Sent", "Sent Items", "INBOX.Sent"];
pub const DRAFT_FOLDER_NAMES: [&str; 3] = ["Drafts", "INBOX.Drafts", "Draft"];

const DEFAULT_WHATSAPP_MESSAGE: &str = "Hi! We'd love to connect and share a few ideas about your website.";
const DEFAULT_INSTAGRAM_MESSAGE: &str = "Hi! We'd love to connect.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    pub address: String,
    pub password: String,
    pub display_name: String,
    pub text_signature: String,
    pub html_signature: String,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_fallbacks: Vec<ChannelConfig>,
    pub smtp_timeout: Duration,
    pub imap_server: String,
    pub imap_port: u16,
    pub sent_folders: Vec<String>,
    pub draft_folders: Vec<String>,
    pub send_delay: Duration,
    pub ledger_file: PathBuf,
}

impl EmailSettings {
    pub fn has_credentials(&self) -> bool {
        !self.address.trim().is_empty() && !self.password.is_empty()
    }

    /// Primario (SSL si el puerto es 465) seguido de los alternativos
    pub fn channel_configs(&self) -> Vec<ChannelConfig> {
        let mut configs = vec![ChannelConfig::new(
            &self.smtp_server,
            self.smtp_port,
            TransportMode::for_smtp_port(self.smtp_port),
            self.smtp_timeout,
        )];
        configs.extend(self.smtp_fallbacks.iter().cloned());
        configs
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsSettings {
    pub urls: Vec<String>,
    pub access_token: String,
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_retries: u32,
    pub prompt_paths: Vec<PathBuf>,
    pub api_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserProfile {
    pub user_data_dir: PathBuf,
    pub profile_dir: String,
}

impl BrowserProfile {
    /// "user_data_dir|profile_dir"
    pub fn parse(raw: &str) -> OutreachResult<Self> {
        let mut parts = raw.splitn(2, '|');
        match (parts.next(), parts.next()) {
            (Some(dir), Some(profile)) if !dir.trim().is_empty() && !profile.trim().is_empty() => {
                Ok(Self {
                    user_data_dir: PathBuf::from(dir.trim()),
                    profile_dir: profile.trim().to_string(),
                })
            }
            _ => Err(OutreachError::Config(format!(
                "Invalid browser profile '{}', expected user_data_dir|profile_dir",
                raw
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    pub profiles: Vec<BrowserProfile>,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub element_wait: Duration,
    pub page_load_wait: Duration,
    pub char_delay: Duration,
    pub login_wait: Duration,
}

impl BrowserSettings {
    /// Mismo endpoint con ventanas de espera crecientes (3 intentos)
    pub fn channel_configs(&self, endpoint: &str) -> Vec<ChannelConfig> {
        (1..=3u32)
            .map(|factor| {
                ChannelConfig::new(endpoint, 443, TransportMode::Browser, self.element_wait * factor)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppSettings {
    pub csv_folder: PathBuf,
    pub contacted_file: PathBuf,
    pub message: String,
    pub phone_column: String,
    pub cooldown: Duration,
    pub prune_after_send: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramSettings {
    pub usernames_file: PathBuf,
    pub messaged_file: PathBuf,
    pub message: String,
    pub cooldown: Duration,
    pub prune_after_send: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub email: EmailSettings,
    pub sheets: SheetsSettings,
    pub generation: GenerationSettings,
    pub browser: BrowserSettings,
    pub whatsapp: WhatsAppSettings,
    pub instagram: InstagramSettings,
}

impl AppConfig {
    /// Lee todas las variables (ya cargadas con dotenv). Valores numéricos inválidos
    /// son error de configuración, no de destinatario.
    pub fn from_env() -> OutreachResult<Self> {
        let smtp_timeout = secs("SMTP_TIMEOUT_SECS", 30)?;
        let smtp_fallbacks = match env::var("SMTP_FALLBACKS") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| ChannelConfig::parse_smtp(s, smtp_timeout))
                .collect::<OutreachResult<Vec<_>>>()?,
            _ => DEFAULT_SMTP_FALLBACKS
                .iter()
                .map(|(host, port, mode)| ChannelConfig::new(host, *port, *mode, smtp_timeout))
                .collect(),
        };

        let display_name = text("EMAIL_DISPLAY_NAME", "Growigh");
        let email = EmailSettings {
            address: text("EMAIL_ADDRESS", ""),
            password: text("EMAIL_PASSWORD", ""),
            text_signature: format!("\n\nBest Regards,\n{}", display_name),
            html_signature: format!("<br><br>Best Regards,<br>{}", display_name),
            display_name,
            smtp_server: text("SMTP_SERVER", "smtp.godaddy.com"),
            smtp_port: number("SMTP_PORT", 587)?,
            smtp_fallbacks,
            smtp_timeout,
            imap_server: text("IMAP_SERVER", "imap.secureserver.net"),
            imap_port: number("IMAP_PORT", 993)?,
            sent_folders: SENT_FOLDER_NAMES.iter().map(|s| s.to_string()).collect(),
            draft_folders: DRAFT_FOLDER_NAMES.iter().map(|s| s.to_string()).collect(),
            send_delay: secs("EMAIL_SEND_DELAY_SECS", 2)?,
            ledger_file: PathBuf::from(text("EMAIL_LEDGER_FILE", "data/emailed.csv")),
        };

        let sheets = SheetsSettings {
            urls: list("GOOGLE_SHEETS_URLS", ','),
            access_token: text("GOOGLE_SHEETS_ACCESS_TOKEN", ""),
            api_base: text("GOOGLE_SHEETS_API_BASE", "https://sheets.googleapis.com/v4"),
        };

        let api_key = env::var("GEMINI_API_KEY")
            .or_else(|_| env::var("GOOGLE_API_KEY"))
            .unwrap_or_default();
        let generation = GenerationSettings {
            api_key,
            api_base: text(
                "GEMINI_API_BASE",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            model: text("AI_MODEL", "gemini-2.5-flash"),
            temperature: number("AI_TEMPERATURE", 0.0)?,
            max_retries: number("AI_MAX_RETRIES", 2)?,
            prompt_paths: vec![
                PathBuf::from("prompt.txt"),
                PathBuf::from("../email-body/prompt.txt"),
            ],
            api_delay: secs("API_CALL_DELAY_SECS", 3)?,
        };

        let profiles = match env::var("CHROME_PROFILES") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .split(';')
                .filter(|s| !s.trim().is_empty())
                .map(BrowserProfile::parse)
                .collect::<OutreachResult<Vec<_>>>()?,
            _ => vec![BrowserProfile {
                user_data_dir: PathBuf::from("chrome-profiles/one"),
                profile_dir: "Default".to_string(),
            }],
        };
        let browser = BrowserSettings {
            profiles,
            chrome_path: env::var("CHROME_PATH").ok().map(PathBuf::from),
            headless: flag("BROWSER_HEADLESS", false)?,
            element_wait: secs("ELEMENT_WAIT_SECS", 30)?,
            page_load_wait: secs("PAGE_LOAD_WAIT_SECS", 5)?,
            char_delay: Duration::from_millis(number("MESSAGE_CHAR_DELAY_MS", 100)?),
            login_wait: secs("LOGIN_WAIT_SECS", 60)?,
        };

        let whatsapp = WhatsAppSettings {
            csv_folder: PathBuf::from(text("WHATSAPP_CSV_FOLDER", "data")),
            contacted_file: PathBuf::from(text("WHATSAPP_CONTACTED_CSV", "contacted.csv")),
            message: text("WHATSAPP_MESSAGE", DEFAULT_WHATSAPP_MESSAGE),
            phone_column: text("WHATSAPP_PHONE_COLUMN", "phone number"),
            cooldown: secs("WHATSAPP_COOLDOWN_SECS", 5)?,
            prune_after_send: flag("WHATSAPP_PRUNE_AFTER_SEND", true)?,
        };

        let instagram = InstagramSettings {
            usernames_file: PathBuf::from(text("INSTAGRAM_USERNAMES_FILE", "usernames.csv")),
            messaged_file: PathBuf::from(text("INSTAGRAM_MESSAGED_FILE", "messaged.csv")),
            message: text("INSTAGRAM_MESSAGE", DEFAULT_INSTAGRAM_MESSAGE),
            cooldown: secs("INSTAGRAM_COOLDOWN_SECS", 2)?,
            prune_after_send: flag("INSTAGRAM_PRUNE_AFTER_SEND", true)?,
        };

        Ok(AppConfig {
            email,
            sheets,
            generation,
            browser,
            whatsapp,
            instagram,
        })
    }
}

// ------------------------------------------------------------------
// Helpers de lectura del entorno
// ------------------------------------------------------------------

fn text(key: &str, default: &str) -> String {
    env::var(key)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn number<T: FromStr>(key: &str, default: T) -> OutreachResult<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| OutreachError::Config(format!("{} has invalid value '{}'", key, raw))),
        _ => Ok(default),
    }
}

fn secs(key: &str, default: u64) -> OutreachResult<Duration> {
    number(key, default).map(Duration::from_secs)
}

fn flag(key: &str, default: bool) -> OutreachResult<bool> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(OutreachError::Config(format!(
                "{} has invalid value '{}'",
                key, raw
            ))),
        },
        _ => Ok(default),
    }
}

fn list(key: &str, sep: char) -> Vec<String> {
    env::var(key)
        .unwrap_or_default()
        .split(sep)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

//! services/generation_service.rs
//! Redacción de correos con Gemini (REST `generateContent`) a partir de los datos de la fila.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

use crate::config::app_config::GenerationSettings;
use crate::error::{OutreachError, OutreachResult};
use crate::models::target_model::{Column, RowView};

pub const REQUIRED_GENERATION_COLUMNS: [Column; 7] = [
    Column::ReadForBody,
    Column::Name,
    Column::Company,
    Column::Website,
    Column::Body,
    Column::Subject,
    Column::Sent,
];

const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Datos de la fila que alimentan el prompt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadDetails {
    pub name: String,
    pub title: String,
    pub company: String,
    pub website: String,
    pub domain: String,
    pub issues: String,
    pub keywords: String,
}

impl LeadDetails {
    pub fn from_row(row: &RowView<'_>) -> Self {
        let website = row.get(Column::Website).to_string();
        let domain = if website.is_empty() {
            String::new()
        } else {
            extract_domain(&website)
        };
        Self {
            name: row.get(Column::Name).to_string(),
            title: row.get(Column::Title).to_string(),
            company: row.get(Column::Company).to_string(),
            website,
            domain,
            issues: row.get(Column::Issues).to_string(),
            keywords: row.get(Column::Keywords).to_string(),
        }
    }

    /// El nombre es opcional (se saluda con "Hi,"); empresa y web no
    pub fn is_complete(&self) -> bool {
        !self.company.is_empty() && !self.website.is_empty()
    }
}

pub fn extract_domain(url: &str) -> String {
    let url = url.trim();
    let without_scheme = match url.find("://") {
        Some(pos) => &url[pos + 3..],
        None => url,
    };
    let end = without_scheme
        .find(['/', '?', '#'])
        .unwrap_or(without_scheme.len());
    let host = &without_scheme[..end];
    if host.is_empty() {
        return url.to_string();
    }
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

pub fn build_user_prompt(lead: &LeadDetails) -> String {
    let greeting_name = if lead.name.trim().is_empty() {
        "Hi,"
    } else {
        lead.name.trim()
    };
    format!(
        "Generate an outreach email with the following details:\n\n\
         Recipient Name: {}\n\
         Title: {}\n\
         Company: {}\n\
         Website: {}\n\
         Domain: {}\n\
         Issues: {}\n\
         Keywords/Services: {}\n\n\
         Follow the template format and guidelines provided in the system prompt.\n\
         IMPORTANT: If Recipient Name is \"Hi,\", start the email body with \"Hi,\" instead of \
         trying to personalize with a specific name. Use \"Hi,\" as the greeting in the email body itself.\n",
        greeting_name,
        lead.title,
        lead.company,
        lead.website,
        lead.domain,
        lead.issues,
        lead.keywords
    )
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len()
        && line.is_char_boundary(prefix.len())
        && line[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

/// "Email   Body:" al inicio de línea; devuelve lo que sigue a la etiqueta
fn strip_body_label(line: &str) -> Option<&str> {
    let rest = strip_prefix_ignore_case(line, "email")?;
    let trimmed = rest.trim_start();
    if trimmed.len() == rest.len() {
        return None;
    }
    strip_prefix_ignore_case(trimmed, "body:")
}

/// Separa asunto y cuerpo del texto generado. El asunto puede venir en la misma
/// línea que "Subject:" o en la siguiente no vacía.
pub fn parse_email_content(content: &str) -> (String, String) {
    let lines: Vec<&str> = content.lines().collect();
    let mut subject = String::new();
    let mut dropped = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let Some(rest) = strip_prefix_ignore_case(line.trim_start(), "subject:") else {
            continue;
        };
        dropped.push(i);
        let rest = rest.trim();
        if !rest.is_empty() {
            subject = rest.to_string();
        } else if let Some((j, next)) = lines
            .iter()
            .enumerate()
            .skip(i + 1)
            .find(|(_, l)| !l.trim().is_empty())
        {
            subject = next.trim().to_string();
            dropped.push(j);
        }
        break;
    }

    let mut body_lines = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if dropped.contains(&i) {
            continue;
        }
        match strip_body_label(line.trim_start()) {
            Some(rest) if rest.trim().is_empty() => {}
            Some(rest) => body_lines.push(rest.trim_start()),
            None => body_lines.push(line),
        }
    }

    (subject, body_lines.join("\n").trim().to_string())
}

#[derive(Clone)]
pub struct GenerationService {
    settings: GenerationSettings,
    http_client: Client,
    prompt: String,
    prompt_path: PathBuf,
}

impl GenerationService {
    /// Necesita API key y un prompt.txt en alguna de las rutas configuradas
    pub fn new(settings: GenerationSettings) -> OutreachResult<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(OutreachError::Config(
                "GEMINI_API_KEY (or GOOGLE_API_KEY) is not set".to_string(),
            ));
        }
        let (prompt_path, prompt) = load_prompt(&settings.prompt_paths)?;
        log::info!("(generation) Prompt cargado desde {:?}", prompt_path);
        Ok(Self {
            settings,
            http_client: Client::new(),
            prompt,
            prompt_path,
        })
    }

    pub fn prompt_path(&self) -> &PathBuf {
        &self.prompt_path
    }

    pub fn api_delay(&self) -> Duration {
        self.settings.api_delay
    }

    /// Texto generado para una fila, con reintentos
    pub async fn generate(&self, lead: &LeadDetails) -> OutreachResult<String> {
        if !lead.is_complete() {
            return Err(OutreachError::Generation(
                "Missing essential data (Company or Website)".to_string(),
            ));
        }
        let user_prompt = build_user_prompt(lead);

        let mut attempt = 0;
        loop {
            match self.call_model(&user_prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.settings.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "(generate) Error para '{}', reintento {}/{}: {}",
                        lead.company,
                        attempt,
                        self.settings.max_retries,
                        e
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_model(&self, user_prompt: &str) -> OutreachResult<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.model
        );
        let payload = json!({
            "systemInstruction": { "parts": [{ "text": self.prompt }] },
            "contents": [{ "role": "user", "parts": [{ "text": user_prompt }] }],
            "generationConfig": { "temperature": self.settings.temperature },
        });

        let resp = self
            .http_client
            .post(&url)
            .query(&[("key", self.settings.api_key.as_str())])
            .json(&payload)
            .send()
            .await
            .map_err(|e| OutreachError::Generation(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body_txt = resp.text().await.unwrap_or_default();
            return Err(OutreachError::Generation(format!(
                "status {}: {}",
                status.as_u16(),
                body_txt.trim()
            )));
        }
        let json_val = resp
            .json::<Value>()
            .await
            .map_err(|e| OutreachError::Generation(format!("invalid JSON: {}", e)))?;
        response_text(&json_val)
            .ok_or_else(|| OutreachError::Generation("empty model response".to_string()))
    }
}

/// Concatena `candidates[0].content.parts[*].text`
pub fn response_text(json_val: &Value) -> Option<String> {
    let parts = json_val.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

pub fn load_prompt(paths: &[PathBuf]) -> OutreachResult<(PathBuf, String)> {
    for path in paths {
        if path.is_file() {
            let prompt = std::fs::read_to_string(path).map_err(|e| {
                OutreachError::Config(format!("reading prompt {}: {}", path.display(), e))
            })?;
            return Ok((path.clone(), prompt));
        }
    }
    let searched: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    Err(OutreachError::Config(format!(
        "prompt.txt file not found. Searched: {}",
        searched.join(", ")
    )))
}

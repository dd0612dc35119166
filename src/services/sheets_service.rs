//! services/sheets_service.rs
//! Google Sheets (REST v4) como fuente de destinatarios y destino de contenido generado.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::config::app_config::SheetsSettings;
use crate::error::{OutreachError, OutreachResult};
use crate::models::identity_model::IdentityKind;
use crate::models::target_model::{Column, RowRef, SheetLayout, Target};
use crate::services::source_service::TargetSource;

/// Columnas mínimas de una hoja de envío de correos
pub const REQUIRED_SEND_COLUMNS: [Column; 5] = [
    Column::Status,
    Column::Email,
    Column::Subject,
    Column::Body,
    Column::Sent,
];

/// Acepta la URL completa o el ID suelto
pub fn extract_sheet_id(url: &str) -> String {
    const MARKER: &str = "/spreadsheets/d/";
    let url = url.trim();
    match url.find(MARKER) {
        Some(pos) => {
            let rest = &url[pos + MARKER.len()..];
            let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
            rest[..end].to_string()
        }
        None => url.to_string(),
    }
}

/// Rango A1 con el nombre de hoja entre comillas simples
pub fn a1_range(sheet: &str, cell: &str) -> String {
    format!("'{}'!{}", sheet.replace('\'', "''"), cell)
}

/// Valores de una hoja ya leídos, con su layout validado
#[derive(Debug, Clone)]
pub struct Worksheet {
    pub spreadsheet_id: String,
    pub title: String,
    pub layout: SheetLayout,
    /// Filas de datos (sin el encabezado); la fila i está en la fila i + 2 de la hoja
    pub rows: Vec<Vec<String>>,
}

impl Worksheet {
    pub fn from_values(
        spreadsheet_id: &str,
        title: &str,
        mut values: Vec<Vec<String>>,
        required: &[Column],
    ) -> OutreachResult<Self> {
        if values.is_empty() {
            values.push(Vec::new());
        }
        let rows = values.split_off(1);
        let headers = values.remove(0);
        let layout = SheetLayout::from_headers(title, &headers, required)?;
        Ok(Self {
            spreadsheet_id: spreadsheet_id.to_string(),
            title: title.to_string(),
            layout,
            rows,
        })
    }

    pub fn row_number(index: usize) -> usize {
        index + 2
    }

    /// Celda A1 de una columna lógica en una fila de la hoja
    pub fn cell(&self, column: Column, row: usize) -> Option<String> {
        self.layout
            .letter(column)
            .map(|letter| format!("{}{}", letter, row))
    }
}

#[derive(Clone)]
pub struct SheetsService {
    settings: SheetsSettings,
    http_client: Client,
}

impl SheetsService {
    pub fn new(settings: SheetsSettings) -> Self {
        Self {
            settings,
            http_client: Client::new(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.settings.access_token.trim().is_empty()
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        format!(
            "{}/spreadsheets/{}/values/{}",
            self.settings.api_base.trim_end_matches('/'),
            spreadsheet_id,
            urlencoding::encode(range)
        )
    }

    async fn get_json(&self, url: &str, location: &str) -> OutreachResult<Value> {
        let resp = self
            .http_client
            .get(url)
            .bearer_auth(&self.settings.access_token)
            .send()
            .await
            .map_err(|e| OutreachError::Source(format!("{}: {}", location, e)))?;
        let resp = check_response(resp, location).await?;
        resp.json::<Value>()
            .await
            .map_err(|e| OutreachError::Source(format!("{}: invalid JSON: {}", location, e)))
    }

    /// Títulos de las hojas del documento, en orden
    pub async fn list_worksheets(&self, spreadsheet_id: &str) -> OutreachResult<Vec<String>> {
        let url = format!(
            "{}/spreadsheets/{}?fields=sheets.properties.title",
            self.settings.api_base.trim_end_matches('/'),
            spreadsheet_id
        );
        let json_val = self.get_json(&url, spreadsheet_id).await?;
        let titles = json_val
            .get("sheets")
            .and_then(|v| v.as_array())
            .map(|sheets| {
                sheets
                    .iter()
                    .filter_map(|s| s.pointer("/properties/title").and_then(|t| t.as_str()))
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        log::info!(
            "(list_worksheets) {} hojas en {}",
            titles.len(),
            spreadsheet_id
        );
        Ok(titles)
    }

    pub async fn read_values(
        &self,
        spreadsheet_id: &str,
        sheet: &str,
    ) -> OutreachResult<Vec<Vec<String>>> {
        let range = format!("'{}'", sheet.replace('\'', "''"));
        let url = self.values_url(spreadsheet_id, &range);
        let json_val = self.get_json(&url, sheet).await?;
        Ok(values_from_json(&json_val))
    }

    /// Lee y valida todas las hojas. Una hoja inválida no invalida el documento:
    /// se devuelve su error junto al título.
    pub async fn load_worksheets(
        &self,
        spreadsheet_id: &str,
        required: &[Column],
    ) -> OutreachResult<Vec<(String, OutreachResult<Worksheet>)>> {
        let mut loaded = Vec::new();
        for title in self.list_worksheets(spreadsheet_id).await? {
            let result = match self.read_values(spreadsheet_id, &title).await {
                Ok(values) => Worksheet::from_values(spreadsheet_id, &title, values, required),
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                log::error!("(load_worksheets) Hoja '{}' omitida: {}", title, e);
            }
            loaded.push((title, result));
        }
        Ok(loaded)
    }

    pub async fn update_cell(
        &self,
        spreadsheet_id: &str,
        sheet: &str,
        cell: &str,
        value: &str,
    ) -> OutreachResult<()> {
        let range = a1_range(sheet, cell);
        let url = format!("{}?valueInputOption=RAW", self.values_url(spreadsheet_id, &range));
        let payload = json!({ "range": range, "values": [[value]] });

        let location = format!("{}!{}", sheet, cell);
        let resp = self
            .http_client
            .put(&url)
            .bearer_auth(&self.settings.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| OutreachError::Source(format!("{}: {}", location, e)))?;
        check_response(resp, &location).await?;
        Ok(())
    }

    /// Varias celdas de una hoja en una sola llamada (contenido generado)
    pub async fn update_cells(
        &self,
        spreadsheet_id: &str,
        sheet: &str,
        updates: &[(String, String)],
    ) -> OutreachResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let data: Vec<Value> = updates
            .iter()
            .map(|(cell, value)| json!({ "range": a1_range(sheet, cell), "values": [[value]] }))
            .collect();
        let url = format!(
            "{}/spreadsheets/{}/values:batchUpdate",
            self.settings.api_base.trim_end_matches('/'),
            spreadsheet_id
        );
        let payload = json!({ "valueInputOption": "RAW", "data": data });

        let resp = self
            .http_client
            .post(&url)
            .bearer_auth(&self.settings.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| OutreachError::Source(format!("{}: {}", sheet, e)))?;
        check_response(resp, sheet).await?;
        Ok(())
    }
}

async fn check_response(resp: reqwest::Response, location: &str) -> OutreachResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body_txt = resp.text().await.unwrap_or_default();
    log::error!(
        "(sheets) {} respondió status={} body='{}'",
        location,
        status,
        body_txt
    );
    Err(classify_failure(status, &body_txt, location))
}

/// 403 o celdas protegidas: permiso. Cualquier otro fallo: error de fuente.
pub fn classify_failure(status: StatusCode, body: &str, location: &str) -> OutreachError {
    let lowered = body.to_lowercase();
    if status == StatusCode::FORBIDDEN || lowered.contains("protected") {
        OutreachError::Permission {
            location: location.to_string(),
            message: format!("status {}: {}", status.as_u16(), body.trim()),
        }
    } else {
        OutreachError::Source(format!("{}: status {}: {}", location, status.as_u16(), body.trim()))
    }
}

pub fn values_from_json(json_val: &Value) -> Vec<Vec<String>> {
    json_val
        .get("values")
        .and_then(|v| v.as_array())
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|cells| cells.iter().map(cell_text).collect())
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Una hoja de cálculo como fuente del driver de envío de correos
pub struct WorksheetSource {
    sheets: SheetsService,
    worksheet: Worksheet,
    name: String,
}

impl WorksheetSource {
    pub fn new(sheets: SheetsService, worksheet: Worksheet) -> Self {
        let name = worksheet.title.clone();
        Self {
            sheets,
            worksheet,
            name,
        }
    }

    pub fn worksheet(&self) -> &Worksheet {
        &self.worksheet
    }

    /// Reescribe el valor actual de la celda "enviado" de la primera fila de datos.
    /// Detecta hojas protegidas antes de enviar nada.
    pub async fn probe_write_access(&self) -> OutreachResult<()> {
        let ws = &self.worksheet;
        let Some(first) = ws.rows.first() else {
            return Ok(());
        };
        let row = Worksheet::row_number(0);
        let Some(cell) = ws.cell(Column::Sent, row) else {
            return Ok(());
        };
        let current = ws.layout.row(first).get(Column::Sent).to_string();
        self.sheets
            .update_cell(&ws.spreadsheet_id, &ws.title, &cell, &current)
            .await
    }
}

#[async_trait]
impl TargetSource for WorksheetSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_targets(&self) -> OutreachResult<Vec<Target>> {
        let ws = &self.worksheet;
        let targets = ws
            .rows
            .iter()
            .enumerate()
            .filter_map(|(idx, cells)| {
                let row = ws.layout.row(cells);
                if row.is_blank() {
                    return None;
                }
                let row_ref = RowRef {
                    sheet: ws.title.clone(),
                    row: Worksheet::row_number(idx),
                };
                Some(Target::from_row(&row, row_ref, IdentityKind::Email, None))
            })
            .collect();
        Ok(targets)
    }

    async fn mark_sent(&self, target: &Target) -> OutreachResult<()> {
        let ws = &self.worksheet;
        let Some(cell) = ws.cell(Column::Sent, target.row_ref.row) else {
            log::warn!("(mark_sent) '{}' no tiene columna de enviado", ws.title);
            return Ok(());
        };
        self.sheets
            .update_cell(&ws.spreadsheet_id, &ws.title, &cell, "True")
            .await?;
        log::info!("(mark_sent) {} marcado como enviado", target.row_ref);
        Ok(())
    }
}

//! handlers/generation_handler.rs
//! Completa Subject/Body de las filas con "Read For Body?" = Approved.

use anyhow::{bail, Context, Result};

use crate::config::app_config::AppConfig;
use crate::models::target_model::{ApprovalStatus, Column};
use crate::services::generation_service::{
    parse_email_content, GenerationService, LeadDetails, REQUIRED_GENERATION_COLUMNS,
};
use crate::services::sheets_service::{extract_sheet_id, SheetsService, Worksheet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl GenerationReport {
    pub fn render(&self) -> Vec<String> {
        let mut lines = vec![
            "Summary:".to_string(),
            format!("   Emails generated: {}", self.generated),
            format!("   Skipped (missing Company or Website): {}", self.skipped),
            format!("   Failed: {}", self.failed),
        ];
        for err in &self.errors {
            lines.push(format!("   ERROR {}", err));
        }
        lines
    }
}

pub async fn generate_bodies(config: &AppConfig, urls: &[String]) -> Result<GenerationReport> {
    let sheets = SheetsService::new(config.sheets.clone());
    if !sheets.has_credentials() {
        bail!("GOOGLE_SHEETS_ACCESS_TOKEN must be set");
    }
    let generator = GenerationService::new(config.generation.clone())
        .context("No se pudo inicializar el generador")?;

    let mut report = GenerationReport::default();
    for url in urls {
        let spreadsheet_id = extract_sheet_id(url);
        let loaded = match sheets
            .load_worksheets(&spreadsheet_id, &REQUIRED_GENERATION_COLUMNS)
            .await
        {
            Ok(loaded) => loaded,
            Err(e) => {
                report.errors.push(format!("{}: {}", spreadsheet_id, e));
                continue;
            }
        };
        for (title, result) in loaded {
            match result {
                Ok(ws) => generate_for_worksheet(&sheets, &generator, &ws, &mut report).await,
                Err(e) => report.errors.push(format!("{}: {}", title, e)),
            }
        }
    }
    Ok(report)
}

async fn generate_for_worksheet(
    sheets: &SheetsService,
    generator: &GenerationService,
    ws: &Worksheet,
    report: &mut GenerationReport,
) {
    log::info!("(generate_bodies) Procesando hoja '{}'", ws.title);
    if ws.rows.is_empty() {
        log::info!("(generate_bodies) '{}' no tiene datos", ws.title);
        return;
    }

    for (idx, cells) in ws.rows.iter().enumerate() {
        let row = ws.layout.row(cells);
        if !ApprovalStatus::parse(row.get(Column::ReadForBody)).is_approved() {
            continue;
        }
        let row_number = Worksheet::row_number(idx);
        let lead = LeadDetails::from_row(&row);
        if !lead.is_complete() {
            log::warn!(
                "(generate_bodies) Fila {}: falta Company o Website, se omite",
                row_number
            );
            report.skipped += 1;
            continue;
        }

        log::info!("(generate_bodies) Fila {}: {}", row_number, lead.company);
        let content = match generator.generate(&lead).await {
            Ok(content) => content,
            Err(e) => {
                log::error!("(generate_bodies) Fila {}: {}", row_number, e);
                report.failed += 1;
                continue;
            }
        };

        let (subject, body) = parse_email_content(&content);
        if subject.is_empty() {
            log::warn!("(generate_bodies) Fila {}: no se encontró asunto", row_number);
        }
        let mut updates = Vec::new();
        for (column, value) in [(Column::Body, body), (Column::Subject, subject)] {
            if value.is_empty() {
                continue;
            }
            if let Some(cell) = ws.cell(column, row_number) {
                updates.push((cell, value));
            }
        }

        match sheets
            .update_cells(&ws.spreadsheet_id, &ws.title, &updates)
            .await
        {
            Ok(()) => report.generated += 1,
            Err(e) if e.halts_batch() => {
                log::error!("(generate_bodies) '{}' protegida: {}", ws.title, e);
                report.failed += 1;
                report.errors.push(format!("{}: {}", ws.title, e));
                return;
            }
            Err(e) => {
                log::error!("(generate_bodies) Fila {}: {}", row_number, e);
                report.failed += 1;
            }
        }

        // Rate limit de la API
        tokio::time::sleep(generator.api_delay()).await;
    }
}

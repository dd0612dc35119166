//! models/target_model.rs
//! Vista tipada de las filas (hoja de cálculo o CSV) y el destinatario que se deriva de ellas.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{OutreachError, OutreachResult};
use crate::models::identity_model::IdentityKind;

/// Valores que cuentan como "ya enviado"
pub const SENT_TRUTHY_VALUES: [&str; 3] = ["true", "yes", "1"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Unset,
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "" => ApprovalStatus::Unset,
            "approved" => ApprovalStatus::Approved,
            "rejected" => ApprovalStatus::Rejected,
            // "pending" y cualquier otro valor: no aprobado
            _ => ApprovalStatus::Pending,
        }
    }

    pub fn is_approved(self) -> bool {
        self == ApprovalStatus::Approved
    }
}

pub fn is_truthy(raw: &str) -> bool {
    let value = raw.trim().to_lowercase();
    SENT_TRUTHY_VALUES.contains(&value.as_str())
}

/// Columnas lógicas que el proceso entiende; cada una acepta varios encabezados.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Status,
    Sent,
    Email,
    Phone,
    Username,
    Subject,
    Body,
    Name,
    Company,
    Website,
    Title,
    Issues,
    Keywords,
    ReadForBody,
}

impl Column {
    pub const ALL: [Column; 14] = [
        Column::Status,
        Column::Sent,
        Column::Email,
        Column::Phone,
        Column::Username,
        Column::Subject,
        Column::Body,
        Column::Name,
        Column::Company,
        Column::Website,
        Column::Title,
        Column::Issues,
        Column::Keywords,
        Column::ReadForBody,
    ];

    /// Encabezados aceptados, ya en minúsculas
    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            Column::Status => &["status", "approved", "approved?", "approval"],
            Column::Sent => &["sent?", "issent?", "is sent?", "issent", "sent"],
            Column::Email => &["email", "email address", "e-mail"],
            Column::Phone => &["phone number", "phone", "phone_number", "number"],
            Column::Username => &["username", "handle", "user"],
            Column::Subject => &["subject"],
            Column::Body => &["body"],
            Column::Name => &["name"],
            Column::Company => &["company"],
            Column::Website => &["website", "url"],
            Column::Title => &["title"],
            Column::Issues => &["issues"],
            Column::Keywords => &["keywords"],
            Column::ReadForBody => &["read for body?", "read for body"],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Column::Status => "Status",
            Column::Sent => "SENT?",
            Column::Email => "Email",
            Column::Phone => "phone number",
            Column::Username => "username",
            Column::Subject => "Subject",
            Column::Body => "Body",
            Column::Name => "Name",
            Column::Company => "Company",
            Column::Website => "Website",
            Column::Title => "Title",
            Column::Issues => "ISSUES",
            Column::Keywords => "Keywords",
            Column::ReadForBody => "Read For Body?",
        }
    }

    pub fn for_identity(kind: IdentityKind) -> Column {
        match kind {
            IdentityKind::Email => Column::Email,
            IdentityKind::Phone => Column::Phone,
            IdentityKind::Handle => Column::Username,
        }
    }
}

/// Convierte número de columna (1-based) en letra A1: 1 -> A, 27 -> AA
pub fn column_letter(mut col_num: usize) -> String {
    let mut letters = Vec::new();
    while col_num > 0 {
        col_num -= 1;
        letters.push((b'A' + (col_num % 26) as u8) as char);
        col_num /= 26;
    }
    letters.iter().rev().collect()
}

/// Encabezados de una hoja validados una sola vez.
#[derive(Debug, Clone)]
pub struct SheetLayout {
    pub sheet: String,
    pub headers: Vec<String>,
    columns: HashMap<Column, usize>,
}

impl SheetLayout {
    pub fn from_headers(
        sheet: &str,
        headers: &[String],
        required: &[Column],
    ) -> OutreachResult<Self> {
        // 1) Encabezados duplicados: se rechaza la hoja (los vacíos se ignoran)
        let mut seen: HashSet<String> = HashSet::new();
        for header in headers {
            let key = header.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            if !seen.insert(key) {
                return Err(OutreachError::DuplicateHeader {
                    sheet: sheet.to_string(),
                    header: header.clone(),
                });
            }
        }

        // 2) Mapear columnas lógicas, en orden de preferencia de sinónimos
        let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let mut columns = HashMap::new();
        for column in Column::ALL {
            let found = column
                .synonyms()
                .iter()
                .find_map(|syn| normalized.iter().position(|h| h == syn));
            if let Some(idx) = found {
                columns.insert(column, idx);
            }
        }

        // 3) Columnas obligatorias
        let missing: Vec<String> = required
            .iter()
            .filter(|col| !columns.contains_key(col))
            .map(|col| col.label().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(OutreachError::MissingColumn {
                sheet: sheet.to_string(),
                columns: missing,
            });
        }

        Ok(Self {
            sheet: sheet.to_string(),
            headers: headers.to_vec(),
            columns,
        })
    }

    pub fn index(&self, column: Column) -> Option<usize> {
        self.columns.get(&column).copied()
    }

    pub fn has(&self, column: Column) -> bool {
        self.columns.contains_key(&column)
    }

    /// Letra A1 de la columna, si existe
    pub fn letter(&self, column: Column) -> Option<String> {
        self.index(column).map(|idx| column_letter(idx + 1))
    }

    pub fn row<'a>(&'a self, cells: &'a [String]) -> RowView<'a> {
        RowView {
            layout: self,
            cells,
        }
    }
}

/// Acceso tipado a una fila; celdas faltantes al final se leen como "".
pub struct RowView<'a> {
    layout: &'a SheetLayout,
    cells: &'a [String],
}

impl<'a> RowView<'a> {
    pub fn get(&self, column: Column) -> &'a str {
        self.layout
            .index(column)
            .and_then(|idx| self.cells.get(idx))
            .map(|cell| cell.trim())
            .unwrap_or("")
    }

    /// Sin columna de estado, toda fila se considera aprobada
    pub fn approval(&self) -> ApprovalStatus {
        if self.layout.has(Column::Status) {
            ApprovalStatus::parse(self.get(Column::Status))
        } else {
            ApprovalStatus::Approved
        }
    }

    pub fn sent_flag(&self) -> bool {
        is_truthy(self.get(Column::Sent))
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|cell| cell.trim().is_empty())
    }
}

/// Referencia estable a la fila en la fuente: hoja + número de fila (1 = encabezado)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowRef {
    pub sheet: String,
    pub row: usize,
}

impl std::fmt::Display for RowRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}!{}", self.sheet, self.row)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub row_ref: RowRef,
    pub kind: IdentityKind,
    /// Identidad tal cual viene en la fuente (sin normalizar)
    pub identity: String,
    pub approval: ApprovalStatus,
    pub sent: bool,
    pub name: String,
    pub subject: Option<String>,
    pub body: String,
}

impl Target {
    pub fn from_row(
        row: &RowView<'_>,
        row_ref: RowRef,
        kind: IdentityKind,
        default_body: Option<&str>,
    ) -> Self {
        let subject = if kind == IdentityKind::Email {
            Some(row.get(Column::Subject).to_string())
        } else {
            None
        };

        let row_body = row.get(Column::Body);
        let body = if !row_body.is_empty() {
            row_body.to_string()
        } else {
            default_body.unwrap_or_default().trim().to_string()
        };

        Target {
            row_ref,
            kind,
            identity: row.get(Column::for_identity(kind)).to_string(),
            approval: row.approval(),
            sent: row.sent_flag(),
            name: row.get(Column::Name).to_string(),
            subject,
            body,
        }
    }

    /// Campos obligatorios vacíos (identidad, asunto si aplica, cuerpo)
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.identity.trim().is_empty() {
            missing.push(self.kind.label().to_string());
        }
        if let Some(subject) = &self.subject {
            if subject.trim().is_empty() {
                missing.push("Subject".to_string());
            }
        }
        if self.body.trim().is_empty() {
            missing.push("Body".to_string());
        }
        missing
    }
}

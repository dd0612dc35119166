//! services/csv_source_service.rs
//! Fuentes locales en CSV: carpeta de contactos (WhatsApp) y archivo de usuarios (Instagram).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{OutreachError, OutreachResult};
use crate::models::identity_model::IdentityKind;
use crate::models::target_model::{Column, RowRef, SheetLayout, Target};
use crate::services::source_service::TargetSource;

pub const DUPLICATE_REPORT_FILE: &str = "duplicate_report.csv";

/// Contenido crudo de un CSV: encabezados + filas
#[derive(Debug, Clone)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn read(path: &Path) -> OutreachResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| OutreachError::Source(format!("{}: {}", path.display(), e)))?;
        let headers = reader
            .headers()
            .map_err(|e| OutreachError::Source(format!("{}: {}", path.display(), e)))?
            .iter()
            .map(|h| h.to_string())
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| OutreachError::Source(format!("{}: {}", path.display(), e)))?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }
        Ok(Self { headers, rows })
    }

    /// Reescribe el archivo vía un temporal + rename
    pub fn write(&self, path: &Path) -> OutreachResult<()> {
        let tmp = path.with_extension("csv.tmp");
        let io_err = |e: &dyn std::fmt::Display| {
            OutreachError::Source(format!("writing {}: {}", path.display(), e))
        };
        {
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_path(&tmp)
                .map_err(|e| io_err(&e))?;
            writer.write_record(&self.headers).map_err(|e| io_err(&e))?;
            for row in &self.rows {
                writer.write_record(row).map_err(|e| io_err(&e))?;
            }
            writer.flush().map_err(|e| io_err(&e))?;
        }
        fs::rename(&tmp, path).map_err(|e| io_err(&e))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_lowercase();
        self.headers
            .iter()
            .position(|h| h.trim().to_lowercase() == wanted)
    }

    /// Quita las filas cuya identidad normalizada está en `delivered`
    fn retain_undelivered(
        &mut self,
        column: usize,
        kind: IdentityKind,
        delivered: &HashSet<&str>,
    ) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| {
            let raw = row.get(column).map(String::as_str).unwrap_or("");
            match kind.normalize(raw) {
                Ok(key) => !delivered.contains(key.as_str()),
                Err(_) => true,
            }
        });
        before - self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateEntry {
    pub normalized_number: String,
    pub file: String,
    pub row: usize,
    pub original_number: String,
}

// --------------------------------------------------------------------------------
// Carpeta de CSV con números de teléfono
// --------------------------------------------------------------------------------

pub struct CsvFolderSource {
    folder: PathBuf,
    phone_column: String,
    default_body: String,
    name: String,
}

impl CsvFolderSource {
    pub fn new(folder: impl AsRef<Path>, phone_column: &str, default_body: &str) -> Self {
        let folder = folder.as_ref().to_path_buf();
        let name = folder.display().to_string();
        Self {
            folder,
            phone_column: phone_column.to_string(),
            default_body: default_body.to_string(),
            name,
        }
    }

    pub fn report_path(&self) -> PathBuf {
        self.folder.join(DUPLICATE_REPORT_FILE)
    }

    /// Archivos `*.csv` de la carpeta, ordenados (sin el reporte de duplicados)
    pub fn csv_files(&self) -> OutreachResult<Vec<PathBuf>> {
        if !self.folder.is_dir() {
            return Err(OutreachError::Source(format!(
                "Folder {} does not exist",
                self.folder.display()
            )));
        }
        let entries = fs::read_dir(&self.folder)
            .map_err(|e| OutreachError::Source(format!("{}: {}", self.folder.display(), e)))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension().map(|ext| ext == "csv").unwrap_or(false)
                    && path.file_name().map(|n| n != DUPLICATE_REPORT_FILE).unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Carga todos los contactos. El primer archivo/fila en que aparece un número
    /// lo conserva; las repeticiones van al reporte de duplicados.
    pub fn load(&self) -> OutreachResult<(Vec<Target>, Vec<DuplicateEntry>)> {
        let mut targets = Vec::new();
        let mut duplicates = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let files = self.csv_files()?;
        if files.is_empty() {
            log::warn!("(load_contacts) No hay archivos CSV en {}", self.folder.display());
        }

        for path in files {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let table = match CsvTable::read(&path) {
                Ok(table) => table,
                Err(e) => {
                    log::error!("(load_contacts) Error leyendo {}: {}", file_name, e);
                    continue;
                }
            };
            let Some(phone_idx) = table.column_index(&self.phone_column) else {
                log::warn!(
                    "(load_contacts) Omitiendo {} - columna '{}' no encontrada",
                    file_name,
                    self.phone_column
                );
                continue;
            };
            let layout = match SheetLayout::from_headers(&file_name, &table.headers, &[]) {
                Ok(layout) => layout,
                Err(e) => {
                    log::error!("(load_contacts) Omitiendo {}: {}", file_name, e);
                    continue;
                }
            };

            let mut added = 0;
            let mut filtered = 0;
            for (i, cells) in table.rows.iter().enumerate() {
                let row = layout.row(cells);
                if row.is_blank() {
                    continue;
                }
                let raw = cells.get(phone_idx).map(|c| c.trim()).unwrap_or("");
                let row_ref = RowRef {
                    sheet: file_name.clone(),
                    row: i + 2,
                };
                let mut target =
                    Target::from_row(&row, row_ref, IdentityKind::Phone, Some(&self.default_body));
                target.identity = raw.to_string();

                match IdentityKind::Phone.normalize(raw) {
                    Ok(key) if !seen.insert(key.clone()) => {
                        filtered += 1;
                        duplicates.push(DuplicateEntry {
                            normalized_number: key,
                            file: file_name.clone(),
                            row: i + 2,
                            original_number: raw.to_string(),
                        });
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // Se conserva: el driver lo reporta como fallo permanente
                        log::warn!("(load_contacts) {} fila {}: {}", file_name, i + 2, e);
                    }
                }
                targets.push(target);
                added += 1;
            }
            log::info!(
                "(load_contacts) {} contactos de {} ({} duplicados filtrados)",
                added,
                file_name,
                filtered
            );
        }

        log::info!(
            "(load_contacts) Total: {} contactos únicos, {} duplicados",
            targets.len(),
            duplicates.len()
        );
        if !duplicates.is_empty() {
            self.write_duplicate_report(&duplicates)?;
        }
        Ok((targets, duplicates))
    }

    fn write_duplicate_report(&self, duplicates: &[DuplicateEntry]) -> OutreachResult<()> {
        let path = self.report_path();
        let io_err = |e: &dyn std::fmt::Display| {
            OutreachError::Source(format!("writing {}: {}", path.display(), e))
        };
        let mut writer = csv::Writer::from_path(&path).map_err(|e| io_err(&e))?;
        for entry in duplicates {
            writer.serialize(entry).map_err(|e| io_err(&e))?;
        }
        writer.flush().map_err(|e| io_err(&e))?;
        log::info!("(load_contacts) Reporte de duplicados en {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl TargetSource for CsvFolderSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_targets(&self) -> OutreachResult<Vec<Target>> {
        self.load().map(|(targets, _)| targets)
    }

    /// Los CSV no tienen columna de enviado; el ledger es el registro
    async fn mark_sent(&self, _target: &Target) -> OutreachResult<()> {
        Ok(())
    }

    async fn prune_delivered(&self, identities: &[String]) -> OutreachResult<usize> {
        let delivered: HashSet<&str> = identities.iter().map(String::as_str).collect();
        if delivered.is_empty() {
            return Ok(0);
        }

        let mut total = 0;
        for path in self.csv_files()? {
            let mut table = match CsvTable::read(&path) {
                Ok(table) => table,
                Err(e) => {
                    log::error!("(prune_delivered) {}", e);
                    continue;
                }
            };
            let Some(phone_idx) = table.column_index(&self.phone_column) else {
                continue;
            };
            let removed = table.retain_undelivered(phone_idx, IdentityKind::Phone, &delivered);
            if removed > 0 {
                table.write(&path)?;
                log::info!(
                    "(prune_delivered) {} contactos eliminados de {}",
                    removed,
                    path.display()
                );
                total += removed;
            }
        }
        Ok(total)
    }
}

// --------------------------------------------------------------------------------
// Archivo de usuarios de Instagram
// --------------------------------------------------------------------------------

pub struct UsernameFileSource {
    path: PathBuf,
    default_body: String,
    name: String,
}

impl UsernameFileSource {
    pub fn new(path: impl AsRef<Path>, default_body: &str) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path.display().to_string();
        Self {
            path,
            default_body: default_body.to_string(),
            name,
        }
    }

    fn read_layout(&self) -> OutreachResult<(CsvTable, SheetLayout)> {
        let table = CsvTable::read(&self.path)?;
        let layout = SheetLayout::from_headers(&self.name, &table.headers, &[Column::Username])?;
        Ok((table, layout))
    }
}

#[async_trait]
impl TargetSource for UsernameFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_targets(&self) -> OutreachResult<Vec<Target>> {
        let (table, layout) = self.read_layout()?;
        let mut targets = Vec::new();
        for (i, cells) in table.rows.iter().enumerate() {
            let row = layout.row(cells);
            if row.is_blank() {
                continue;
            }
            let row_ref = RowRef {
                sheet: self.name.clone(),
                row: i + 2,
            };
            targets.push(Target::from_row(
                &row,
                row_ref,
                IdentityKind::Handle,
                Some(&self.default_body),
            ));
        }
        log::info!("(load_usernames) {} usuarios en {}", targets.len(), self.name);
        Ok(targets)
    }

    async fn mark_sent(&self, _target: &Target) -> OutreachResult<()> {
        Ok(())
    }

    async fn prune_delivered(&self, identities: &[String]) -> OutreachResult<usize> {
        let delivered: HashSet<&str> = identities.iter().map(String::as_str).collect();
        if delivered.is_empty() {
            return Ok(0);
        }
        let (mut table, layout) = self.read_layout()?;
        let Some(idx) = layout.index(Column::Username) else {
            return Ok(0);
        };
        let removed = table.retain_undelivered(idx, IdentityKind::Handle, &delivered);
        if removed > 0 {
            table.write(&self.path)?;
            log::info!(
                "(prune_delivered) {} usuarios eliminados de {}",
                removed,
                self.name
            );
        }
        Ok(removed)
    }
}

//! services/ledger_service.rs
//! Ledger persistente de identidades ya contactadas (CSV append-only).
//! Garantía: como mucho un envío exitoso por identidad normalizada entre reinicios,
//! salvo una caída entre "transporte OK" y "registro escrito".

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::error::{OutreachError, OutreachResult};
use crate::models::identity_model::IdentityKind;

pub const LEDGER_HEADER: [&str; 2] = ["identity", "timestamp"];

/// Encabezados de ledgers existentes; "username" también es un handle válido
const KNOWN_HEADER_CELLS: [&str; 4] = ["identity", "username", "phone number", "email"];

/// `true` si el archivo tiene contenido y su último byte no es `\n`
fn lacks_trailing_newline(path: &Path) -> bool {
    let Ok(mut file) = File::open(path) else {
        return false;
    };
    if file.seek(SeekFrom::End(-1)).is_err() {
        return false;
    }
    let mut last = [0u8; 1];
    file.read_exact(&mut last).is_ok() && last[0] != b'\n'
}

fn is_header_cell(cell: &str) -> bool {
    let cell = cell.trim();
    KNOWN_HEADER_CELLS
        .iter()
        .any(|h| cell.eq_ignore_ascii_case(h))
}

#[derive(Debug)]
pub struct DeliveryLedger {
    path: PathBuf,
    kind: IdentityKind,
    entries: HashSet<String>,
}

impl DeliveryLedger {
    /// Carga el ledger. Nunca falla: un archivo ilegible se registra en el log
    /// y se trata como vacío para no bloquear la corrida.
    pub fn load(path: impl AsRef<Path>, kind: IdentityKind) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match Self::read_entries(&path, kind) {
            Ok(entries) => {
                log::info!(
                    "(ledger) {} identidades previamente contactadas en {:?}",
                    entries.len(),
                    path
                );
                entries
            }
            Err(e) => {
                log::error!(
                    "(ledger) {}. Se continúa con ledger vacío (riesgo de duplicados)",
                    e
                );
                HashSet::new()
            }
        };

        Self {
            path,
            kind,
            entries,
        }
    }

    fn read_entries(path: &Path, kind: IdentityKind) -> OutreachResult<HashSet<String>> {
        if !path.exists() {
            Self::write_header(path)?;
            log::info!("(ledger) Creado nuevo archivo {:?}", path);
            return Ok(HashSet::new());
        }

        let raw = fs::read_to_string(path)
            .map_err(|e| OutreachError::LedgerIo(format!("reading {:?}: {}", path, e)))?;
        if raw.trim().is_empty() {
            Self::write_header(path)?;
            log::info!("(ledger) Agregado encabezado a archivo vacío {:?}", path);
            return Ok(HashSet::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(raw.as_bytes());

        let mut entries = HashSet::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record
                .map_err(|e| OutreachError::LedgerIo(format!("parsing {:?}: {}", path, e)))?;
            let Some(identity) = record.get(0) else {
                continue;
            };
            if idx == 0 && is_header_cell(identity) {
                continue;
            }
            match kind.normalize(identity) {
                Ok(key) => {
                    entries.insert(key);
                }
                // La primera línea suele ser el encabezado
                Err(_) if idx == 0 => {}
                Err(e) => log::warn!("(ledger) Entrada ignorada en {:?}: {}", path, e),
            }
        }
        Ok(entries)
    }

    fn write_header(path: &Path) -> OutreachResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| OutreachError::LedgerIo(format!("creating {:?}: {}", parent, e)))?;
        }
        fs::write(path, format!("{}\n", LEDGER_HEADER.join(",")))
            .map_err(|e| OutreachError::LedgerIo(format!("writing {:?}: {}", path, e)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &String> {
        self.entries.iter()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.kind
            .normalize(identity)
            .map(|key| self.entries.contains(&key))
            .unwrap_or(false)
    }

    /// Llamar sólo después de que el transporte confirmó el envío.
    pub fn record(&mut self, identity: &str) -> OutreachResult<()> {
        let key = self.kind.normalize(identity)?;
        self.record_normalized(key)
    }

    /// La identidad queda en memoria aunque falle el append, para no reenviar
    /// en esta misma corrida.
    fn record_normalized(&mut self, key: String) -> OutreachResult<()> {
        let appended = self.append(&key);
        self.entries.insert(key);
        appended
    }

    fn append(&self, key: &str) -> OutreachResult<()> {
        let glued = lacks_trailing_newline(&self.path);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| OutreachError::LedgerIo(format!("opening {:?}: {}", self.path, e)))?;
        // Una última línea sin `\n` (archivo editado a mano) se pegaría a la nueva entrada
        if glued {
            file.write_all(b"\n")
                .map_err(|e| OutreachError::LedgerIo(format!("repairing {:?}: {}", self.path, e)))?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        let timestamp = Utc::now().to_rfc3339();
        writer
            .write_record([key, timestamp.as_str()])
            .and_then(|_| writer.flush().map_err(csv::Error::from))
            .map_err(|e| OutreachError::LedgerIo(format!("appending to {:?}: {}", self.path, e)))
    }
}

// --------------------------------------------------------------------------------
// Acceso compartido entre shards
// --------------------------------------------------------------------------------

#[derive(Debug)]
struct LedgerState {
    ledger: DeliveryLedger,
    in_flight: HashSet<String>,
}

/// Ledger protegido por un mutex. `try_claim` hace el check y la reserva de forma
/// atómica respecto a los demás workers.
#[derive(Debug, Clone)]
pub struct SharedLedger {
    state: Arc<Mutex<LedgerState>>,
}

#[derive(Debug)]
pub enum ClaimResult {
    AlreadyContacted,
    /// Otro worker está enviando a la misma identidad en este momento
    InFlight,
    Claimed(LedgerClaim),
}

impl SharedLedger {
    pub fn new(ledger: DeliveryLedger) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState {
                ledger,
                in_flight: HashSet::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // Un worker que entró en pánico no invalida el conjunto
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().ledger.len()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.lock().ledger.contains(identity)
    }

    /// `key` debe venir ya normalizada
    pub fn try_claim(&self, key: &str) -> ClaimResult {
        let mut state = self.lock();
        if state.ledger.entries.contains(key) {
            return ClaimResult::AlreadyContacted;
        }
        if !state.in_flight.insert(key.to_string()) {
            return ClaimResult::InFlight;
        }
        ClaimResult::Claimed(LedgerClaim {
            ledger: self.clone(),
            key: key.to_string(),
            committed: false,
        })
    }

    fn commit(&self, key: &str) -> OutreachResult<()> {
        let mut state = self.lock();
        state.in_flight.remove(key);
        state.ledger.record_normalized(key.to_string())
    }

    fn release(&self, key: &str) {
        self.lock().in_flight.remove(key);
    }
}

/// Reserva de una identidad. Si no se confirma, se libera al salir de scope.
#[derive(Debug)]
pub struct LedgerClaim {
    ledger: SharedLedger,
    key: String,
    committed: bool,
}

impl LedgerClaim {
    pub fn commit(mut self) -> OutreachResult<()> {
        self.committed = true;
        self.ledger.commit(&self.key)
    }
}

impl Drop for LedgerClaim {
    fn drop(&mut self) {
        if !self.committed {
            self.ledger.release(&self.key);
        }
    }
}

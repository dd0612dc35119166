//! services/mod.rs
//! Módulo que agrupa los servicios: transportes, fuentes, ledger y driver de lotes.

pub mod batch_service;
pub mod browser_service;
pub mod csv_source_service;
pub mod delivery_service;
pub mod email_service;
pub mod generation_service;
pub mod imap_service;
pub mod instagram_service;
pub mod ledger_service;
pub mod sheets_service;
pub mod source_service;
pub mod whatsapp_service;

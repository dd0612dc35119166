//! handlers/mod.rs
//! Módulo que agrupa los handlers de cada operación del menú.

pub mod browser_handler;
pub mod email_handler;
pub mod generation_handler;
pub mod instagram_handler;
pub mod whatsapp_handler;

//! models/mod.rs
//! Módulo raíz para modelos/estructuras compartidas.

pub mod channel_model;
pub mod identity_model;
pub mod outcome_model;
pub mod target_model;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;

use crate::args::Args;
use crate::config::app_config::AppConfig;
use crate::logger::init_logger;

mod app;
mod args;
mod config;
mod error;
mod handlers;
mod logger;
mod models;
mod services;

#[cfg(test)]
mod tests;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    let args = Args::parse();
    let config = AppConfig::from_env().context("Configuración inválida")?;
    log::info!(
        "Configuración cargada: {} perfiles de navegador, {} hojas",
        config.browser.profiles.len(),
        config.sheets.urls.len()
    );

    app::run(args, config).await
}

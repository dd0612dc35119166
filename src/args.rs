//! args.rs
//! Línea de comandos. Sin subcomando se muestra el menú interactivo.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "outreach_service")]
#[command(author, version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
    /// Google Sheets URL or ID; overrides GOOGLE_SHEETS_URLS. Repeatable.
    #[arg(long = "sheet", global = true)]
    pub sheets: Vec<String>,
    /// Suppress progress bars.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Send approved emails from the spreadsheets
    SendEmails,
    /// Save approved emails as drafts instead of sending
    SaveDrafts,
    /// Generate Subject/Body for rows marked "Read For Body?"
    Generate,
    /// Send WhatsApp messages to the numbers in the CSV folder
    Whatsapp,
    /// Remove already contacted numbers from the CSV folder
    WhatsappCleanup,
    /// Send Instagram DMs to the usernames file
    Instagram,
}

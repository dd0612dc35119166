//! app.rs
//! Menú interactivo y despacho de operaciones.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};

use crate::args::{Args, Command};
use crate::config::app_config::AppConfig;
use crate::handlers::browser_handler::BrowserChannel;
use crate::handlers::{
    email_handler, generation_handler, instagram_handler, whatsapp_handler,
};

pub const MENU: [(Command, &str); 6] = [
    (Command::SendEmails, "Send emails"),
    (Command::SaveDrafts, "Save emails as drafts"),
    (Command::Generate, "Generate email bodies with AI"),
    (Command::Whatsapp, "Send WhatsApp messages"),
    (Command::WhatsappCleanup, "Clean contacted numbers from CSV files"),
    (Command::Instagram, "Send Instagram DMs"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Run(Command),
    Exit,
}

/// "1".."6" ejecutan una operación; el número siguiente sale
pub fn parse_menu_choice(input: &str) -> Option<MenuChoice> {
    let choice: usize = input.trim().parse().ok()?;
    match choice {
        0 => None,
        n if n <= MENU.len() => Some(MenuChoice::Run(MENU[n - 1].0)),
        n if n == MENU.len() + 1 => Some(MenuChoice::Exit),
        _ => None,
    }
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush().context("Error escribiendo a stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Error leyendo de stdin")?;
    Ok(line.trim().to_string())
}

fn print_lines(lines: &[String]) {
    println!();
    for line in lines {
        println!("{}", line);
    }
}

pub async fn run(args: Args, config: AppConfig) -> Result<()> {
    if let Some(command) = args.command {
        return dispatch(command, &args, &config).await;
    }

    loop {
        println!("\nChoose an option:");
        for (i, (_, label)) in MENU.iter().enumerate() {
            println!("{}. {}", i + 1, label);
        }
        println!("{}. Exit", MENU.len() + 1);

        let input = read_line(&format!("\nEnter your choice (1-{}): ", MENU.len() + 1))?;
        match parse_menu_choice(&input) {
            Some(MenuChoice::Exit) => {
                println!("Goodbye!");
                return Ok(());
            }
            Some(MenuChoice::Run(command)) => {
                // En modo interactivo un error no cierra el menú
                if let Err(e) = dispatch(command, &args, &config).await {
                    log::error!("(run) {:?} falló: {:#}", command, e);
                    println!("Error: {:#}", e);
                }
            }
            None => println!("Invalid choice. Please try again."),
        }
    }
}

/// URLs de --sheet, luego las del .env, y si no hay, se piden por stdin
fn resolve_sheet_urls(args: &Args, config: &AppConfig) -> Result<Vec<String>> {
    if !args.sheets.is_empty() {
        return Ok(args.sheets.clone());
    }
    if !config.sheets.urls.is_empty() {
        println!("Using {} spreadsheet(s) from GOOGLE_SHEETS_URLS", config.sheets.urls.len());
        return Ok(config.sheets.urls.clone());
    }
    let input = read_line("Enter Google Sheets ID or URL: ")?;
    if input.is_empty() {
        bail!("Please provide a valid Google Sheets ID or URL");
    }
    Ok(vec![input])
}

pub async fn dispatch(command: Command, args: &Args, config: &AppConfig) -> Result<()> {
    log::info!("(dispatch) Ejecutando {:?}", command);
    match command {
        Command::SendEmails => {
            let urls = resolve_sheet_urls(args, config)?;
            let summary = email_handler::send_emails(config, &urls).await?;
            print_lines(&summary.render("Emails sent"));
        }
        Command::SaveDrafts => {
            let urls = resolve_sheet_urls(args, config)?;
            let summary = email_handler::save_drafts(config, &urls).await?;
            print_lines(&summary.render("Drafts saved"));
        }
        Command::Generate => {
            let urls = resolve_sheet_urls(args, config)?;
            let report = generation_handler::generate_bodies(config, &urls).await?;
            print_lines(&report.render());
        }
        Command::Whatsapp => {
            let summary = whatsapp_handler::send_whatsapp(config, args.quiet).await?;
            print_lines(&summary.render(BrowserChannel::WhatsApp.delivered_label()));
        }
        Command::WhatsappCleanup => {
            let removed = whatsapp_handler::cleanup_contacted(config).await?;
            println!("Cleanup completed: {} contacted entries removed", removed);
        }
        Command::Instagram => {
            let summary = instagram_handler::send_instagram(config, args.quiet).await?;
            print_lines(&summary.render(BrowserChannel::Instagram.delivered_label()));
        }
    }
    Ok(())
}

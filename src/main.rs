//! GloveLink - Serial and radio console for the Neuro Glove
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use glovelink_app::config::{default_config_path, load_settings};
use glovelink_core::prelude::*;
use glovelink_core::TransportKind;

/// GloveLink - Serial and radio console for the Neuro Glove
#[derive(Parser, Debug)]
#[command(name = "glovelink")]
#[command(about = "Talk to a Neuro Glove and keep a daily message journal", long_about = None)]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports visible on this host
    Ports,

    /// Connect to the glove; stdin lines are sent, events are printed as NDJSON
    Connect {
        /// Use the serial cable, optionally on a specific port
        #[arg(long, value_name = "PORT", num_args = 0..=1, conflicts_with = "radio")]
        serial: Option<Option<String>>,

        /// Use the wireless radio link
        #[arg(long)]
        radio: bool,
    },

    /// Print the journal for a day
    Log {
        /// Day to show (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Summarize a day of messages
    Summarize {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Translate a day of messages
    Translate {
        /// Target language; defaults to the configured one
        #[arg(long)]
        lang: Option<String>,

        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Write a default config file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    glovelink::startup()?;

    let config_path = args.config.unwrap_or_else(default_config_path);
    let settings = load_settings(&config_path);
    let mut stdout = std::io::stdout();

    match args.command {
        Command::Ports => glovelink::commands::ports(&mut stdout),
        Command::Connect { serial, radio } => {
            let (kind, port) = if radio {
                (TransportKind::Radio, None)
            } else {
                (TransportKind::Serial, serial.flatten())
            };
            glovelink::run_connect(&settings, kind, port).await
        }
        Command::Log { date } => glovelink::commands::log(&settings, date, &mut stdout).await,
        Command::Summarize { date } => {
            glovelink::commands::summarize(&settings, date, &mut stdout).await
        }
        Command::Translate { lang, date } => {
            glovelink::commands::translate(&settings, lang, date, &mut stdout).await
        }
        Command::Init => glovelink::commands::init(&config_path, &mut stdout),
    }
}

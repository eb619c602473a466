//! One-shot subcommands: port listing, journal views, AI helpers and config
//! setup.

use std::io::{self, Write};
use std::path::Path;

use chrono::NaiveDate;
use tracing::info;

use glovelink_app::config::{default_journal_dir, init_config, Settings};
use glovelink_app::{
    FileStore, GeminiClient, LogAnalyzer, LogJournal, LogView, TranslatedEntry, TranslationCache,
};
use glovelink_core::prelude::*;
use glovelink_core::LogEntry;
use glovelink_transport::{list_ports, SerialPortSummary};

fn view_for(date: Option<NaiveDate>) -> LogView {
    date.map(LogView::Date).unwrap_or(LogView::Today)
}

fn open_journal(settings: &Settings) -> LogJournal<FileStore> {
    let dir = settings
        .journal
        .dir
        .clone()
        .unwrap_or_else(default_journal_dir);
    LogJournal::new(FileStore::new(dir))
}

/// `glovelink ports`
pub fn ports(out: &mut impl Write) -> Result<()> {
    let ports = list_ports()?;
    write_ports(&ports, out)?;
    Ok(())
}

fn write_ports(ports: &[SerialPortSummary], out: &mut impl Write) -> io::Result<()> {
    if ports.is_empty() {
        return writeln!(out, "No serial ports found.");
    }
    for port in ports {
        let ids = match (port.usb_vendor_id, port.usb_product_id) {
            (Some(vid), Some(pid)) => format!("  {vid:04x}:{pid:04x}"),
            _ => String::new(),
        };
        let product = port
            .product
            .as_deref()
            .or(port.manufacturer.as_deref())
            .map(|p| format!("  {p}"))
            .unwrap_or_default();
        writeln!(out, "{}{}{}", port.name, ids, product)?;
    }
    Ok(())
}

/// `glovelink log [--date]`
pub async fn log(settings: &Settings, date: Option<NaiveDate>, out: &mut impl Write) -> Result<()> {
    let view = view_for(date);
    let entries = open_journal(settings).load(view).await;
    write_log(view.date(), &entries, out)?;
    Ok(())
}

fn write_log(date: NaiveDate, entries: &[LogEntry], out: &mut impl Write) -> io::Result<()> {
    if entries.is_empty() {
        return writeln!(out, "No messages recorded on {date}.");
    }
    for entry in entries {
        writeln!(out, "{}", entry.display_line())?;
    }
    Ok(())
}

/// `glovelink summarize [--date]`
pub async fn summarize(
    settings: &Settings,
    date: Option<NaiveDate>,
    out: &mut impl Write,
) -> Result<()> {
    let entries = open_journal(settings).load(view_for(date)).await;
    let client = GeminiClient::from_settings(&settings.ai)?;
    info!("Summarizing with {}", client.model());

    let summary = LogAnalyzer::new(client).summarize_or_marker(&entries).await;
    writeln!(out, "{summary}")?;
    Ok(())
}

/// `glovelink translate [--lang] [--date]`
pub async fn translate(
    settings: &Settings,
    language: Option<String>,
    date: Option<NaiveDate>,
    out: &mut impl Write,
) -> Result<()> {
    let view = view_for(date);
    let entries = open_journal(settings).load(view).await;
    if entries.is_empty() {
        write_log(view.date(), &entries, out)?;
        return Ok(());
    }

    let language = language.unwrap_or_else(|| settings.ai.target_language.clone());
    let cache = TranslationCache::new(GeminiClient::from_settings(&settings.ai)?);
    let translated = cache.translate_entries(entries, &language).await;
    write_translated(&translated, out)?;
    Ok(())
}

fn write_translated(entries: &[TranslatedEntry], out: &mut impl Write) -> io::Result<()> {
    for item in entries {
        writeln!(out, "{}", item.entry.display_line())?;
        writeln!(out, "           {}", item.translated)?;
    }
    Ok(())
}

/// `glovelink init`
pub fn init(config_path: &Path, out: &mut impl Write) -> Result<()> {
    if init_config(config_path)? {
        writeln!(out, "Created {}", config_path.display())?;
    } else {
        writeln!(out, "Config already exists at {}", config_path.display())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use glovelink_core::Direction;

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_write_ports() {
        let ports = vec![
            SerialPortSummary {
                name: "/dev/ttyUSB0".into(),
                usb_vendor_id: Some(0x10c4),
                usb_product_id: Some(0xea60),
                manufacturer: Some("Silicon Labs".into()),
                product: None,
            },
            SerialPortSummary {
                name: "/dev/ttyS0".into(),
                usb_vendor_id: None,
                usb_product_id: None,
                manufacturer: None,
                product: None,
            },
        ];
        let text = render(|out| write_ports(&ports, out));
        assert_eq!(text, "/dev/ttyUSB0  10c4:ea60  Silicon Labs\n/dev/ttyS0\n");

        assert_eq!(render(|out| write_ports(&[], out)), "No serial ports found.\n");
    }

    #[test]
    fn test_write_log_empty_day() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let text = render(|out| write_log(date, &[], out));
        assert_eq!(text, "No messages recorded on 2024-03-09.\n");
    }

    #[test]
    fn test_write_translated() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let entry = LogEntry::at(ts, Direction::In, "hello");
        let items = vec![TranslatedEntry {
            entry: entry.clone(),
            translated: "bonjour".into(),
        }];

        let text = render(|out| write_translated(&items, out));
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(entry.display_line().as_str()));
        assert_eq!(lines.next().map(str::trim), Some("bonjour"));
    }

    #[tokio::test]
    async fn test_log_reads_configured_journal() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.journal.dir = Some(dir.path().to_path_buf());

        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 8, 30, 0).unwrap();
        open_journal(&settings)
            .append(LogEntry::at(ts, Direction::Out, "ping"))
            .await
            .unwrap();

        let mut buf = Vec::new();
        log(&settings, Some(ts.date_naive()), &mut buf).await.unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.trim_end().ends_with("> ping"));
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glovelink").join("config.toml");

        let text = render(|out| init(&path, out).map_err(io::Error::other));
        assert!(text.starts_with("Created"));
        let text = render(|out| init(&path, out).map_err(io::Error::other));
        assert!(text.starts_with("Config already exists"));
    }
}

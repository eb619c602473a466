//! Headless connect loop
//!
//! Opens one device link, prints every session event as NDJSON and sends
//! each stdin line to the device until `quit`, end of input, Ctrl+C or the
//! link dropping.

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use glovelink_app::config::{default_journal_dir, Settings};
use glovelink_app::{DeviceSession, FileStore, Selectors};
use glovelink_core::prelude::*;
use glovelink_core::{ConnectionState, SessionEvent, TransportKind};
use glovelink_transport::HostTransport;

use super::HeadlessEvent;

/// Lines read from stdin
#[derive(Debug, PartialEq, Eq)]
enum StdinCommand {
    Send(String),
    Quit,
}

/// Run `connect` in headless mode
pub async fn run_connect(
    settings: &Settings,
    kind: TransportKind,
    port: Option<String>,
) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("GloveLink starting in HEADLESS mode");
    info!("Transport: {}", kind);
    info!("═══════════════════════════════════════════════════════");

    let journal_dir = settings
        .journal
        .dir
        .clone()
        .unwrap_or_else(default_journal_dir);
    let store = FileStore::new(journal_dir);

    let mut selectors = Selectors::from(settings);
    if let Some(port) = port.filter(|p| !p.trim().is_empty()) {
        selectors.serial.port = Some(port);
    }

    let session = DeviceSession::with_selectors(HostTransport::new(), store, selectors);
    let printer = spawn_event_printer(session.subscribe());

    if let Err(e) = session.connect(kind).await {
        HeadlessEvent::error(e.to_string(), true).emit();
        session.shutdown().await;
        finish_printer(printer).await;
        return Err(e);
    }

    let (stdin_tx, mut stdin_rx) = mpsc::channel(32);
    std::thread::spawn(move || {
        spawn_stdin_reader_blocking(stdin_tx);
    });

    let mut events = session.subscribe();
    loop {
        tokio::select! {
            command = stdin_rx.recv() => match command {
                Some(StdinCommand::Send(text)) => {
                    // Failures are already journaled and published
                    if let Err(e) = session.send(&text).await {
                        warn!("Send failed: {}", e);
                    }
                }
                Some(StdinCommand::Quit) => {
                    info!("Quit requested");
                    break;
                }
                None => {
                    info!("Stdin closed");
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(SessionEvent::StateChanged(ConnectionState::Disconnected)) => {
                    info!("Link closed by the device");
                    break;
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    session.shutdown().await;
    finish_printer(printer).await;

    info!("GloveLink headless mode exiting");
    Ok(())
}

/// Forward session events to stdout until the session is dropped
fn spawn_event_printer(mut rx: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => HeadlessEvent::from(&event).emit(),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    HeadlessEvent::error(format!("{missed} events dropped"), false).emit();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Wait for the printer to drain; it ends once every sender is gone
async fn finish_printer(printer: JoinHandle<()>) {
    if let Err(e) = printer.await {
        error!("Event printer task failed: {}", e);
    }
}

fn parse_stdin_line(line: &str) -> Option<StdinCommand> {
    match line.trim() {
        "" => None,
        "q" | "quit" => Some(StdinCommand::Quit),
        _ => Some(StdinCommand::Send(line.trim_end_matches(['\r', '\n']).to_string())),
    }
}

/// Read stdin lines and forward them to the event loop (blocking version)
fn spawn_stdin_reader_blocking(tx: mpsc::Sender<StdinCommand>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    let reader = stdin.lock();

    for line in reader.lines() {
        match line {
            Ok(line) => {
                let Some(command) = parse_stdin_line(&line) else {
                    continue;
                };
                let quit = command == StdinCommand::Quit;
                if tx.blocking_send(command).is_err() || quit {
                    break;
                }
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    info!("Stdin reader exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stdin_line() {
        assert_eq!(parse_stdin_line(""), None);
        assert_eq!(parse_stdin_line("   "), None);
        assert_eq!(parse_stdin_line("q"), Some(StdinCommand::Quit));
        assert_eq!(parse_stdin_line(" quit "), Some(StdinCommand::Quit));
        assert_eq!(
            parse_stdin_line("AT+RATE=50\r"),
            Some(StdinCommand::Send("AT+RATE=50".into()))
        );
    }

    #[tokio::test]
    async fn test_printer_ends_with_session() {
        let (tx, rx) = broadcast::channel(4);
        let printer = spawn_event_printer(rx);
        drop(tx);
        tokio::time::timeout(std::time::Duration::from_secs(1), finish_printer(printer))
            .await
            .unwrap();
    }
}

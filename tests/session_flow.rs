//! End-to-end session flows against a scripted transport
//!
//! Each test plays the glove through a `MockDevice` and checks what the
//! session journals and publishes.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::sync::broadcast;

use glovelink_app::{DeviceSession, FileStore, LogJournal, LogView, MemoryStore};
use glovelink_core::{ConnectionState, Direction, Error, LogEntry, SessionEvent, TransportKind};
use glovelink_transport::test_utils::{MockFailure, MockTransport};

type Session = DeviceSession<MockTransport, MemoryStore>;

fn setup() -> (Session, MockTransport) {
    let mock = MockTransport::new();
    let session = DeviceSession::new(mock.clone(), MemoryStore::new());
    (session, mock)
}

fn today_utc() -> LogView {
    LogView::Date(Utc::now().date_naive())
}

/// Next event matching `pred`, skipping the rest
async fn wait_for(
    rx: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn received(text: &'static str) -> impl Fn(&SessionEvent) -> bool {
    move |event| matches!(event, SessionEvent::MessageReceived(e) if e.text == text)
}

async fn outgoing_texts(session: &Session) -> Vec<String> {
    session
        .current_log(today_utc())
        .await
        .into_iter()
        .filter(|e| e.direction == Direction::Out)
        .map(|e| e.text)
        .collect()
}

#[tokio::test]
async fn test_send_writes_line_and_journals_once() {
    let (session, mock) = setup();
    let mut device = mock.push_device();
    session.connect(TransportKind::Serial).await.unwrap();

    let entry = session.send("ping").await.unwrap().unwrap();
    assert_eq!(entry.direction, Direction::Out);
    assert_eq!(device.read_line().await.as_deref(), Some("ping"));

    assert_eq!(outgoing_texts(&session).await, vec![entry.text]);
}

#[tokio::test]
async fn test_whitespace_send_is_noop() {
    let (session, mock) = setup();
    let mut device = mock.push_device();
    session.connect(TransportKind::Serial).await.unwrap();
    let before = session.current_log(today_utc()).await.len();

    assert_eq!(session.send("").await.unwrap(), None);
    assert_eq!(session.send("  \t ").await.unwrap(), None);

    assert!(device.drain_for(Duration::from_millis(100)).await.is_empty());
    assert_eq!(session.current_log(today_utc()).await.len(), before);
}

#[tokio::test]
async fn test_connect_while_connected_keeps_link() {
    let (session, mock) = setup();
    let mut device = mock.push_device();
    session.connect(TransportKind::Serial).await.unwrap();

    let err = session.connect(TransportKind::Radio).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyConnected));
    assert_eq!(mock.request_count(), 1);
    assert_eq!(session.state().kind(), Some(TransportKind::Serial));

    session.send("still here").await.unwrap();
    assert_eq!(device.read_line().await.as_deref(), Some("still here"));
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (session, mock) = setup();
    let mut device = mock.push_device();
    session.connect(TransportKind::Serial).await.unwrap();

    assert_eq!(session.disconnect().await, ConnectionState::Disconnected);
    assert_eq!(session.disconnect().await, ConnectionState::Disconnected);
    assert!(device.host_closed().await);

    let disconnects = session
        .current_log(today_utc())
        .await
        .iter()
        .filter(|e| e.text == "[link] Disconnected")
        .count();
    assert_eq!(disconnects, 1);
}

#[tokio::test]
async fn test_entry_is_journaled_before_notification() {
    let (session, mock) = setup();
    let mut device = mock.push_device();
    session.connect(TransportKind::Serial).await.unwrap();
    let mut events = session.subscribe();

    device.send_line("pong").await;
    let event = wait_for(&mut events, received("pong")).await;
    let SessionEvent::MessageReceived(entry) = event else {
        unreachable!()
    };

    let log = session.current_log(today_utc()).await;
    assert!(log.iter().any(|e| e.id == entry.id));
}

#[tokio::test]
async fn test_device_hang_up_disconnects() {
    let (session, mock) = setup();
    let device = mock.push_device();
    session.connect(TransportKind::Serial).await.unwrap();
    let mut events = session.subscribe();

    device.hang_up().await;
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::StateChanged(ConnectionState::Disconnected))
    })
    .await;
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::MessageReceived(entry) if entry.text.starts_with("[link] Connection lost"))
    })
    .await;

    assert!(session.state().is_disconnected());
    assert!(matches!(
        session.send("ping").await,
        Err(Error::NotConnected)
    ));
}

#[tokio::test]
async fn test_refused_write_keeps_link_and_journals_nothing_sent() {
    let (session, mock) = setup();
    let mut device = mock.push_device();
    session.connect(TransportKind::Serial).await.unwrap();

    device.fail_writes(true);
    let err = session.send("ping").await.unwrap_err();
    assert!(matches!(err, Error::WriteFailed { .. }));

    assert!(outgoing_texts(&session).await.is_empty());
    let log = session.current_log(today_utc()).await;
    assert!(log
        .iter()
        .any(|e| e.text.starts_with("[error] Failed to write to device")));
    assert!(session.state().is_connected());

    device.fail_writes(false);
    session.send("ping again").await.unwrap();
    assert_eq!(device.read_line().await.as_deref(), Some("ping again"));
    assert_eq!(outgoing_texts(&session).await, vec!["ping again"]);
}

#[tokio::test]
async fn test_read_fault_disconnects_with_reason() {
    let (session, mock) = setup();
    let device = mock.push_device();
    session.connect(TransportKind::Serial).await.unwrap();
    let mut events = session.subscribe();

    device.fail_read("framing error").await;
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::StateChanged(ConnectionState::Disconnected))
    })
    .await;
    wait_for(&mut events, received("[link] Connection lost: read error: framing error")).await;

    assert!(session.state().is_disconnected());
}

#[tokio::test]
async fn test_declined_and_failed_opens() {
    let (session, mock) = setup();
    mock.push_failure(MockFailure::Denied);
    mock.push_failure(MockFailure::OpenFailed);

    let err = session.connect(TransportKind::Radio).await.unwrap_err();
    assert!(matches!(
        err,
        Error::TransportDenied {
            kind: TransportKind::Radio,
            ..
        }
    ));
    assert!(session.state().is_disconnected());

    let err = session.connect(TransportKind::Serial).await.unwrap_err();
    assert!(matches!(
        err,
        Error::TransportOpenFailed {
            kind: TransportKind::Serial,
            ..
        }
    ));
    assert!(session.state().is_disconnected());

    let errors = session
        .current_log(today_utc())
        .await
        .iter()
        .filter(|e| e.text.starts_with("[error]"))
        .count();
    assert_eq!(errors, 2);

    // A later request still goes through
    let mut device = mock.push_device();
    session.connect(TransportKind::Serial).await.unwrap();
    session.send("AT").await.unwrap();
    assert_eq!(device.read_line().await.as_deref(), Some("AT"));
}

#[tokio::test]
async fn test_concurrent_sends_write_whole_lines() {
    let (session, mock) = setup();
    let mut device = mock.push_device();
    session.connect(TransportKind::Serial).await.unwrap();

    let a = "A".repeat(1500);
    let b = "B".repeat(1500);
    let first = tokio::spawn({
        let session = session.clone();
        let a = a.clone();
        async move { session.send(&a).await }
    });
    let second = tokio::spawn({
        let session = session.clone();
        let b = b.clone();
        async move { session.send(&b).await }
    });
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let mut lines = vec![
        device.read_line().await.unwrap(),
        device.read_line().await.unwrap(),
    ];
    lines.sort();
    assert_eq!(lines, vec![a, b]);
    assert_eq!(outgoing_texts(&session).await.len(), 2);
}

#[tokio::test]
async fn test_multiline_send_is_refused() {
    let (session, mock) = setup();
    let mut device = mock.push_device();
    session.connect(TransportKind::Serial).await.unwrap();

    let err = session.send("AT\nRESET").await.unwrap_err();
    assert!(matches!(err, Error::InvalidMessage { .. }));

    assert!(device.drain_for(Duration::from_millis(100)).await.is_empty());
    assert!(outgoing_texts(&session).await.is_empty());
    assert!(session.state().is_connected());
}

#[tokio::test]
async fn test_chunked_input_is_reassembled() {
    let (session, mock) = setup();
    let mut device = mock.push_device();
    session.connect(TransportKind::Serial).await.unwrap();
    let mut events = session.subscribe();

    device.send_raw(b"OK\r\n").await;
    device.send_raw(b"TEMP=").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    device.send_raw(b"42\n").await;

    wait_for(&mut events, received("OK")).await;
    wait_for(&mut events, received("TEMP=42")).await;

    let texts: Vec<String> = session
        .current_log(today_utc())
        .await
        .into_iter()
        .filter(|e| !e.text.starts_with('['))
        .map(|e| e.text)
        .collect();
    assert_eq!(texts, vec!["OK", "TEMP=42"]);
}

#[tokio::test]
async fn test_file_journal_keeps_append_order_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let date = Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap();
    let texts = ["AT", "OK", "AT+RATE=50", "OK"];

    {
        let journal = LogJournal::new(FileStore::new(dir.path()));
        for (i, text) in texts.iter().enumerate() {
            let ts = date + chrono::Duration::seconds(i as i64);
            let direction = if i % 2 == 0 { Direction::Out } else { Direction::In };
            journal
                .append(LogEntry::at(ts, direction, *text))
                .await
                .unwrap();
        }
    }

    let reopened = LogJournal::new(FileStore::new(dir.path()));
    let loaded = reopened.load_for_date(date.date_naive()).await;
    let loaded_texts: Vec<&str> = loaded.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(loaded_texts, texts);

    let next_day = date.date_naive().succ_opt().unwrap();
    assert!(reopened.load_for_date(next_day).await.is_empty());
}

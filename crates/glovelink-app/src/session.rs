//! Device session facade
//!
//! [`DeviceSession`] composes the connection state machine, one transport
//! session and the journal. `connect`, `send`, `disconnect` and
//! `current_log` are the entry points; everything else is observed through
//! [`SessionEvent`]s.
//!
//! Every inbound line and every successful send becomes exactly one
//! [`LogEntry`] that is handed to the journal before listeners hear about it.
//! Link diagnostics (connected, disconnected, lost, failures) are journaled
//! as inbound entries prefixed with `[link]` or `[error]`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use glovelink_core::prelude::*;
use glovelink_core::{ConnectionState, LogEntry, Metadata, SessionEvent, TransportKind};
use glovelink_transport::{
    ChannelSelector, LinkEvent, RadioParams, SerialParams, TransportProvider, TransportSession,
    LINK_EVENT_CAPACITY,
};

use crate::config::Settings;
use crate::connection::ConnectionMachine;
use crate::journal::{JournalStore, LogJournal, LogView};

/// Capacity of the session event broadcast channel
pub const EVENT_CAPACITY: usize = 1024;

/// Device filters used by [`DeviceSession::connect`] for each transport kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selectors {
    pub serial: SerialParams,
    pub radio: RadioParams,
}

impl Selectors {
    pub fn for_kind(&self, kind: TransportKind) -> ChannelSelector {
        match kind {
            TransportKind::Serial => ChannelSelector::Serial(self.serial.clone()),
            TransportKind::Radio => ChannelSelector::Radio(self.radio.clone()),
        }
    }
}

impl From<&Settings> for Selectors {
    fn from(settings: &Settings) -> Self {
        Self {
            serial: settings.serial.params(),
            radio: settings.radio.params(),
        }
    }
}

/// The open link: transport plus the task pumping its events
struct ActiveLink {
    id: u64,
    transport: Arc<TransportSession>,
    pump_stop: oneshot::Sender<()>,
    pump: JoinHandle<()>,
}

struct Inner<P, S> {
    provider: P,
    journal: LogJournal<S>,
    machine: ConnectionMachine,
    link: Mutex<Option<ActiveLink>>,
    events: broadcast::Sender<SessionEvent>,
    selectors: Selectors,
    next_link_id: AtomicU64,
}

/// Connection lifecycle, message API and journal for one device.
///
/// Cheap to clone; clones share the same session. At most one link is open
/// at a time.
pub struct DeviceSession<P, S> {
    inner: Arc<Inner<P, S>>,
}

impl<P, S> Clone for DeviceSession<P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, S> DeviceSession<P, S>
where
    P: TransportProvider + Sync + 'static,
    S: JournalStore + Sync + 'static,
{
    pub fn new(provider: P, store: S) -> Self {
        Self::with_selectors(provider, store, Selectors::default())
    }

    pub fn with_selectors(provider: P, store: S, selectors: Selectors) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                provider,
                journal: LogJournal::new(store),
                machine: ConnectionMachine::new(),
                link: Mutex::new(None),
                events,
                selectors,
                next_link_id: AtomicU64::new(1),
            }),
        }
    }

    /// Listen to session events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Current connection state snapshot
    pub fn state(&self) -> ConnectionState {
        self.inner.machine.state()
    }

    pub fn journal(&self) -> &LogJournal<S> {
        &self.inner.journal
    }

    pub fn provider(&self) -> &P {
        &self.inner.provider
    }

    /// Connect using the configured filter for `kind`
    pub async fn connect(&self, kind: TransportKind) -> Result<ConnectionState> {
        let selector = self.inner.selectors.for_kind(kind);
        self.connect_with(selector).await
    }

    /// Open a link matching `selector`.
    ///
    /// Fails with `AlreadyConnecting`/`AlreadyConnected` without touching the
    /// current link, or with the transport's open error after returning to
    /// `Disconnected`. Failures are journaled as diagnostics.
    pub async fn connect_with(&self, selector: ChannelSelector) -> Result<ConnectionState> {
        let inner = &self.inner;
        let kind = selector.kind();

        let connecting = match inner.machine.begin_connect(kind) {
            Ok(state) => state,
            Err(e) => {
                warn!("Connect via {} rejected: {}", kind, e);
                inner.report_failure(&e).await;
                return Err(e);
            }
        };
        inner.emit(SessionEvent::StateChanged(connecting));

        let (link_tx, link_rx) = mpsc::channel(LINK_EVENT_CAPACITY);
        let transport = match TransportSession::open(&inner.provider, &selector, link_tx).await {
            Ok(transport) => Arc::new(transport),
            Err(e) => {
                error!("Failed to open {} link: {}", kind, e);
                if let Some(state) = inner.machine.disconnected() {
                    inner.emit(SessionEvent::StateChanged(state));
                }
                inner.report_failure(&e).await;
                return Err(e);
            }
        };

        let metadata = transport.metadata().clone();
        let mut slot = inner.link.lock().await;

        let connected = inner.machine.connected(kind, metadata.clone());
        inner.emit(SessionEvent::StateChanged(connected.clone()));
        inner
            .diagnostic(format!(
                "[link] Connected via {}{}",
                kind,
                describe_metadata(&metadata)
            ))
            .await;

        let id = inner.next_link_id.fetch_add(1, Ordering::Relaxed);
        let (pump_stop, stop_rx) = oneshot::channel();
        let pump = tokio::spawn(pump_link(Arc::downgrade(inner), id, link_rx, stop_rx));
        *slot = Some(ActiveLink {
            id,
            transport,
            pump_stop,
            pump,
        });

        info!("Connected via {} (link {})", kind, id);
        Ok(connected)
    }

    /// Send one message to the device.
    ///
    /// Empty or whitespace-only text is a no-op and returns `Ok(None)`. Text
    /// with a line break is refused, since the device would read it as
    /// several messages. On success the outgoing entry is journaled, then
    /// `MessageSent` is published. A persistence fault is reported as a
    /// `Fault` event and does not fail the send.
    pub async fn send(&self, text: &str) -> Result<Option<LogEntry>> {
        if text.trim().is_empty() {
            trace!("ignoring empty send");
            return Ok(None);
        }

        let inner = &self.inner;
        let transport = inner
            .link
            .lock()
            .await
            .as_ref()
            .map(|link| Arc::clone(&link.transport));

        let result = if text.contains(['\n', '\r']) {
            Err(Error::invalid_message("text contains a line break"))
        } else {
            match transport {
                Some(transport) => transport.write(text).await,
                None => Err(Error::NotConnected),
            }
        };
        if let Err(e) = result {
            warn!("Send failed: {}", e);
            inner.report_failure(&e).await;
            return Err(e);
        }

        let entry = LogEntry::outgoing(text);
        inner
            .record(entry.clone(), SessionEvent::MessageSent)
            .await;
        Ok(Some(entry))
    }

    /// Close the open link, if any.
    ///
    /// Idempotent: without a link nothing happens and no diagnostic is
    /// journaled. Teardown faults are reported as a `Fault` event; the
    /// session ends up `Disconnected` regardless. A connect still in progress
    /// is not interrupted.
    pub async fn disconnect(&self) -> ConnectionState {
        let inner = &self.inner;
        let link = inner.link.lock().await.take();
        let Some(link) = link else {
            debug!("disconnect: no open link");
            return inner.machine.state();
        };

        info!("Disconnecting link {}", link.id);
        let _ = link.pump_stop.send(());
        if let Err(e) = link.pump.await {
            warn!("Link pump task failed: {}", e);
        }

        let teardown = link.transport.close().await;

        if let Some(state) = inner.machine.disconnected() {
            inner.emit(SessionEvent::StateChanged(state));
        }
        inner.diagnostic("[link] Disconnected".to_string()).await;

        if let Err(e) = teardown {
            inner.emit(SessionEvent::Fault {
                message: format!("teardown: {e}"),
            });
        }

        inner.machine.state()
    }

    /// Journal entries for `view`
    pub async fn current_log(&self, view: LogView) -> Vec<LogEntry> {
        self.inner.journal.load(view).await
    }

    /// Disconnect and release the session
    pub async fn shutdown(self) {
        self.disconnect().await;
        debug!("Device session shut down");
    }
}

impl<P, S> Inner<P, S>
where
    P: TransportProvider + Sync + 'static,
    S: JournalStore + Sync + 'static,
{
    fn emit(&self, event: SessionEvent) {
        trace!("event: {}", event.event_type());
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Journal `entry`, then publish it.
    async fn record(&self, entry: LogEntry, wrap: fn(LogEntry) -> SessionEvent) {
        if let Err(e) = self.journal.append(entry.clone()).await {
            error!("Journal append failed: {}", e);
            self.emit(SessionEvent::Fault {
                message: e.to_string(),
            });
        }
        self.emit(wrap(entry));
    }

    async fn diagnostic(&self, text: String) {
        self.record(LogEntry::incoming(text), SessionEvent::MessageReceived)
            .await;
    }

    async fn report_failure(&self, err: &Error) {
        self.diagnostic(format!("[error] {err}")).await;
    }

    /// The read loop ended on its own: tear the link down and go `Disconnected`.
    ///
    /// Ignored when `link_id` is no longer the installed link (an explicit
    /// disconnect got there first).
    async fn link_lost(&self, link_id: u64, reason: String) {
        let link = {
            let mut slot = self.link.lock().await;
            match slot.as_ref() {
                Some(link) if link.id == link_id => slot.take(),
                _ => None,
            }
        };
        let Some(link) = link else {
            return;
        };

        warn!("Link {} lost: {}", link_id, reason);
        // We are the pump; its handle is simply dropped.
        drop(link.pump_stop);

        let teardown = link.transport.close().await;

        if let Some(state) = self.machine.disconnected() {
            self.emit(SessionEvent::StateChanged(state));
        }
        self.diagnostic(format!("[link] Connection lost: {reason}"))
            .await;

        if let Err(e) = teardown {
            self.emit(SessionEvent::Fault {
                message: format!("teardown: {e}"),
            });
        }
    }
}

/// Forward link events into the journal and event stream until stopped.
///
/// Holds only a weak reference so a dropped session is not kept alive by its
/// own pump.
async fn pump_link<P, S>(
    inner: Weak<Inner<P, S>>,
    link_id: u64,
    mut rx: mpsc::Receiver<LinkEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) where
    P: TransportProvider + Sync + 'static,
    S: JournalStore + Sync + 'static,
{
    loop {
        let event = tokio::select! {
            biased;
            _ = &mut stop_rx => {
                debug!("Link {} pump stopped", link_id);
                return;
            }
            event = rx.recv() => event,
        };

        let Some(inner) = inner.upgrade() else {
            return;
        };

        match event {
            Some(LinkEvent::Line(text)) => {
                inner
                    .record(LogEntry::incoming(text), SessionEvent::MessageReceived)
                    .await;
            }
            Some(LinkEvent::Metadata(update)) => {
                if let Some(merged) = inner.machine.update_metadata(update) {
                    inner.emit(SessionEvent::MetadataUpdated(merged));
                }
            }
            Some(LinkEvent::Ended(end)) => {
                inner.link_lost(link_id, end.to_string()).await;
                return;
            }
            None => {
                inner
                    .link_lost(link_id, "link event channel closed".to_string())
                    .await;
                return;
            }
        }
    }
}

/// ` (port=/dev/ttyUSB0, baud_rate=115200)`, or empty without metadata
fn describe_metadata(metadata: &Metadata) -> String {
    if metadata.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = metadata
        .iter()
        .map(|(key, value)| match value.as_str() {
            Some(s) => format!("{key}={s}"),
            None => format!("{key}={value}"),
        })
        .collect();
    format!(" ({})", pairs.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::MemoryStore;
    use glovelink_core::Direction;
    use glovelink_transport::test_utils::{MockFailure, MockTransport};
    use std::time::Duration;

    type TestSession = DeviceSession<MockTransport, MemoryStore>;

    fn session() -> (TestSession, MockTransport, MemoryStore) {
        let mock = MockTransport::new();
        let store = MemoryStore::new();
        let session = DeviceSession::new(mock.clone(), store.clone());
        (session, mock, store)
    }

    fn today_utc() -> LogView {
        LogView::Date(chrono::Utc::now().date_naive())
    }

    async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[test]
    fn test_describe_metadata() {
        let mut metadata = Metadata::new();
        assert_eq!(describe_metadata(&metadata), "");
        metadata.insert("port".into(), serde_json::json!("COM3"));
        metadata.insert("baud_rate".into(), serde_json::json!(115200));
        assert_eq!(describe_metadata(&metadata), " (baud_rate=115200, port=COM3)");
    }

    #[test]
    fn test_selectors_from_settings() {
        let mut settings = Settings::default();
        settings.serial.port = Some("/dev/ttyACM1".into());
        let selectors = Selectors::from(&settings);
        match selectors.for_kind(TransportKind::Serial) {
            ChannelSelector::Serial(params) => {
                assert_eq!(params.port.as_deref(), Some("/dev/ttyACM1"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_emits_states_and_diagnostic() {
        let (session, mock, _) = session();
        let _device = mock.push_device();
        let mut events = session.subscribe();

        let state = session.connect(TransportKind::Serial).await.unwrap();
        assert!(state.is_connected());

        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::StateChanged(ConnectionState::Connecting {
                kind: TransportKind::Serial
            })
        );
        assert!(matches!(
            next_event(&mut events).await,
            SessionEvent::StateChanged(ConnectionState::Connected { .. })
        ));
        match next_event(&mut events).await {
            SessionEvent::MessageReceived(entry) => {
                assert_eq!(entry.direction, Direction::In);
                assert!(entry.text.starts_with("[link] Connected via serial"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_failure_returns_to_disconnected() {
        let (session, mock, _) = session();
        mock.push_failure(MockFailure::Unavailable);

        let err = session.connect(TransportKind::Radio).await.unwrap_err();
        assert!(matches!(err, Error::TransportUnavailable { .. }));
        assert!(session.state().is_disconnected());

        let log = session.current_log(today_utc()).await;
        assert_eq!(log.len(), 1);
        assert!(log[0].text.starts_with("[error]"));
    }

    #[tokio::test]
    async fn test_second_connect_while_connecting() {
        let (session, mock, _) = session();
        let (_device, gate) = mock.push_gated_device();

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.connect(TransportKind::Serial).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = session.connect(TransportKind::Serial).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyConnecting));

        // disconnect while connecting does not interrupt the connect
        assert!(matches!(
            session.disconnect().await,
            ConnectionState::Connecting { .. }
        ));

        gate.send(()).unwrap();
        assert!(first.await.unwrap().is_ok());
        assert!(session.state().is_connected());
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_metadata_update_without_transition() {
        let (session, mock, _) = session();
        let mut initial = Metadata::new();
        initial.insert("name".into(), serde_json::json!("NeuroGlove-1"));
        let device = mock.push_device_with(initial);
        session.connect(TransportKind::Radio).await.unwrap();
        let mut events = session.subscribe();

        let mut update = Metadata::new();
        update.insert("rssi".into(), serde_json::json!(-63));
        device.push_metadata(update).await;

        match next_event(&mut events).await {
            SessionEvent::MetadataUpdated(merged) => {
                assert_eq!(merged["name"], "NeuroGlove-1");
                assert_eq!(merged["rssi"], -63);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(session.state().metadata().unwrap()["rssi"], -63);
    }

    #[tokio::test]
    async fn test_send_without_link() {
        let (session, _, _) = session();
        let err = session.send("ping").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));

        let log = session.current_log(today_utc()).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].text, "[error] Not connected to a device");
    }

    #[tokio::test]
    async fn test_dropped_session_releases_device() {
        let (session, mock, _) = session();
        let mut device = mock.push_device();
        session.connect(TransportKind::Serial).await.unwrap();

        drop(session);
        assert!(device.host_closed().await);
    }
}

//! Wireless (BLE) backend
//!
//! The glove exposes a Nordic UART Service: the host writes to the RX
//! characteristic and receives notifications on TX. Notifications feed a
//! chunk reader so sessions see the same byte stream as a serial port; each
//! written frame is split into ATT-sized writes and acknowledged once all of
//! them went out.
//!
//! Built only with the `radio` feature; without it every request reports the
//! capability as unavailable.

use uuid::Uuid;

use glovelink_core::prelude::*;
use glovelink_core::TransportKind;

use crate::channel::{Channel, RadioParams};

/// Nordic UART Service
pub const UART_SERVICE: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
/// Host -> device characteristic
pub const UART_RX_CHAR: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
/// Device -> host characteristic (notify)
pub const UART_TX_CHAR: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

const KIND: TransportKind = TransportKind::Radio;

/// Open a radio link to the first peripheral matching `params`
#[cfg(feature = "radio")]
pub async fn open(params: &RadioParams) -> Result<Channel> {
    ble::open(params).await
}

#[cfg(not(feature = "radio"))]
pub async fn open(params: &RadioParams) -> Result<Channel> {
    debug!("radio request for '{}' rejected: no radio support", params.name_prefix);
    Err(Error::unavailable(
        KIND,
        "built without radio support (enable the `radio` feature)",
    ))
}

/// Whether an advertised peripheral is the one requested.
///
/// A configured address must match exactly (case-insensitive); otherwise the
/// advertised name must start with the configured prefix.
#[cfg_attr(not(feature = "radio"), allow(dead_code))]
fn matches_peripheral(params: &RadioParams, address: &str, name: Option<&str>) -> bool {
    if let Some(wanted) = &params.address {
        return wanted.eq_ignore_ascii_case(address);
    }
    name.is_some_and(|n| n.starts_with(&params.name_prefix))
}

#[cfg(feature = "radio")]
mod ble {
    use std::time::Duration;

    use btleplug::api::{
        Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
    };
    use btleplug::platform::{Adapter, Manager, Peripheral};
    use futures_util::StreamExt;
    use tokio::sync::mpsc;

    use glovelink_core::Metadata;

    use super::*;
    use crate::bridge::{self, FrameRequest};

    const SCAN_POLL: Duration = Duration::from_millis(250);
    const BRIDGE_CAPACITY: usize = 64;
    /// ATT payload for the default MTU
    const MAX_WRITE: usize = 20;

    struct Found {
        peripheral: Peripheral,
        name: Option<String>,
        rssi: Option<i16>,
    }

    fn btle_err(e: btleplug::Error) -> Error {
        match e {
            btleplug::Error::PermissionDenied => Error::denied(KIND, e.to_string()),
            _ => Error::open_failed(KIND, e.to_string()),
        }
    }

    pub(super) async fn open(params: &RadioParams) -> Result<Channel> {
        let manager = Manager::new()
            .await
            .map_err(|e| Error::unavailable(KIND, e.to_string()))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| Error::unavailable(KIND, e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::unavailable(KIND, "no Bluetooth adapter found"))?;

        info!(
            "Scanning {:?} for '{}'",
            params.scan_window,
            params.address.as_deref().unwrap_or(&params.name_prefix)
        );

        adapter
            .start_scan(ScanFilter {
                services: vec![UART_SERVICE],
            })
            .await
            .map_err(btle_err)?;
        let found = find_peripheral(&adapter, params).await;
        if let Err(e) = adapter.stop_scan().await {
            debug!("stop_scan failed: {}", e);
        }
        let found = found?.ok_or_else(|| {
            Error::denied(
                KIND,
                format!(
                    "no device matching '{}' found",
                    params.address.as_deref().unwrap_or(&params.name_prefix)
                ),
            )
        })?;

        let peripheral = found.peripheral;
        peripheral.connect().await.map_err(btle_err)?;

        let setup = async {
            peripheral.discover_services().await.map_err(btle_err)?;

            let characteristics = peripheral.characteristics();
            let find = |uuid: Uuid| -> Result<Characteristic> {
                characteristics
                    .iter()
                    .find(|c| c.uuid == uuid)
                    .cloned()
                    .ok_or_else(|| Error::open_failed(KIND, format!("device has no characteristic {uuid}")))
            };
            let rx_char = find(UART_RX_CHAR)?;
            let tx_char = find(UART_TX_CHAR)?;

            peripheral.subscribe(&tx_char).await.map_err(btle_err)?;
            let notifications = peripheral.notifications().await.map_err(btle_err)?;
            Ok::<_, Error>((rx_char, notifications))
        };
        let (rx_char, notifications) = match setup.await {
            Ok(link) => link,
            Err(e) => {
                warn!("Radio setup failed, disconnecting: {}", e);
                if let Err(de) = peripheral.disconnect().await {
                    debug!("radio disconnect: {}", de);
                }
                return Err(e);
            }
        };

        let mut metadata = Metadata::new();
        metadata.insert("address".into(), serde_json::json!(peripheral.address().to_string()));
        if let Some(name) = &found.name {
            metadata.insert("name".into(), serde_json::json!(name));
        }
        if let Some(rssi) = found.rssi {
            metadata.insert("rssi".into(), serde_json::json!(rssi));
        }

        info!("Radio link up: {}", peripheral.address());

        let (chunk_tx, reader) = bridge::chunk_channel(BRIDGE_CAPACITY);
        let (frames, mut frame_rx) = bridge::frame_channel(BRIDGE_CAPACITY);

        let bridge_peripheral = peripheral.clone();
        tokio::spawn(async move {
            let mut notifications = notifications;
            loop {
                tokio::select! {
                    note = notifications.next() => match note {
                        Some(note) if note.uuid == UART_TX_CHAR => {
                            if chunk_tx.send(Ok(note.value)).await.is_err() {
                                break;
                            }
                        }
                        Some(_) => {}
                        None => {
                            info!("Radio notifications ended");
                            break;
                        }
                    },
                    request = frame_rx.recv() => match request {
                        Some(request) => write_request(&bridge_peripheral, &rx_char, request).await,
                        None => break,
                    },
                }
            }

            drop(chunk_tx);
            if let Err(e) = bridge_peripheral.disconnect().await {
                debug!("radio disconnect: {}", e);
            }
            debug!("radio bridge finished");
        });

        let mut channel = Channel::framed(KIND, reader, frames).with_metadata(metadata.clone());

        if let Some(interval) = params.rssi_poll {
            let (meta_tx, meta_rx) = mpsc::channel(4);
            tokio::spawn(poll_rssi(peripheral, metadata, interval, meta_tx));
            channel = channel.with_metadata_updates(meta_rx);
        }

        Ok(channel)
    }

    /// Write one frame in ATT-sized pieces, stopping at the first failure
    async fn write_request(
        peripheral: &Peripheral,
        rx_char: &Characteristic,
        request: FrameRequest,
    ) {
        let mut result = Ok(());
        for chunk in request.bytes.chunks(MAX_WRITE) {
            if let Err(e) = peripheral
                .write(rx_char, chunk, WriteType::WithoutResponse)
                .await
            {
                warn!("Radio write of {} bytes failed: {}", request.bytes.len(), e);
                result = Err(std::io::Error::other(e.to_string()));
                break;
            }
        }
        request.complete(result);
    }

    async fn find_peripheral(adapter: &Adapter, params: &RadioParams) -> Result<Option<Found>> {
        let deadline = tokio::time::Instant::now() + params.scan_window;

        loop {
            for peripheral in adapter.peripherals().await.map_err(btle_err)? {
                let Some(props) = peripheral.properties().await.map_err(btle_err)? else {
                    continue;
                };
                let address = peripheral.address().to_string();
                if matches_peripheral(params, &address, props.local_name.as_deref()) {
                    return Ok(Some(Found {
                        peripheral,
                        name: props.local_name,
                        rssi: props.rssi,
                    }));
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(SCAN_POLL).await;
        }
    }

    /// Refresh signal strength until the link or the session goes away.
    async fn poll_rssi(
        peripheral: Peripheral,
        mut metadata: Metadata,
        interval: Duration,
        tx: mpsc::Sender<Metadata>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if !peripheral.is_connected().await.unwrap_or(false) {
                break;
            }
            let rssi = match peripheral.properties().await {
                Ok(Some(props)) => props.rssi,
                _ => None,
            };
            let Some(rssi) = rssi else { continue };
            if metadata.get("rssi") == Some(&serde_json::json!(rssi)) {
                continue;
            }
            metadata.insert("rssi".into(), serde_json::json!(rssi));
            if tx.send(metadata.clone()).await.is_err() {
                break;
            }
        }
        trace!("rssi poll finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_by_name_prefix() {
        let params = RadioParams::default();
        assert!(matches_peripheral(&params, "AA:BB", Some("NeuroGlove-7F")));
        assert!(!matches_peripheral(&params, "AA:BB", Some("Headphones")));
        assert!(!matches_peripheral(&params, "AA:BB", None));
    }

    #[test]
    fn test_address_takes_precedence() {
        let params = RadioParams {
            address: Some("c0:ff:ee:00:11:22".into()),
            ..Default::default()
        };
        assert!(matches_peripheral(&params, "C0:FF:EE:00:11:22", None));
        assert!(!matches_peripheral(&params, "C0:FF:EE:00:11:23", Some("NeuroGlove")));
    }

    #[test]
    fn test_uart_uuids() {
        assert_eq!(
            UART_SERVICE.to_string(),
            "6e400001-b5a3-f393-e0a9-e50e24dcca9e"
        );
        assert_eq!(
            UART_TX_CHAR.to_string(),
            "6e400003-b5a3-f393-e0a9-e50e24dcca9e"
        );
    }

    #[cfg(not(feature = "radio"))]
    #[tokio::test]
    async fn test_unavailable_without_feature() {
        let err = open(&RadioParams::default()).await.unwrap_err();
        assert!(matches!(err, Error::TransportUnavailable { .. }));
    }
}

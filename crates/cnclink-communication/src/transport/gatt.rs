//! Bluetooth LE GATT transport
//!
//! Talks to controllers exposing the Nordic UART Service (NUS): one
//! characteristic the host writes to, one the device notifies on. The
//! incoming stream is the sequence of notification payloads.
//!
//! The native backend uses `btleplug` and is only compiled with the `ble`
//! feature; without it [`GattTransport::open`] reports the kind as
//! unsupported.

use super::{kind_mismatch, IncomingStream, Transport};
use async_trait::async_trait;
use cnclink_core::{ConnectionConfig, ConnectionError, Result, TransportKind};
use uuid::Uuid;

/// Nordic UART Service
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// Characteristic the host writes commands to (NUS RX)
pub const UART_WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// Characteristic the device notifies output on (NUS TX)
pub const UART_NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Largest payload for one characteristic write at the default ATT MTU
pub const GATT_WRITE_CHUNK: usize = 20;

/// Whether an advertisement matches the requested device
///
/// With a name filter the advertised name must contain it (case-insensitive).
/// Without one the device must advertise the UART service.
pub fn advertisement_matches(
    name_filter: Option<&str>,
    local_name: Option<&str>,
    services: &[Uuid],
) -> bool {
    match name_filter {
        Some(filter) => local_name
            .is_some_and(|name| name.to_lowercase().contains(&filter.to_lowercase())),
        None => services.contains(&UART_SERVICE_UUID),
    }
}

/// Split a frame into characteristic-sized writes
pub fn write_chunks(frame: &[u8]) -> impl Iterator<Item = &[u8]> {
    frame.chunks(GATT_WRITE_CHUNK)
}

/// Run `setup`; if it fails, run `undo` before returning the error
#[cfg_attr(not(feature = "ble"), allow(dead_code))]
async fn undo_on_error<T>(
    setup: impl std::future::Future<Output = Result<T>>,
    undo: impl std::future::Future<Output = ()>,
) -> Result<T> {
    match setup.await {
        Ok(value) => Ok(value),
        Err(e) => {
            undo.await;
            Err(e)
        }
    }
}

/// GATT transport over the Nordic UART Service
pub struct GattTransport {
    #[cfg(feature = "ble")]
    link: Option<backend::GattLink>,
}

impl GattTransport {
    /// Create an unopened GATT transport
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "ble")]
            link: None,
        }
    }
}

impl Default for GattTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "ble")]
#[async_trait]
impl Transport for GattTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Gatt
    }

    async fn open(&mut self, config: &ConnectionConfig) -> Result<IncomingStream> {
        let ConnectionConfig::Gatt {
            device_name,
            scan_timeout_ms,
        } = config
        else {
            return Err(kind_mismatch(TransportKind::Gatt, config).into());
        };
        config.validate()?;
        if self.is_open() {
            self.close().await?;
        }

        let (link, rx) = backend::GattLink::connect(
            device_name.as_deref(),
            std::time::Duration::from_millis(*scan_timeout_ms),
        )
        .await?;
        self.link = Some(link);
        Ok(rx)
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let link = self.link.as_ref().ok_or(ConnectionError::NotOpen)?;
        link.write(frame).await
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(link) = self.link.take() {
            link.disconnect().await;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.link.is_some()
    }
}

#[cfg(not(feature = "ble"))]
#[async_trait]
impl Transport for GattTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Gatt
    }

    async fn open(&mut self, config: &ConnectionConfig) -> Result<IncomingStream> {
        if config.kind() != TransportKind::Gatt {
            return Err(kind_mismatch(TransportKind::Gatt, config).into());
        }
        config.validate()?;
        Err(ConnectionError::Unsupported {
            kind: TransportKind::Gatt,
            reason: "built without the `ble` feature".to_string(),
        }
        .into())
    }

    async fn write_frame(&mut self, _frame: &[u8]) -> Result<()> {
        Err(ConnectionError::NotOpen.into())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        false
    }
}

#[cfg(feature = "ble")]
mod backend {
    //! `btleplug` discovery, subscription, and notification forwarding.

    use super::*;
    use crate::transport::{TransportEvent, INCOMING_CHANNEL_CAPACITY};
    use btleplug::api::{
        Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
        ScanFilter, WriteType,
    };
    use btleplug::platform::{Adapter, Manager, Peripheral};
    use futures_util::StreamExt;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    const SCAN_POLL: Duration = Duration::from_millis(250);

    fn not_found(reason: impl Into<String>) -> ConnectionError {
        ConnectionError::DeviceNotFound {
            reason: reason.into(),
        }
    }

    fn handshake(endpoint: &str, e: btleplug::Error) -> ConnectionError {
        ConnectionError::HandshakeFailed {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    }

    /// An open NUS link
    pub(super) struct GattLink {
        peripheral: Peripheral,
        write_char: Characteristic,
        notify_char: Characteristic,
        reader: JoinHandle<()>,
        closed: bool,
    }

    impl GattLink {
        pub(super) async fn connect(
            name_filter: Option<&str>,
            scan_timeout: Duration,
        ) -> Result<(Self, IncomingStream)> {
            let manager = Manager::new()
                .await
                .map_err(|e| not_found(format!("bluetooth unavailable: {e}")))?;
            let adapter = manager
                .adapters()
                .await
                .map_err(|e| not_found(format!("bluetooth unavailable: {e}")))?
                .into_iter()
                .next()
                .ok_or_else(|| not_found("no bluetooth adapter"))?;

            let peripheral = discover(&adapter, name_filter, scan_timeout).await?;
            let endpoint = peripheral.id().to_string();

            peripheral
                .connect()
                .await
                .map_err(|e| handshake(&endpoint, e))?;

            // Past this point the peripheral is connected; any failure
            // disconnects it again.
            let setup = async {
                peripheral
                    .discover_services()
                    .await
                    .map_err(|e| handshake(&endpoint, e))?;

                let characteristics = peripheral.characteristics();
                let find =
                    |uuid: Uuid| characteristics.iter().find(|c| c.uuid == uuid).cloned();
                let (Some(write_char), Some(notify_char)) = (
                    find(UART_WRITE_CHARACTERISTIC_UUID),
                    find(UART_NOTIFY_CHARACTERISTIC_UUID),
                ) else {
                    return Err(not_found(format!(
                        "{endpoint} does not expose the UART characteristics"
                    ))
                    .into());
                };

                peripheral
                    .subscribe(&notify_char)
                    .await
                    .map_err(|e| handshake(&endpoint, e))?;
                let notifications = peripheral
                    .notifications()
                    .await
                    .map_err(|e| handshake(&endpoint, e))?;
                let central_events = adapter
                    .events()
                    .await
                    .map_err(|e| handshake(&endpoint, e))?;
                Ok::<_, cnclink_core::Error>((write_char, notify_char, notifications, central_events))
            };
            let undo = async {
                if let Err(e) = peripheral.disconnect().await {
                    tracing::debug!("BLE disconnect after failed setup: {}", e);
                }
            };
            let (write_char, notify_char, notifications, central_events) =
                undo_on_error(setup, undo).await?;

            let (tx, rx) = mpsc::channel(INCOMING_CHANNEL_CAPACITY);
            let id = peripheral.id();
            let reader = tokio::spawn(async move {
                let mut notifications = notifications;
                let mut central_events = central_events;
                let reason = loop {
                    tokio::select! {
                        notification = notifications.next() => match notification {
                            Some(n) if n.uuid == UART_NOTIFY_CHARACTERISTIC_UUID => {
                                if tx.send(TransportEvent::Data(n.value)).await.is_err() {
                                    return;
                                }
                            }
                            Some(_) => {}
                            None => break "notification stream ended".to_string(),
                        },
                        event = central_events.next() => match event {
                            Some(CentralEvent::DeviceDisconnected(gone)) if gone == id => {
                                break "device disconnected".to_string();
                            }
                            Some(_) => {}
                            None => break "adapter event stream ended".to_string(),
                        },
                    }
                };
                let _ = tx.send(TransportEvent::Closed { reason }).await;
            });

            tracing::info!("Connected to BLE UART device {}", endpoint);
            Ok((
                Self {
                    peripheral,
                    write_char,
                    notify_char,
                    reader,
                    closed: false,
                },
                rx,
            ))
        }

        pub(super) async fn write(&self, frame: &[u8]) -> Result<()> {
            let write_type = if self
                .write_char
                .properties
                .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE)
            {
                WriteType::WithoutResponse
            } else {
                WriteType::WithResponse
            };
            for chunk in write_chunks(frame) {
                self.peripheral
                    .write(&self.write_char, chunk, write_type)
                    .await
                    .map_err(|e| ConnectionError::WriteFailed {
                        reason: e.to_string(),
                    })?;
            }
            Ok(())
        }

        pub(super) async fn disconnect(mut self) {
            self.closed = true;
            self.reader.abort();
            if let Err(e) = self.peripheral.unsubscribe(&self.notify_char).await {
                tracing::debug!("BLE unsubscribe failed: {}", e);
            }
            if let Err(e) = self.peripheral.disconnect().await {
                tracing::debug!("BLE disconnect failed: {}", e);
            }
            tracing::info!("Closed BLE UART device {}", self.peripheral.id());
        }
    }

    impl Drop for GattLink {
        fn drop(&mut self) {
            self.reader.abort();
            if self.closed {
                return;
            }
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let peripheral = self.peripheral.clone();
                runtime.spawn(async move {
                    if let Err(e) = peripheral.disconnect().await {
                        tracing::debug!("BLE disconnect on drop failed: {}", e);
                    }
                });
            }
        }
    }

    async fn discover(
        adapter: &Adapter,
        name_filter: Option<&str>,
        scan_timeout: Duration,
    ) -> Result<Peripheral> {
        adapter
            .start_scan(ScanFilter {
                services: vec![UART_SERVICE_UUID],
            })
            .await
            .map_err(|e| not_found(format!("scan failed: {e}")))?;

        let deadline = tokio::time::Instant::now() + scan_timeout;
        let found = loop {
            let peripherals = adapter.peripherals().await.unwrap_or_default();
            let mut hit = None;
            for peripheral in peripherals {
                if let Ok(Some(props)) = peripheral.properties().await {
                    if advertisement_matches(
                        name_filter,
                        props.local_name.as_deref(),
                        &props.services,
                    ) {
                        hit = Some(peripheral);
                        break;
                    }
                }
            }
            if hit.is_some() || tokio::time::Instant::now() >= deadline {
                break hit;
            }
            tokio::time::sleep(SCAN_POLL).await;
        };

        if let Err(e) = adapter.stop_scan().await {
            tracing::debug!("BLE stop_scan failed: {}", e);
        }
        found.ok_or_else(|| {
            not_found(format!(
                "no UART device{} found within {} ms",
                name_filter
                    .map(|n| format!(" named {n:?}"))
                    .unwrap_or_default(),
                scan_timeout.as_millis()
            ))
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uart_uuids() {
        assert_eq!(
            UART_SERVICE_UUID.to_string(),
            "6e400001-b5a3-f393-e0a9-e50e24dcca9e"
        );
        assert_eq!(
            UART_WRITE_CHARACTERISTIC_UUID.to_string(),
            "6e400002-b5a3-f393-e0a9-e50e24dcca9e"
        );
        assert_eq!(
            UART_NOTIFY_CHARACTERISTIC_UUID.to_string(),
            "6e400003-b5a3-f393-e0a9-e50e24dcca9e"
        );
    }

    #[test]
    fn test_advertisement_matching() {
        let nus = [UART_SERVICE_UUID];
        assert!(advertisement_matches(None, None, &nus));
        assert!(!advertisement_matches(None, Some("FluidNC"), &[]));
        assert!(advertisement_matches(Some("fluid"), Some("FluidNC-BT"), &[]));
        assert!(!advertisement_matches(Some("grbl"), Some("FluidNC-BT"), &nus));
        assert!(!advertisement_matches(Some("grbl"), None, &nus));
    }

    #[test]
    fn test_write_chunks_respect_mtu() {
        let frame = vec![b'G'; 45];
        let chunks: Vec<&[u8]> = write_chunks(&frame).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 20);
        assert_eq!(chunks[2].len(), 5);
        assert_eq!(write_chunks(&[0x18]).count(), 1);
    }

    #[tokio::test]
    async fn test_failed_setup_runs_undo() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let undone = AtomicBool::new(false);
        let result: Result<()> = undo_on_error(
            async { Err(cnclink_core::Error::from(ConnectionError::NotOpen)) },
            async { undone.store(true, Ordering::SeqCst) },
        )
        .await;
        assert!(result.is_err());
        assert!(undone.load(Ordering::SeqCst));

        let undone = AtomicBool::new(false);
        let value = undo_on_error(async { Ok::<_, cnclink_core::Error>(7) }, async {
            undone.store(true, Ordering::SeqCst)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert!(!undone.load(Ordering::SeqCst));
    }

    #[cfg(not(feature = "ble"))]
    #[tokio::test]
    async fn test_open_without_backend_is_unsupported() {
        let mut transport = GattTransport::new();
        let err = transport
            .open(&ConnectionConfig::gatt(None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported"));
        assert!(!transport.is_open());
    }
}

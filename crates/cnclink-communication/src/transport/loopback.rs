//! In-memory loopback transport
//!
//! Stands in for any medium. Frames written by the link are recorded on a
//! [`LoopbackHandle`]; the handle injects controller output and can end the
//! stream or make opens and writes fail.

use super::{IncomingStream, Transport, TransportEvent, TransportFactory, INCOMING_CHANNEL_CAPACITY};
use async_trait::async_trait;
use cnclink_core::{
    thread_safe, ConnectionConfig, ConnectionError, Result, ThreadSafe, TransportKind,
};
use tokio::sync::mpsc;

#[derive(Default)]
struct LoopbackInner {
    tx: Option<mpsc::Sender<TransportEvent>>,
    frames: Vec<Vec<u8>>,
    fail_open: bool,
    fail_writes: bool,
    opened_kind: Option<TransportKind>,
    opens: usize,
}

/// Controller side of a loopback transport
#[derive(Clone)]
pub struct LoopbackHandle {
    inner: ThreadSafe<LoopbackInner>,
}

impl LoopbackHandle {
    /// Create a handle with no open transport
    pub fn new() -> Self {
        Self {
            inner: thread_safe(LoopbackInner::default()),
        }
    }

    /// Inject raw bytes as if the controller sent them
    ///
    /// Returns `false` when no transport is open or the reader has gone away.
    pub fn feed(&self, bytes: impl Into<Vec<u8>>) -> bool {
        let inner = self.inner.lock();
        match &inner.tx {
            Some(tx) => tx.try_send(TransportEvent::Data(bytes.into())).is_ok(),
            None => false,
        }
    }

    /// Inject one line terminated with `\r\n`
    pub fn feed_line(&self, line: &str) -> bool {
        self.feed(format!("{line}\r\n"))
    }

    /// End the incoming stream as if the medium dropped
    pub fn hang_up(&self, reason: impl Into<String>) -> bool {
        let tx = self.inner.lock().tx.take();
        match tx {
            Some(tx) => tx
                .try_send(TransportEvent::Closed {
                    reason: reason.into(),
                })
                .is_ok(),
            None => false,
        }
    }

    /// Every frame written so far, in write order
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.inner.lock().frames.clone()
    }

    /// Written frames other than status polls
    pub fn frames_without_polls(&self) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .frames
            .iter()
            .filter(|frame| frame.as_slice() != b"?")
            .cloned()
            .collect()
    }

    /// Forget recorded frames
    pub fn clear_frames(&self) {
        self.inner.lock().frames.clear();
    }

    /// Make subsequent opens fail
    pub fn set_fail_open(&self, fail: bool) {
        self.inner.lock().fail_open = fail;
    }

    /// Make subsequent writes fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Kind of the config the transport was last opened with
    pub fn opened_kind(&self) -> Option<TransportKind> {
        self.inner.lock().opened_kind
    }

    /// Number of successful opens
    pub fn open_count(&self) -> usize {
        self.inner.lock().opens
    }

    /// Whether a transport is currently open on this handle
    pub fn is_open(&self) -> bool {
        self.inner.lock().tx.is_some()
    }
}

impl Default for LoopbackHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport whose far end is a [`LoopbackHandle`]
pub struct LoopbackTransport {
    kind: TransportKind,
    handle: LoopbackHandle,
    open: bool,
    generation: usize,
}

impl LoopbackTransport {
    /// Create a transport reporting `kind` and driven by `handle`
    pub fn new(kind: TransportKind, handle: LoopbackHandle) -> Self {
        Self {
            kind,
            handle,
            open: false,
            generation: 0,
        }
    }

    /// Detach the handle, unless a newer transport has opened on it since
    fn release(&mut self) {
        if self.open {
            let mut inner = self.handle.inner.lock();
            if inner.opens == self.generation {
                inner.tx = None;
            }
            self.open = false;
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn open(&mut self, config: &ConnectionConfig) -> Result<IncomingStream> {
        config.validate()?;
        let mut inner = self.handle.inner.lock();
        if inner.fail_open {
            return Err(ConnectionError::FailedToOpen {
                port: config.to_string(),
                reason: "loopback open refused".to_string(),
            }
            .into());
        }
        let (tx, rx) = mpsc::channel(INCOMING_CHANNEL_CAPACITY);
        inner.tx = Some(tx);
        inner.opened_kind = Some(config.kind());
        inner.opens += 1;
        self.generation = inner.opens;
        self.open = true;
        Ok(rx)
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if !self.open {
            return Err(ConnectionError::NotOpen.into());
        }
        let mut inner = self.handle.inner.lock();
        if inner.fail_writes {
            return Err(ConnectionError::WriteFailed {
                reason: "loopback write refused".to_string(),
            }
            .into());
        }
        inner.frames.push(frame.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.release();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.release();
    }
}

/// Factory handing out loopback transports bound to one handle
#[derive(Clone)]
pub struct LoopbackFactory {
    handle: LoopbackHandle,
}

impl LoopbackFactory {
    /// Create a factory and its controller-side handle
    pub fn new() -> (Self, LoopbackHandle) {
        let handle = LoopbackHandle::new();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl TransportFactory for LoopbackFactory {
    fn create(&self, kind: TransportKind) -> Box<dyn Transport> {
        Box::new(LoopbackTransport::new(kind, self.handle.clone()))
    }
}

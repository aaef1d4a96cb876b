// Shared test doubles for the delivery core.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{ClientTransport, Error, Message, Result};

/// In-memory transport that records writes and can be stalled, resumed, or
/// made to fail, so backpressure and failure paths are drivable from tests.
pub(crate) struct MockTransport {
    sent: Mutex<Vec<Message>>,
    pings: AtomicUsize,
    open: AtomicBool,
    fail_writes: AtomicBool,
    resumed: Notify,
    closed: AtomicBool,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            pings: AtomicUsize::new(0),
            open: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            resumed: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// A transport whose writes block until [`resume`] is called.
    ///
    /// [`resume`]: MockTransport::resume
    pub(crate) fn stalled() -> Arc<Self> {
        let transport = Self::new();
        transport.open.store(false, Ordering::SeqCst);
        transport
    }

    /// A transport whose writes and pings always fail.
    pub(crate) fn failing() -> Arc<Self> {
        let transport = Self::new();
        transport.fail_writes.store(true, Ordering::SeqCst);
        transport
    }

    pub(crate) fn resume(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.resumed.notify_waiters();
    }

    pub(crate) fn sent(&self) -> Vec<Message> {
        self.sent.lock().expect("mock transport lock").clone()
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.sent.lock().expect("mock transport lock").len()
    }

    pub(crate) fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientTransport for MockTransport {
    async fn send(&self, message: &Message) -> Result<()> {
        loop {
            if self.open.load(Ordering::SeqCst) {
                break;
            }
            let resumed = self.resumed.notified();
            if self.open.load(Ordering::SeqCst) {
                break;
            }
            resumed.await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Transport("mock write failure".into()));
        }
        self.sent
            .lock()
            .expect("mock transport lock")
            .push(message.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Transport("mock ping failure".into()));
        }
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Poll `condition` until it holds or the deadline passes.
pub(crate) async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

// Client transport seam.
//
// The delivery core never touches a socket directly; it talks to a duplex,
// message-oriented transport handle with write and ping primitives. The
// gateway provides a WebSocket-backed implementation, tests provide mocks.

use async_trait::async_trait;

use crate::{Message, Result};

#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Write one message to the client. Callers bound this with their own
    /// timeout; implementations map I/O failures to [`Error::Transport`].
    ///
    /// [`Error::Transport`]: crate::Error::Transport
    async fn send(&self, message: &Message) -> Result<()>;

    /// Liveness ping.
    async fn ping(&self) -> Result<()>;

    /// Close the connection with a normal-closure status. Best effort;
    /// must be safe to call more than once.
    async fn close(&self);
}

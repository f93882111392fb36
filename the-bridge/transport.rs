use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::PeerCallError;

/// Outbound half of the bridge: delivers one serialized envelope to the peer.
///
/// `transmit` resolves once the transport accepted the message; it does not
/// wait for any reply.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn transmit(&self, message: String) -> Result<(), PeerCallError>;
}

/// In-process transport that forwards serialized envelopes into a channel.
///
/// Used for loopback wiring and by tests that play the peer side.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
  tx: mpsc::UnboundedSender<String>,
}

impl ChannelTransport {
  pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }
}

#[async_trait]
impl Transport for ChannelTransport {
  async fn transmit(&self, message: String) -> Result<(), PeerCallError> {
    self.tx.send(message).map_err(|_| PeerCallError::Closed)
  }
}

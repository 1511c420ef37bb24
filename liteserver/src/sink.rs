//! `send_message`'s external collaborator boundary: this crate validates
//! and deduplicates, the surrounding node actually propagates the message
//! into the chain's mempool/broadcast path.

/// Accepts an external message already validated and deduplicated by
/// [`crate::LiteServer::send_message`]. Returns a status word mirroring the
/// one returned to the lite client.
pub trait MessageSink: Send + Sync {
    fn submit(&self, data: &[u8]) -> Result<i32, String>;
}

use std::collections::VecDeque;

use take6_protocol::ClientToServer;

/// Commands issued while the socket is not open yet, kept in submission
/// order. Encoding is deferred to flush time so the envelope carries the
/// room the connection actually opened for.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<ClientToServer>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: ClientToServer) {
        self.pending.push_back(command);
    }

    /// Empties the queue, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = ClientToServer> + '_ {
        self.pending.drain(..)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

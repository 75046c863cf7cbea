use std::sync::Mutex;

use super::protocol::GameMessage;

/// One of the two FIFO queues crossing the simulation/transport boundary.
/// A single mutex around a growable buffer; consumers drain wholesale.
#[derive(Debug, Default)]
pub struct MessageQueue {
    inner: Mutex<Vec<GameMessage>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Vec::with_capacity(1024)),
        }
    }

    pub fn push(&self, message: GameMessage) {
        self.inner.lock().unwrap().push(message);
    }

    pub fn push_all(&self, messages: impl IntoIterator<Item = GameMessage>) {
        self.inner.lock().unwrap().extend(messages);
    }

    pub fn pop_all(&self) -> Vec<GameMessage> {
        std::mem::take(&mut *self.inner.lock().unwrap())
    }

    pub fn deplete(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

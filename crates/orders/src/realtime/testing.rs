//! Notifier fakes

use parking_lot::Mutex;

use super::{Channel, Notifier, NotifyError, NotifyResult, OrderEvent};

/// Records every publish instead of delivering it
#[derive(Default)]
pub struct RecordingNotifier {
    published: Mutex<Vec<(String, OrderEvent)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(channel key, event)` pair, in publish order
    pub fn published(&self) -> Vec<(String, OrderEvent)> {
        self.published.lock().clone()
    }

    /// Events published on one channel
    pub fn events_for(&self, channel: &Channel) -> Vec<OrderEvent> {
        let key = channel.key();
        self.published
            .lock()
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.published.lock().is_empty()
    }

    pub fn clear(&self) {
        self.published.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn publish(&self, channel: &Channel, event: OrderEvent) -> NotifyResult<usize> {
        self.published.lock().push((channel.key(), event));
        Ok(1)
    }
}

/// Fails every publish, as a broken transport would
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn publish(&self, channel: &Channel, _event: OrderEvent) -> NotifyResult<usize> {
        Err(NotifyError::Transport(format!("{} is unreachable", channel.key())))
    }
}

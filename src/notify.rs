use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{EmployeeId, Event};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for schedule changes, one channel per employee plus one for
/// company-wide changes.
pub struct NotifyHub {
    channels: DashMap<EmployeeId, broadcast::Sender<Event>>,
    company: broadcast::Sender<Event>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            company: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to changes on one employee's schedule. Creates the channel if needed.
    pub fn subscribe(&self, employee_id: EmployeeId) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(employee_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Subscribe to company-level changes (company hours).
    pub fn subscribe_company(&self) -> broadcast::Receiver<Event> {
        self.company.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, employee_id: EmployeeId, event: &Event) {
        if let Some(sender) = self.channels.get(&employee_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Company-wide change: goes to the company channel and every employee channel.
    pub fn broadcast(&self, event: &Event) {
        let _ = self.company.send(event.clone());
        for entry in self.channels.iter() {
            let _ = entry.value().send(event.clone());
        }
    }

    /// Drop an employee's channel; current receivers see it close.
    pub fn remove(&self, employee_id: &EmployeeId) {
        self.channels.remove(employee_id);
    }
}

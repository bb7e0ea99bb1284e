use std::{fmt, time::Duration};

use crossbeam_channel::{unbounded, Receiver, Sender};

/// an alarm lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub alarm_id: u64,
    pub name: String,
}

impl Message {
    #[must_use]
    pub fn new(kind: MessageType, alarm_id: u64, name: impl Into<String>) -> Self {
        Self {
            kind,
            alarm_id,
            name: name.into(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MessageType::AlarmStarted => write!(f, "alarm {} started", self.name),
            MessageType::AlarmDismissed => write!(f, "alarm {} dismissed", self.name),
            MessageType::AlarmSnoozed { interval } => write!(
                f,
                "alarm {} snoozed for {}s",
                self.name,
                interval.as_secs_f64()
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    AlarmStarted,
    AlarmDismissed,
    AlarmSnoozed { interval: Duration },
}

/// fire and forget publisher for alarm events
pub trait EventBus: Send + Sync {
    fn post(&self, message: Message);
}

/// Publishes events onto a channel, whoever holds the receiver consumes them.
#[derive(Debug, Clone)]
pub struct ChannelBus {
    sender: Sender<Message>,
}

impl ChannelBus {
    #[must_use]
    pub fn new() -> (Self, Receiver<Message>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl EventBus for ChannelBus {
    fn post(&self, message: Message) {
        if let Err(err) = self.sender.send(message) {
            log::debug!("nobody is listening for alarm events, dropped: {}", err.0);
        }
    }
}

//! Headless, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels so that every subscriber receives
//! every message without a slow subscriber blocking the watchdog.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Recovery`] | Escalation runs starting, steps firing, cancellations |
//! | [`Topic::Privileges`] | Gate progress, denials, the terminal outcome |
//! | [`Topic::LockMode`] | Pin/unpin transitions and unlock hints |
//! | [`Topic::Presence`] | Target surface entering or leaving the foreground |
//! | [`Topic::Diagnostics`] | Heartbeats and capability warnings |
//!
//! Every event published to a topic is also copied to the firehose, which
//! [`EventBus::subscribe_all`] exposes.

use kiosk_types::{EventPayload, KioskEvent};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Recovery,
    Privileges,
    LockMode,
    Presence,
    Diagnostics,
}

impl Topic {
    /// The lane a payload is routed to by [`EventBus::publish`].
    pub fn of(payload: &EventPayload) -> Self {
        match payload {
            EventPayload::RunStarted { .. }
            | EventPayload::StepExecuted { .. }
            | EventPayload::RunCancelled { .. } => Topic::Recovery,
            EventPayload::PrivilegeProgress(_)
            | EventPayload::PrivilegeDenied(_)
            | EventPayload::PrivilegesSettled(_) => Topic::Privileges,
            EventPayload::LockModeChanged { .. } | EventPayload::UnlockHint { .. } => {
                Topic::LockMode
            }
            EventPayload::PresenceChanged { .. } => Topic::Presence,
            EventPayload::CapabilityWarning(_) | EventPayload::Heartbeat { .. } => {
                Topic::Diagnostics
            }
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    firehose: broadcast::Sender<KioskEvent>,
    recovery: broadcast::Sender<KioskEvent>,
    privileges: broadcast::Sender<KioskEvent>,
    lock_mode: broadcast::Sender<KioskEvent>,
    presence: broadcast::Sender<KioskEvent>,
    diagnostics: broadcast::Sender<KioskEvent>,
}

impl EventBus {
    /// Create a new bus; `capacity` applies to every channel independently.
    pub fn new(capacity: usize) -> Self {
        let (firehose, _) = broadcast::channel(capacity);
        let (recovery, _) = broadcast::channel(capacity);
        let (privileges, _) = broadcast::channel(capacity);
        let (lock_mode, _) = broadcast::channel(capacity);
        let (presence, _) = broadcast::channel(capacity);
        let (diagnostics, _) = broadcast::channel(capacity);
        Self {
            firehose,
            recovery,
            privileges,
            lock_mode,
            presence,
            diagnostics,
        }
    }

    /// Publish `event` on the lane chosen by [`Topic::of`].
    pub fn publish(&self, event: KioskEvent) -> usize {
        let topic = Topic::of(&event.payload);
        self.publish_to(topic, event)
    }

    /// Publish `event` to `topic` and the firehose.
    ///
    /// Returns how many receivers were handed the event across both.  Nobody
    /// listening is normal for a headless watchdog and yields `0`.
    pub fn publish_to(&self, topic: Topic, event: KioskEvent) -> usize {
        let on_topic = self.topic_sender(topic).send(event.clone()).unwrap_or(0);
        let on_firehose = self.firehose.send(event).unwrap_or(0);
        trace!(?topic, receivers = on_topic + on_firehose, "event published");
        on_topic + on_firehose
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Every event on every topic.
    pub fn subscribe_all(&self) -> broadcast::Receiver<KioskEvent> {
        self.firehose.subscribe()
    }

    /// Firehose filtered to events whose `source` starts with `prefix`.
    pub fn subscribe_source(&self, prefix: impl Into<String>) -> SourceSubscriber {
        SourceSubscriber {
            prefix: prefix.into(),
            receiver: self.firehose.subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<KioskEvent> {
        match topic {
            Topic::Recovery => &self.recovery,
            Topic::Privileges => &self.privileges,
            Topic::LockMode => &self.lock_mode,
            Topic::Presence => &self.presence,
            Topic::Diagnostics => &self.diagnostics,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Receivers
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<KioskEvent>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// `Err(Lagged(n))` means `n` events were dropped for this subscriber;
    /// `Err(Closed)` means the bus is gone.
    pub async fn recv(&mut self) -> Result<KioskEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`][Self::recv].
    pub fn try_recv(&mut self) -> Result<KioskEvent, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

pub struct SourceSubscriber {
    prefix: String,
    receiver: broadcast::Receiver<KioskEvent>,
}

impl SourceSubscriber {
    /// Wait for the next matching event; `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<KioskEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.source.starts_with(&self.prefix) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(prefix = %self.prefix, lagged_by = n, "SourceSubscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

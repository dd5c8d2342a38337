//! `kiosk-middleware` – Diagnostics Plumbing
//!
//! Carries watchdog events to whoever wants to observe them (the shell, log
//! sinks, tests) without the watchdog knowing who is listening.
//!
//! # Modules
//!
//! - [`bus`] – Headless, topic-based publish/subscribe event bus built on
//!   Tokio broadcast channels, plus a firehose lane that sees everything.

pub mod bus;

pub use bus::{EventBus, SourceSubscriber, Topic, TopicReceiver};

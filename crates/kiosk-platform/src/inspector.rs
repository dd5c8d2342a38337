//! `TaskInspector` – the host's authoritative "what is in front" fact.

use kiosk_types::Presence;

/// Answers whether the target surface is currently the active task.
///
/// This is the check every escalation step makes immediately before acting,
/// and the only deduplication shared between independent watchdog processes.
/// Hosts that cannot answer return [`Presence::Unknown`].
pub trait TaskInspector: Send + Sync {
    fn target_presence(&self) -> Presence;
}

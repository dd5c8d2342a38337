//! `Notifier` – fallback UI for manual launches and user-visible warnings.
//!
//! Nothing here is required for correctness: every affordance only offers the
//! user a way to trigger the same launch the watchdog is already attempting.

use kiosk_types::Affordance;

pub trait Notifier: Send + Sync {
    /// Post (or refresh) a tap-to-open affordance.
    fn post(&self, affordance: Affordance);

    /// Remove a previously posted affordance.  No-op when absent.
    fn clear(&self, affordance: Affordance);

    /// Show a transient warning, e.g. "Permission denied: Overlay Permission".
    fn warn(&self, message: &str);
}

//! Timeout configuration for cabinet setup.

use std::time::Duration;

/// Deadlines and pacing for the setup state machine.
///
/// All values are explicit configuration; nothing in the state machines
/// hard-codes a duration. Defaults are generous enough for a LAN test
/// cluster and are expected to be tuned per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupTimetable {
    /// How long to wait in `WAIT_FOR_IDS` for every member's details
    /// before declaring the setup stalled.
    pub wait_for_ids: Duration,
    /// How long `SEND_SHARES` plus `WAIT_FOR_SHARES` may take before the
    /// setup is declared stalled.
    pub wait_for_shares: Duration,
    /// Minimum spacing between resend attempts for undelivered shares.
    pub resend_interval: Duration,
}

impl Default for SetupTimetable {
    fn default() -> Self {
        Self {
            wait_for_ids: Duration::from_secs(30),
            wait_for_shares: Duration::from_secs(30),
            resend_interval: Duration::from_secs(2),
        }
    }
}

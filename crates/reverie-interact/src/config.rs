//! Coordinator configuration.

use std::time::Duration;

/// Deadlines for the coordinator's remote calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionConfig {
    /// Deadline for a resonance or amplification toggle.
    pub toggle_timeout: Duration,
    /// Deadline for creating a branch.
    pub branch_timeout: Duration,
    /// Deadline for fetching a thread's entries.
    pub load_timeout: Duration,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            toggle_timeout: Duration::from_secs(15),
            branch_timeout: Duration::from_secs(30),
            load_timeout: Duration::from_secs(10),
        }
    }
}

impl InteractionConfig {
    pub fn with_toggle_timeout(mut self, timeout: Duration) -> Self {
        self.toggle_timeout = timeout;
        self
    }

    pub fn with_branch_timeout(mut self, timeout: Duration) -> Self {
        self.branch_timeout = timeout;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }
}

//! Optimistic interaction coordination for Reverie.
//!
//! [`InteractionCoordinator`] applies resonance and amplification toggles to
//! the local caches before the repository answers, reconciles with the
//! repository's answer, and rolls back exactly on failure. It also merges
//! built threads with cached interaction data into [`RenderedEntry`]
//! records.

mod config;
mod coordinator;
mod error;
mod hydrate;
mod pending;

pub use config::InteractionConfig;
pub use coordinator::{InteractionCoordinator, InteractionKind, InteractionOutcome};
pub use error::InteractionError;
pub use hydrate::RenderedEntry;

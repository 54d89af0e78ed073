//! Dispatcher configuration.

use serde::{Deserialize, Serialize};

/// Tunables of the transactional dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Drain passes allowed per event kind before a cascade is treated as
    /// runaway and the request fails.
    pub max_drain_passes: usize,
}

impl DispatcherConfig {
    /// Default pass limit.
    pub const DEFAULT_MAX_DRAIN_PASSES: usize = 64;
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_drain_passes: Self::DEFAULT_MAX_DRAIN_PASSES,
        }
    }
}

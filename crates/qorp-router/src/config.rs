//! Router configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default upper bound on the lifetime of an outstanding route request.
pub const DEFAULT_RREQ_TIMEOUT_MS: u64 = 10_000;

/// Runtime knobs for a router instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Route request TTL in milliseconds. A pending request that has not
    /// been answered within this window is failed with a timeout.
    #[serde(default = "default_rreq_timeout_ms")]
    pub rreq_timeout_ms: u64,
}

impl RouterConfig {
    /// The route request TTL as a [`Duration`].
    pub fn rreq_timeout(&self) -> Duration {
        Duration::from_millis(self.rreq_timeout_ms)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            rreq_timeout_ms: DEFAULT_RREQ_TIMEOUT_MS,
        }
    }
}

fn default_rreq_timeout_ms() -> u64 {
    DEFAULT_RREQ_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout() {
        let config = RouterConfig::default();
        assert_eq!(config.rreq_timeout(), Duration::from_secs(10));
    }
}

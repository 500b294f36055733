//! Engine configuration loaded from environment variables.
//!
//! Embedders that construct [`SyncConfig`] directly can rely on
//! [`SyncConfig::default`]; binaries load and validate it once at startup.
//!
//! ## Optional Variables
//!
//! - `MAX_PUBLIC_LINKS` - Visibility cap for public links (default: 5)
//! - `EVENT_BUFFER_LIMIT` - Deferred realtime event budget before the engine
//!   falls back to a full resync (default: 256, min: 16)
//! - `RECONNECT_BASE_DELAY_MS` - First reconnect backoff delay (default: 100)
//! - `RECONNECT_MAX_DELAY_MS` - Backoff ceiling (default: 5000)

use anyhow::Result;
use std::env;

/// Tunables for a [`LinkBoard`](crate::application::board::LinkBoard) session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum number of links that may be public at once.
    pub max_public_links: usize,
    /// How many realtime events may sit deferred (behind an in-flight
    /// mutation or an active reorder session) before the engine gives up
    /// on incremental merging and resynchronizes from the gateway.
    pub event_buffer_limit: usize,
    /// Delay before the first resubscribe attempt after channel loss.
    /// Subsequent attempts double up to `reconnect_max_delay_ms`.
    pub reconnect_base_delay_ms: u64,
    /// Upper bound for the reconnect backoff delay.
    pub reconnect_max_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_public_links: 5,
            event_buffer_limit: 256,
            reconnect_base_delay_ms: 100,
            reconnect_max_delay_ms: 5_000,
        }
    }
}

impl SyncConfig {
    /// Loads configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_public_links = env::var("MAX_PUBLIC_LINKS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_public_links);

        let event_buffer_limit = env::var("EVENT_BUFFER_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.event_buffer_limit);

        let reconnect_base_delay_ms = env::var("RECONNECT_BASE_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.reconnect_base_delay_ms);

        let reconnect_max_delay_ms = env::var("RECONNECT_MAX_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.reconnect_max_delay_ms);

        Self {
            max_public_links,
            event_buffer_limit,
            reconnect_base_delay_ms,
            reconnect_max_delay_ms,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `max_public_links` is 0 or larger than 1000
    /// - `event_buffer_limit` is below 16 or above 1,000,000
    /// - the reconnect delays are zero or inverted
    pub fn validate(&self) -> Result<()> {
        if self.max_public_links == 0 || self.max_public_links > 1_000 {
            anyhow::bail!(
                "MAX_PUBLIC_LINKS must be between 1 and 1000, got {}",
                self.max_public_links
            );
        }

        if self.event_buffer_limit < 16 {
            anyhow::bail!(
                "EVENT_BUFFER_LIMIT must be at least 16, got {}",
                self.event_buffer_limit
            );
        }

        if self.event_buffer_limit > 1_000_000 {
            anyhow::bail!(
                "EVENT_BUFFER_LIMIT is too large (max: 1000000), got {}",
                self.event_buffer_limit
            );
        }

        if self.reconnect_base_delay_ms == 0 {
            anyhow::bail!("RECONNECT_BASE_DELAY_MS must be greater than 0");
        }

        if self.reconnect_max_delay_ms < self.reconnect_base_delay_ms {
            anyhow::bail!(
                "RECONNECT_MAX_DELAY_MS ({}) must not be smaller than RECONNECT_BASE_DELAY_MS ({})",
                self.reconnect_max_delay_ms,
                self.reconnect_base_delay_ms
            );
        }

        if self.reconnect_max_delay_ms > 300_000 {
            anyhow::bail!(
                "RECONNECT_MAX_DELAY_MS is too large (max: 300000), got {}",
                self.reconnect_max_delay_ms
            );
        }

        Ok(())
    }

    /// Prints the configuration summary.
    pub fn print_summary(&self) {
        tracing::info!("Configuration loaded:");
        tracing::info!("  Public link cap: {}", self.max_public_links);
        tracing::info!("  Event buffer limit: {}", self.event_buffer_limit);
        tracing::info!(
            "  Reconnect backoff: {}ms .. {}ms",
            self.reconnect_base_delay_ms,
            self.reconnect_max_delay_ms
        );
    }
}

/// Loads and validates configuration from environment variables.
///
/// # Errors
///
/// Returns an error if validation fails.
///
/// # Note
///
/// This function expects environment variables to be already loaded
/// (e.g., via `dotenvy::dotenv()` in the binary).
pub fn load_from_env() -> Result<SyncConfig> {
    let config = SyncConfig::from_env();
    config.validate()?;
    Ok(config)
}

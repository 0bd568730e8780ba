//! Configuration for the settlement engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ChannelError, Result, constants};

/// Tunables of a deployed meta-channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Challenge window opened by `start_settle` on the meta-channel.
    pub meta_challenge_window: Duration,
    /// Quiet period after a sub-channel dispute opens before a
    /// force-push may be used.
    pub force_push_response_window: Duration,
    /// Maximum number of sub-channels one meta-state may commit to.
    pub max_subchannels: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            meta_challenge_window: Duration::from_secs(
                constants::DEFAULT_META_CHALLENGE_WINDOW_SECS,
            ),
            force_push_response_window: Duration::from_secs(
                constants::DEFAULT_FORCE_PUSH_RESPONSE_WINDOW_SECS,
            ),
            max_subchannels: constants::DEFAULT_MAX_SUBCHANNELS,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| ChannelError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations that would make disputes unanswerable.
    pub fn validate(&self) -> Result<()> {
        if self.meta_challenge_window.is_zero() {
            return Err(ChannelError::Configuration(
                "meta_challenge_window must be non-zero".into(),
            ));
        }
        if self.force_push_response_window.is_zero() {
            return Err(ChannelError::Configuration(
                "force_push_response_window must be non-zero".into(),
            ));
        }
        if self.max_subchannels == 0 {
            return Err(ChannelError::Configuration(
                "max_subchannels must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Meta challenge window as a chrono duration, saturating.
    #[must_use]
    pub fn meta_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.meta_challenge_window).unwrap_or(chrono::Duration::MAX)
    }

    /// Force-push quiet period as a chrono duration, saturating.
    #[must_use]
    pub fn force_push_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.force_push_response_window)
            .unwrap_or(chrono::Duration::MAX)
    }
}

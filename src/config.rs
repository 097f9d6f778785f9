use std::time::Duration;

use serde::Deserialize;

/// Engine tuning knobs. Protocol windows (cadence, inactivity, reveal
/// threshold) are seconds of ledger time; task intervals and the ledger
/// timeout are wall-clock durations, serialized as fractional seconds.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Identifiers per issued batch.
    pub batch_size: u64,
    /// Minimum seconds between successive issuances for one account.
    pub mint_interval: u64,
    /// Seconds of silence after which an account counts as inactive.
    pub inactivity_threshold: u64,
    /// When set, overrides the ledger's reveal threshold. Read fresh on
    /// every validity check either way.
    pub reveal_threshold_override: Option<u64>,
    /// Interval of the global cleanup task.
    #[serde(with = "duration_secs")]
    pub cleanup_interval: Duration,
    /// Interval of the periodic cadence check.
    #[serde(with = "duration_secs")]
    pub cadence_check_interval: Duration,
    /// Interval of the inactivity reaper.
    #[serde(with = "duration_secs")]
    pub reap_interval: Duration,
    /// Bounded wait for a ledger commit confirmation.
    #[serde(with = "duration_secs")]
    pub ledger_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            mint_interval: 300,
            inactivity_threshold: 3_600,
            reveal_threshold_override: None,
            cleanup_interval: Duration::from_secs(60),
            cadence_check_interval: Duration::from_secs(60),
            reap_interval: Duration::from_secs(300),
            ledger_timeout: Duration::from_secs(30),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

use std::env;
use std::time::Duration;

/// Default simulated delay before the tutor answers.
pub const DEFAULT_TUTOR_LATENCY: Duration = Duration::from_millis(1000);

/// Runtime knobs for the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerConfig {
    pub tutor_latency: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            tutor_latency: DEFAULT_TUTOR_LATENCY,
        }
    }
}

impl LedgerConfig {
    /// Read `TUTOR_LATENCY_MS`, falling back to the default when unset or
    /// not a number.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_latency_var(env::var("TUTOR_LATENCY_MS").ok().as_deref())
    }

    #[must_use]
    pub fn with_tutor_latency(mut self, latency: Duration) -> Self {
        self.tutor_latency = latency;
        self
    }

    fn from_latency_var(raw: Option<&str>) -> Self {
        let tutor_latency = raw
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map_or(DEFAULT_TUTOR_LATENCY, Duration::from_millis);
        Self { tutor_latency }
    }
}

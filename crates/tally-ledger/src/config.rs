use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Tuning for the loggers and the recovery scanner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Upper bound on one signing device call. A call that takes longer is
    /// recorded as a device failure.
    pub device_timeout: Duration,
    /// Age after which an unconfirmed `Pending` row is marked failed by
    /// the recovery scanner. Must exceed `device_timeout`, otherwise a
    /// row whose device call is still running can be expired.
    pub stale_after: Duration,
    /// Capacity of each chain writer's request queue.
    pub writer_queue: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            device_timeout: Duration::from_secs(10),
            stale_after: Duration::from_secs(5 * 60),
            writer_queue: 256,
        }
    }
}

impl LedgerConfig {
    /// Reject settings under which recovery could expire an attempt the
    /// device is still signing.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.device_timeout.is_zero() {
            return Err(LedgerError::InvalidConfig(
                "device_timeout must be greater than zero".into(),
            ));
        }
        if self.stale_after <= self.device_timeout {
            return Err(LedgerError::InvalidConfig(format!(
                "stale_after ({:?}) must exceed device_timeout ({:?})",
                self.stale_after, self.device_timeout
            )));
        }
        Ok(())
    }
}

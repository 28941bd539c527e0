use std::time::Duration;

use anyhow::{Context, Result};
use helper::{env_load_or, env_var};
use nutype::nutype;

use crate::repository::retry::RetryPolicy;

env_var!(BID_TX_TIMEOUT_MSECS);
env_var!(BID_RETRY_MAX_ATTEMPTS);
env_var!(BID_RETRY_INITIAL_MSECS);
env_var!(BID_RETRY_MAX_MSECS);

#[nutype(derive(Debug, Clone, Copy), validate(greater = 0))]
pub struct TransactionTimeoutMs(u64);

#[nutype(derive(Debug, Clone, Copy), validate(less_or_equal = 20))]
pub struct RetryCount(u32);

#[nutype(derive(Debug, Clone, Copy), validate(greater = 0))]
pub struct RetryIntervalMs(u64);

/// Engine settings; every knob is environment-driven with a default.
#[derive(Debug, Clone)]
pub struct BiddingConfig {
    /// Wall-clock budget the store grants each transaction.
    pub tx_timeout: Duration,
    pub retry:      RetryPolicy,
}

impl BiddingConfig {
    pub fn from_env() -> Result<Self> {
        let tx_timeout =
            env_load_or!(TransactionTimeoutMs, BID_TX_TIMEOUT_MSECS, u64, 5000);
        let max_retries =
            env_load_or!(RetryCount, BID_RETRY_MAX_ATTEMPTS, u32, 3);
        let initial_interval =
            env_load_or!(RetryIntervalMs, BID_RETRY_INITIAL_MSECS, u64, 100);
        let max_interval =
            env_load_or!(RetryIntervalMs, BID_RETRY_MAX_MSECS, u64, 2000);
        Ok(Self {
            tx_timeout: Duration::from_millis(tx_timeout.into_inner()),
            retry:      RetryPolicy {
                max_retries:      max_retries.into_inner(),
                initial_interval: Duration::from_millis(
                    initial_interval.into_inner(),
                ),
                max_interval:     Duration::from_millis(
                    max_interval.into_inner(),
                ),
                ..RetryPolicy::default()
            },
        })
    }
}

impl Default for BiddingConfig {
    fn default() -> Self {
        Self {
            tx_timeout: Duration::from_secs(5),
            retry:      RetryPolicy::default(),
        }
    }
}

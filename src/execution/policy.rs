//! Per-node retry and delay policy

use crate::core::{EngineSettings, NodeTiming};
use std::time::Duration;

/// How often and how many times a node's recognition is attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait between attempts
    pub interval: Duration,
    /// Attempts before the node's budget is exhausted, at least 1
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Derive the policy from node timing, falling back to settings
    ///
    /// `max_attempts = ceil(timeout / interval)`, clamped to
    /// `1..=settings.max_attempts`.
    pub fn for_node(timing: &NodeTiming, settings: &EngineSettings) -> Self {
        let interval_ms = timing
            .rate_limit
            .unwrap_or(settings.default_rate_limit_ms);
        let timeout_ms = timing.timeout.unwrap_or(settings.default_timeout_ms);

        let attempts = if interval_ms == 0 {
            settings.max_attempts as u64
        } else {
            timeout_ms.div_ceil(interval_ms)
        };
        let ceiling = settings.max_attempts.max(1) as u64;

        Self::new(
            Duration::from_millis(interval_ms),
            attempts.clamp(1, ceiling) as u32,
        )
    }

    /// Whether another attempt is allowed after `attempt` attempts
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Everything time-related the engine needs for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePolicy {
    pub retry: RetryPolicy,
    pub pre_delay: Duration,
    pub post_delay: Duration,
}

impl NodePolicy {
    pub fn for_node(timing: &NodeTiming, settings: &EngineSettings) -> Self {
        Self {
            retry: RetryPolicy::for_node(timing, settings),
            pre_delay: Duration::from_millis(
                timing.pre_delay.unwrap_or(settings.default_pre_delay_ms),
            ),
            post_delay: Duration::from_millis(
                timing.post_delay.unwrap_or(settings.default_post_delay_ms),
            ),
        }
    }
}

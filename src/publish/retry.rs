// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Push retry policy.
//!
//! Publishers never lock the remote. Instead they retry pushes that lost a
//! race against another publisher, backing off exponentially with random
//! jitter so that publishers racing each other spread out. Retries are always
//! bounded by attempt count, and optionally by wall-clock deadline.

use crate::config::RetrySettings;

use rand::Rng;
use std::{cmp::min, time::Duration};

/// Configuration for push retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of push attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before first retry.
    pub initial_backoff: Duration,

    /// Ceiling of delay between retries.
    pub max_backoff: Duration,

    /// Growth factor of delay between retries.
    pub multiplier: f64,

    /// Add up to 50% random jitter to each delay.
    pub jitter: bool,

    /// Give up once retrying would run past this much time.
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            multiplier: 2.0,
            jitter: true,
            deadline: settings.deadline(),
        }
    }
}

impl RetryPolicy {
    /// Retry without any delay.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
            deadline: None,
        }
    }

    /// Start a fresh sequence of retry delays.
    pub fn backoff(&self) -> Backoff<'_> {
        Backoff {
            policy: self,
            next: self.initial_backoff,
        }
    }
}

/// Sequence of exponentially growing retry delays.
#[derive(Debug, Clone)]
pub struct Backoff<'a> {
    policy: &'a RetryPolicy,
    next: Duration,
}

impl Backoff<'_> {
    /// Produce delay before next retry.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next;
        self.next = min(base.mul_f64(self.policy.multiplier), self.policy.max_backoff);

        if self.policy.jitter && !base.is_zero() {
            let half = base.as_millis() as u64 / 2;
            let jitter = rand::thread_rng().gen_range(0..=half);
            return base + Duration::from_millis(jitter);
        }

        base
    }
}

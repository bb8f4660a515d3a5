//! Incremental Backoff Reconnect
//!
//! A [`ReconnectPolicy`] maps an attempt number to the delay before the next
//! attempt:
//!
//! ```text
//! delay(n) = min(initial_delay * multiplier^n, max_delay)   (± jitter)
//! ```
//!
//! and answers [`Reconnect::Stop`] once `n` reaches `max_attempts`.
//!
//! The policy holds no per-connection state, so one instance can be shared
//! by any number of connections. Each reconnect loop keeps its own counter in
//! a [`ReconnectState`] and resets it after a successful connection.
//!
//! # Jitter
//!
//! Off by default. With `jitter(f)` each delay is moved by a uniformly drawn
//! offset in `[-f, +f]` of itself, then clamped to `[0, max_delay]`.

use std::time::Duration;

use rand::Rng;

use crate::error::{EndpointError, Result};
use crate::spec::SocketTarget;

/// Default delay before the first reconnect
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Default ceiling on any single delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default growth factor between attempts
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// What a reconnect loop should do next
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reconnect {
    /// Wait this long, then try again
    Delay(Duration),
    /// Give up
    Stop,
}

impl Reconnect {
    /// The delay, if not stopping
    #[must_use]
    pub fn delay(self) -> Option<Duration> {
        match self {
            Self::Delay(delay) => Some(delay),
            Self::Stop => None,
        }
    }
}

/// Start configuring a backoff reconnect policy
#[must_use]
pub fn backoff_reconnect() -> BackoffReconnect {
    BackoffReconnect::default()
}

/// Builder for [`ReconnectPolicy`]
#[derive(Clone, Debug)]
pub struct BackoffReconnect {
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: f64,
    addresses: Vec<SocketTarget>,
}

impl Default for BackoffReconnect {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: None,
            jitter: 0.0,
            addresses: Vec::new(),
        }
    }
}

impl BackoffReconnect {
    /// Delay before the first reconnect
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Growth factor between attempts; `<= 1` keeps the delay flat
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Ceiling on any single delay
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Stop after this many reconnects
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Keep reconnecting forever
    #[must_use]
    pub fn unbounded(mut self) -> Self {
        self.max_attempts = None;
        self
    }

    /// Fraction in `[0, 1)` by which each delay may be randomly moved
    #[must_use]
    pub fn jitter(mut self, fraction: f64) -> Self {
        self.jitter = fraction;
        self
    }

    /// Add a failover address
    #[must_use]
    pub fn address(mut self, target: SocketTarget) -> Self {
        self.addresses.push(target);
        self
    }

    /// Add several failover addresses
    #[must_use]
    pub fn addresses(mut self, targets: impl IntoIterator<Item = SocketTarget>) -> Self {
        self.addresses.extend(targets);
        self
    }

    /// Validate and freeze the policy
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::Configuration` if the initial delay is zero,
    /// the max delay is below the initial delay, the multiplier is not a
    /// finite number, or jitter is outside `[0, 1)`.
    pub fn build(self) -> Result<ReconnectPolicy> {
        if self.initial_delay.is_zero() {
            return Err(EndpointError::Configuration(
                "reconnect initial delay must be greater than zero".to_string(),
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(EndpointError::Configuration(format!(
                "reconnect max delay {:?} is below initial delay {:?}",
                self.max_delay, self.initial_delay
            )));
        }
        if !self.multiplier.is_finite() {
            return Err(EndpointError::Configuration(format!(
                "reconnect multiplier must be finite, got {}",
                self.multiplier
            )));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(EndpointError::Configuration(format!(
                "reconnect jitter must be in [0, 1), got {}",
                self.jitter
            )));
        }

        Ok(ReconnectPolicy {
            initial_delay: self.initial_delay,
            multiplier: self.multiplier,
            max_delay: self.max_delay,
            max_attempts: self.max_attempts,
            jitter: self.jitter,
            addresses: self.addresses,
        })
    }
}

/// Validated, shareable backoff strategy
#[derive(Clone, Debug, PartialEq)]
pub struct ReconnectPolicy {
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: f64,
    addresses: Vec<SocketTarget>,
}

impl ReconnectPolicy {
    /// Decision for the given zero-based attempt number
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Reconnect {
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return Reconnect::Stop;
        }

        let base = self.base_delay(attempt);
        if self.jitter == 0.0 {
            return Reconnect::Delay(base);
        }

        let spread = base.as_nanos() as f64 * self.jitter;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        let jittered = (base.as_nanos() as f64 + offset)
            .clamp(0.0, self.max_delay.as_nanos() as f64);
        Reconnect::Delay(Duration::from_nanos(jittered.round() as u64))
    }

    /// Delay for the attempt before jitter
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if self.multiplier <= 1.0 {
            return self.initial_delay;
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_nanos() as f64 * self.multiplier.powi(exponent);
        let max = self.max_delay.as_nanos() as f64;
        if !scaled.is_finite() || scaled >= max {
            return self.max_delay;
        }
        Duration::from_nanos(scaled.round() as u64)
    }

    /// Address to dial on the given attempt
    ///
    /// Rotates round-robin through `current` followed by the failover
    /// addresses, so attempt 0 always dials `current`.
    #[must_use]
    pub fn next_address(&self, attempt: u32, current: &SocketTarget) -> SocketTarget {
        let ring = self.addresses.len() + 1;
        match attempt as usize % ring {
            0 => current.clone(),
            n => self.addresses[n - 1].clone(),
        }
    }

    /// Delay before the first reconnect
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Growth factor
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Delay ceiling
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Attempt limit, `None` when unbounded
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Jitter fraction
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Failover addresses
    pub fn addresses(&self) -> &[SocketTarget] {
        &self.addresses
    }
}

/// Attempt counter owned by one reconnect loop
#[derive(Debug)]
pub struct ReconnectState<'a> {
    policy: &'a ReconnectPolicy,
    attempt: u32,
}

impl<'a> ReconnectState<'a> {
    /// Fresh counter for a loop using `policy`
    #[must_use]
    pub fn new(policy: &'a ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Record a failed attempt and get the next decision
    pub fn on_failure(&mut self) -> Reconnect {
        let decision = self.policy.next_delay(self.attempt);
        if decision != Reconnect::Stop {
            self.attempt = self.attempt.saturating_add(1);
        }
        decision
    }

    /// Record a successful connection; the next failure starts a fresh backoff
    pub fn on_success(&mut self) {
        self.attempt = 0;
    }

    /// Reconnects scheduled since the last success
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

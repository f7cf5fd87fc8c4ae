//! Per-source failure gate.
//!
//! A source that keeps failing under the service's own timeout is parked for
//! a cooldown. Once the cooldown is over, exactly one search is let through
//! to try it again; every other concurrent search keeps skipping it until
//! that trial reports back. Disabled unless configured.
//!
//! Only outcomes that say something about the source count. Cancellation and
//! timeouts under a caller's own shortened deadline leave the gate alone, so
//! no single request can park a source for everybody else.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Externally visible state of one source's gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls go through.
    Closed,
    /// Parked; calls are skipped.
    Open,
    /// A single trial call is in flight.
    HalfOpen,
}

/// Gate settings, the `[breaker]` table of the host config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    /// Consecutive counted failures that park a source.
    pub failure_threshold: u32,
    /// How long a parked source is skipped, in seconds.
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

impl CircuitBreakerConfig {
    fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// What a search may do with a source right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Call it normally.
    Call,
    /// Call it as the single trial after a cooldown.
    Trial,
    /// Leave it out of this search.
    Skip,
}

#[derive(Debug, Clone, Copy)]
enum Gate {
    Closed,
    Parked { until: Instant },
    Trial { started: Instant },
}

#[derive(Debug, Clone, Copy)]
struct Tally {
    gate: Gate,
    failures: u32,
}

impl Default for Tally {
    fn default() -> Self {
        Self {
            gate: Gate::Closed,
            failures: 0,
        }
    }
}

impl Tally {
    fn state(&self) -> CircuitState {
        match self.gate {
            Gate::Closed => CircuitState::Closed,
            Gate::Parked { .. } => CircuitState::Open,
            Gate::Trial { .. } => CircuitState::HalfOpen,
        }
    }
}

/// Failure accounting for every source a service has called.
///
/// Owned by one [`crate::SearchService`] behind a mutex.
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    tallies: HashMap<String, Tally>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            tallies: HashMap::new(),
        }
    }

    /// Decide whether `source` takes part in the current search.
    ///
    /// A parked source whose cooldown is over hands out one [`Admission::Trial`]
    /// and skips everyone else until [`record_success`](Self::record_success),
    /// [`record_failure`](Self::record_failure) or
    /// [`release`](Self::release) is called for it. A trial that never
    /// reports back (its search was dropped) expires after another cooldown.
    pub fn admit(&mut self, source: &str) -> Admission {
        if !self.config.enabled {
            return Admission::Call;
        }
        let cooldown = self.config.cooldown();
        let Some(tally) = self.tallies.get_mut(source) else {
            return Admission::Call;
        };

        let now = Instant::now();
        match tally.gate {
            Gate::Closed => Admission::Call,
            Gate::Parked { until } if now < until => Admission::Skip,
            Gate::Trial { started } if now < started + cooldown => Admission::Skip,
            Gate::Parked { .. } | Gate::Trial { .. } => {
                tracing::debug!(source, "cooldown over, admitting trial call");
                tally.gate = Gate::Trial { started: now };
                Admission::Trial
            }
        }
    }

    /// The source answered; close its gate.
    pub fn record_success(&mut self, source: &str) {
        if let Some(tally) = self.tallies.get_mut(source) {
            *tally = Tally::default();
        }
    }

    /// The source failed, or timed out under the service's own deadline.
    pub fn record_failure(&mut self, source: &str) {
        let threshold = self.config.failure_threshold.max(1);
        let until = Instant::now() + self.config.cooldown();
        let tally = self.tallies.entry(source.to_string()).or_default();
        tally.failures = tally.failures.saturating_add(1);

        let failed_trial = matches!(tally.gate, Gate::Trial { .. });
        if self.config.enabled && (failed_trial || tally.failures >= threshold) {
            if !matches!(tally.gate, Gate::Parked { .. }) {
                tracing::warn!(source, failures = tally.failures, "source parked");
            }
            tally.gate = Gate::Parked { until };
        }
    }

    /// The call ended without telling anything about the source's health
    /// (cancelled, or cut short by a caller deadline). A pending trial is
    /// handed back so the next search can run it.
    pub fn release(&mut self, source: &str) {
        if let Some(tally) = self.tallies.get_mut(source) {
            if matches!(tally.gate, Gate::Trial { .. }) {
                tally.gate = Gate::Parked {
                    until: Instant::now(),
                };
            }
        }
    }

    pub fn state(&self, source: &str) -> CircuitState {
        self.tallies
            .get(source)
            .map_or(CircuitState::Closed, Tally::state)
    }

    /// `(source, state, consecutive_failures)` for every source with a
    /// recorded failure, sorted by name.
    pub fn health_report(&self) -> Vec<(String, CircuitState, u32)> {
        let mut report: Vec<_> = self
            .tallies
            .iter()
            .map(|(name, tally)| (name.clone(), tally.state(), tally.failures))
            .collect();
        report.sort_by(|a, b| a.0.cmp(&b.0));
        report
    }

    pub fn reset(&mut self) {
        self.tallies.clear();
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(failure_threshold: u32, cooldown_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            enabled: true,
            failure_threshold,
            cooldown_secs,
        })
    }

    fn park(breaker: &mut CircuitBreaker, source: &str) {
        for _ in 0..breaker.config().failure_threshold {
            breaker.record_failure(source);
        }
    }

    #[test]
    fn off_by_default() {
        let mut breaker = CircuitBreaker::default();
        assert!(!breaker.config().enabled);
        for _ in 0..10 {
            breaker.record_failure("tg:alpha");
        }
        assert_eq!(breaker.admit("tg:alpha"), Admission::Call);
        assert_eq!(breaker.state("tg:alpha"), CircuitState::Closed);
    }

    #[test]
    fn unknown_source_is_called() {
        let mut breaker = enabled(3, 60);
        assert_eq!(breaker.admit("never-seen"), Admission::Call);
        assert_eq!(breaker.state("never-seen"), CircuitState::Closed);
    }

    #[test]
    fn parks_only_at_threshold() {
        let mut breaker = enabled(3, 60);
        breaker.record_failure("alpha");
        breaker.record_failure("alpha");
        assert_eq!(breaker.admit("alpha"), Admission::Call);
        breaker.record_failure("alpha");
        assert_eq!(breaker.state("alpha"), CircuitState::Open);
        assert_eq!(breaker.admit("alpha"), Admission::Skip);
    }

    #[test]
    fn success_resets_the_count() {
        let mut breaker = enabled(3, 60);
        for _ in 0..10 {
            breaker.record_failure("alpha");
            breaker.record_failure("alpha");
            breaker.record_success("alpha");
        }
        assert_eq!(breaker.state("alpha"), CircuitState::Closed);
        assert_eq!(breaker.health_report()[0].2, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_admits_a_single_trial() {
        let mut breaker = enabled(2, 60);
        park(&mut breaker, "alpha");

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(breaker.admit("alpha"), Admission::Skip);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(breaker.admit("alpha"), Admission::Trial);
        assert_eq!(breaker.state("alpha"), CircuitState::HalfOpen);
        assert_eq!(breaker.admit("alpha"), Admission::Skip);
        assert_eq!(breaker.admit("alpha"), Admission::Skip);
    }

    #[tokio::test(start_paused = true)]
    async fn trial_result_decides() {
        let mut breaker = enabled(2, 60);
        park(&mut breaker, "good");
        park(&mut breaker, "bad");
        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(breaker.admit("good"), Admission::Trial);
        breaker.record_success("good");
        assert_eq!(breaker.admit("good"), Admission::Call);

        assert_eq!(breaker.admit("bad"), Admission::Trial);
        breaker.record_failure("bad");
        assert_eq!(breaker.state("bad"), CircuitState::Open);
        assert_eq!(breaker.admit("bad"), Admission::Skip);
    }

    #[tokio::test(start_paused = true)]
    async fn released_trial_goes_to_the_next_caller() {
        let mut breaker = enabled(1, 60);
        park(&mut breaker, "alpha");
        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(breaker.admit("alpha"), Admission::Trial);
        breaker.release("alpha");
        assert_eq!(breaker.admit("alpha"), Admission::Trial);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_trial_expires() {
        let mut breaker = enabled(1, 60);
        park(&mut breaker, "alpha");
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(breaker.admit("alpha"), Admission::Trial);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(breaker.admit("alpha"), Admission::Skip);
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(breaker.admit("alpha"), Admission::Trial);
    }

    #[test]
    fn release_leaves_closed_and_parked_alone() {
        let mut breaker = enabled(1, 60);
        breaker.release("alpha");
        assert!(breaker.health_report().is_empty());

        park(&mut breaker, "alpha");
        breaker.release("alpha");
        assert_eq!(breaker.admit("alpha"), Admission::Skip);
    }

    #[test]
    fn report_and_reset() {
        let mut breaker = enabled(1, 60);
        breaker.record_failure("zeta");
        breaker.record_failure("alpha");
        breaker.record_success("alpha");

        assert_eq!(
            breaker.health_report(),
            vec![
                ("alpha".to_string(), CircuitState::Closed, 0),
                ("zeta".to_string(), CircuitState::Open, 1),
            ]
        );

        breaker.reset();
        assert!(breaker.health_report().is_empty());
        assert_eq!(breaker.admit("zeta"), Admission::Call);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: CircuitBreakerConfig =
            serde_json::from_str(r#"{"enabled": true}"#).expect("deserialize");
        assert!(config.enabled);
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.cooldown_secs, 60);
    }
}

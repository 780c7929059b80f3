//! Owns one breaker per configured provider.

use std::collections::HashMap;
use std::time::Instant;

use crate::config::{CircuitBreakerConfig, ProviderConfig};

use super::{BreakerSnapshot, CircuitBreaker};

/// Immutable after construction except for delegated per-breaker state updates.
///
/// `for_provider` panics on an unknown name: that indicates a bug in how the
/// provider list was wired up, not a condition a request can trigger, since every
/// name the forward engine looks up came from the same validated provider list this
/// registry was built from.
pub struct BreakerRegistry {
    breakers: HashMap<String, CircuitBreaker>,
    last_provider_name: String,
    probe_probability: f64,
}

impl BreakerRegistry {
    pub fn new(providers: &[ProviderConfig], policy: CircuitBreakerConfig) -> Self {
        let breakers = providers
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    CircuitBreaker::new(policy.failure_threshold, policy.reset_timeout),
                )
            })
            .collect();

        let last_provider_name = providers
            .last()
            .expect("provider list must be non-empty")
            .name
            .clone();

        Self {
            breakers,
            last_provider_name,
            probe_probability: policy.probe_probability,
        }
    }

    pub fn probe_probability(&self) -> f64 {
        self.probe_probability
    }

    pub fn for_provider(&self, name: &str) -> &CircuitBreaker {
        self.breakers
            .get(name)
            .unwrap_or_else(|| panic!("no circuit breaker registered for provider {name}"))
    }

    /// Whether the breaker is open for selection purposes. Always false for the
    /// last-priority provider regardless of its counter (the fallback invariant).
    pub fn is_open(&self, name: &str, now: Instant) -> bool {
        if name == self.last_provider_name {
            return false;
        }
        self.for_provider(name).is_open(now)
    }

    pub fn reset_all(&self) {
        for breaker in self.breakers.values() {
            breaker.reset();
        }
    }

    /// Snapshot of every breaker keyed by provider name, for `/_health`.
    pub fn snapshot_all(&self, now: Instant) -> HashMap<String, BreakerSnapshot> {
        self.breakers
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.snapshot(now)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn providers() -> Vec<ProviderConfig> {
        vec![
            ProviderConfig {
                name: "a".into(),
                base_url: "https://a.example.com".into(),
                upstream_token: "tok-a".into(),
            },
            ProviderConfig {
                name: "b".into(),
                base_url: "https://b.example.com".into(),
                upstream_token: "tok-b".into(),
            },
        ]
    }

    fn policy() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(600),
            probe_probability: 0.0,
        }
    }

    #[test]
    fn last_provider_never_reports_open() {
        let registry = BreakerRegistry::new(&providers(), policy());
        registry.for_provider("b").record_failure();
        assert!(registry.for_provider("b").snapshot(Instant::now()).is_open);
        assert!(!registry.is_open("b", Instant::now()));
    }

    #[test]
    fn non_last_provider_reports_open_after_tripping() {
        let registry = BreakerRegistry::new(&providers(), policy());
        registry.for_provider("a").record_failure();
        assert!(registry.is_open("a", Instant::now()));
    }

    #[test]
    #[should_panic(expected = "no circuit breaker registered")]
    fn unknown_provider_name_panics() {
        let registry = BreakerRegistry::new(&providers(), policy());
        registry.for_provider("does-not-exist");
    }

    #[test]
    fn reset_all_is_idempotent() {
        let registry = BreakerRegistry::new(&providers(), policy());
        registry.for_provider("a").record_failure();
        registry.reset_all();
        registry.reset_all();
        assert!(!registry.is_open("a", Instant::now()));
    }

    #[test]
    fn snapshot_all_contains_every_provider() {
        let registry = BreakerRegistry::new(&providers(), policy());
        let snap = registry.snapshot_all(Instant::now());
        assert_eq!(snap.len(), 2);
        assert!(snap.contains_key("a"));
        assert!(snap.contains_key("b"));
    }
}

//! Provider selection: half-open probing plus priority-ordered fallback.

use std::time::Instant;

use crate::circuit_breaker::BreakerRegistry;
use crate::config::ProviderConfig;

/// Yields the ordered, non-empty sequence of provider indices to attempt for one
/// request, one index at a time via `next()`.
///
/// The half-open probe draw happens once, at construction. Everything after that
/// re-scans the not-yet-yielded providers on *every* `next()` call and re-checks
/// `registry.is_open` against the current time, rather than working off a
/// snapshot taken up front — so a provider that was open when the cascade
/// started but auto-resets while an earlier attempt is still in flight becomes
/// immediately eligible on the very next call, instead of staying excluded for
/// the rest of the request.
pub struct ProviderSelection<'a> {
    providers: &'a [ProviderConfig],
    registry: &'a BreakerRegistry,
    last_index: usize,
    probe_index: Option<usize>,
    probe_emitted: bool,
    yielded: Vec<bool>,
}

impl<'a> ProviderSelection<'a> {
    pub fn new(providers: &'a [ProviderConfig], registry: &'a BreakerRegistry) -> Self {
        let now = Instant::now();
        let last_index = providers.len() - 1;

        let probe_probability = registry.probe_probability();
        let probe_index = if probe_probability > 0.0 && fastrand::f64() < probe_probability {
            let open_candidates: Vec<usize> = providers
                .iter()
                .enumerate()
                .filter(|(i, p)| *i != last_index && registry.is_open(&p.name, now))
                .map(|(i, _)| i)
                .collect();
            if open_candidates.is_empty() {
                None
            } else {
                Some(open_candidates[fastrand::usize(..open_candidates.len())])
            }
        } else {
            None
        };

        Self {
            providers,
            registry,
            last_index,
            probe_index,
            probe_emitted: false,
            yielded: vec![false; providers.len()],
        }
    }

    /// Returns the next provider index to attempt, or `None` once the cascade is
    /// exhausted. Eligibility is re-evaluated against `Instant::now()` at the
    /// moment of this call — a provider skipped as open on an earlier call is
    /// reconsidered on every later call, not permanently excluded.
    pub fn next(&mut self) -> Option<usize> {
        if let Some(probe) = self.probe_index {
            if !self.probe_emitted {
                self.probe_emitted = true;
                self.yielded[probe] = true;
                return Some(probe);
            }
        }

        let now = Instant::now();
        for (i, provider) in self.providers.iter().enumerate() {
            if self.yielded[i] {
                continue;
            }
            if i == self.last_index || !self.registry.is_open(&provider.name, now) {
                self.yielded[i] = true;
                return Some(i);
            }
        }
        None
    }
}

//! Cooldown Gate
//!
//! A reusable guard that lets a named reaction fire at most once per window and never
//! overlap with itself. The check-and-set in [`CooldownGate::try_acquire`] is fully
//! synchronous, so callers must acquire before their first `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

pub const DEFAULT_COOLDOWN_WINDOW: Duration = Duration::from_secs(30);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct CooldownState {
    last_fired_at: Option<Instant>,
    /// Held by a live permit.
    in_flight: bool,
    /// Set once a firing has gone out; the gate stays in flight until then.
    settle_until: Option<Instant>,
}

impl CooldownState {
    fn is_in_flight(&self, now: Instant) -> bool {
        self.in_flight || self.settle_until.is_some_and(|until| now < until)
    }
}

fn lock(state: &Mutex<CooldownState>) -> MutexGuard<'_, CooldownState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Why a reaction was not allowed to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A previous firing has not settled yet.
    InFlight,
    /// The previous firing was less than one window ago.
    CoolingDown { remaining: Duration },
}

/// Guards one named reaction. Clones share the same state.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    name: Arc<str>,
    window: Duration,
    settle: Duration,
    state: Arc<Mutex<CooldownState>>,
}

impl CooldownGate {
    pub fn new(name: impl Into<Arc<str>>, window: Duration, settle: Duration) -> Self {
        Self {
            name: name.into(),
            window,
            settle,
            state: Arc::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_in_flight(&self) -> bool {
        lock(&self.state).is_in_flight(Instant::now())
    }

    pub fn last_fired_at(&self) -> Option<Instant> {
        lock(&self.state).last_fired_at
    }

    /// Marks the reaction as in flight and records the firing time, or explains why not.
    pub fn try_acquire(&self) -> Result<CooldownPermit, Rejection> {
        let now = Instant::now();
        let mut state = lock(&self.state);

        if state.is_in_flight(now) {
            trace!(reaction = %self.name, "Discarded: reaction already in flight");
            return Err(Rejection::InFlight);
        }
        if let Some(last) = state.last_fired_at {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.window {
                trace!(reaction = %self.name, ?elapsed, "Discarded: reaction cooling down");
                return Err(Rejection::CoolingDown {
                    remaining: self.window - elapsed,
                });
            }
        }

        state.in_flight = true;
        state.settle_until = None;
        state.last_fired_at = Some(now);
        Ok(CooldownPermit {
            name: self.name.clone(),
            settle: self.settle,
            state: Some(self.state.clone()),
        })
    }
}

/// The exclusive right to fire a guarded reaction.
///
/// Dropping the permit clears the in-flight flag immediately, so every early return
/// or error path releases the gate. The success path calls
/// [`CooldownPermit::release_after_settle`] instead.
#[must_use = "dropping a permit releases the gate immediately"]
#[derive(Debug)]
pub struct CooldownPermit {
    name: Arc<str>,
    settle: Duration,
    state: Option<Arc<Mutex<CooldownState>>>,
}

impl CooldownPermit {
    /// Keeps the gate in flight until the settle delay has passed from now.
    pub fn release_after_settle(mut self) {
        let Some(state) = self.state.take() else {
            return;
        };
        let mut state = lock(&state);
        state.in_flight = false;
        state.settle_until = Some(Instant::now() + self.settle);
        trace!(reaction = %self.name, settle = ?self.settle, "Reaction settling");
    }
}

impl Drop for CooldownPermit {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            lock(&state).in_flight = false;
        }
    }
}

//! Hysteresis between proposals and executed resizes
//!
//! A proposal is executed only when one of a fixed list of conditions holds
//! and no cooldown is running. Executions are committed with
//! [`DampeningController::mark_executed`] once the scaling sink accepted them,
//! which starts the cooldown.

use crate::config::{DampeningConfig, ReplicaBounds};
use crate::models::{FeatureVector, ScalingDecision, ScalingProposal};
use serde::Serialize;
use std::time::{Duration, Instant};

pub const REASON_NO_CHANGE: &str = "no change";
pub const REASON_COOLDOWN: &str = "cooldown active";
pub const REASON_NOT_MET: &str = "dampening: conditions not met";

/// Controller phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Cooldown,
}

/// State carried across cycles
#[derive(Debug, Clone, Default)]
pub struct DampeningState {
    pub last_executed_replicas: Option<u32>,
    pub last_scaled_at: Option<Instant>,
}

impl DampeningState {
    pub fn cooldown_remaining(&self, cooldown: Duration, now: Instant) -> Duration {
        match self.last_scaled_at {
            Some(at) => cooldown.saturating_sub(now.saturating_duration_since(at)),
            None => Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DampeningController {
    config: DampeningConfig,
    bounds: ReplicaBounds,
    state: DampeningState,
}

impl DampeningController {
    pub fn new(config: DampeningConfig, bounds: ReplicaBounds) -> Self {
        Self {
            config,
            bounds,
            state: DampeningState::default(),
        }
    }

    pub fn state(&self) -> &DampeningState {
        &self.state
    }

    /// Replica count of the last executed resize, or the seeded observation
    pub fn current_replicas(&self) -> Option<u32> {
        self.state.last_executed_replicas
    }

    /// Adopt the observed replica count before the first execution, or when
    /// it drifted from the last executed count outside a cooldown
    ///
    /// Returns the replaced count when an outside resize was adopted. During
    /// a cooldown the executed count wins, since a rollout may still be in
    /// progress.
    pub fn reconcile(&mut self, observed_replicas: u32, now: Instant) -> Option<u32> {
        match self.state.last_executed_replicas {
            None => {
                self.state.last_executed_replicas = Some(observed_replicas);
                None
            }
            Some(known) if known != observed_replicas && self.phase(now) == Phase::Idle => {
                self.state.last_executed_replicas = Some(observed_replicas);
                Some(known)
            }
            Some(_) => None,
        }
    }

    pub fn phase(&self, now: Instant) -> Phase {
        if self.cooldown_remaining(now).is_zero() {
            Phase::Idle
        } else {
            Phase::Cooldown
        }
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Duration {
        self.state.cooldown_remaining(self.config.cooldown(), now)
    }

    pub fn should_execute(
        &self,
        proposal: &ScalingProposal,
        current_replicas: u32,
        features: &FeatureVector,
    ) -> ScalingDecision {
        self.should_execute_at(proposal, current_replicas, features, Instant::now())
    }

    pub fn should_execute_at(
        &self,
        proposal: &ScalingProposal,
        current_replicas: u32,
        features: &FeatureVector,
        now: Instant,
    ) -> ScalingDecision {
        let target = proposal.target_replicas;
        if target == current_replicas {
            return ScalingDecision::hold(current_replicas, REASON_NO_CHANGE);
        }
        if self.phase(now) == Phase::Cooldown {
            return ScalingDecision::hold(current_replicas, REASON_COOLDOWN);
        }

        match self.triggered_condition(target, current_replicas, features) {
            Some(reason) => ScalingDecision::execute(target, reason),
            None => ScalingDecision::hold(current_replicas, REASON_NOT_MET),
        }
    }

    /// First matching execution condition, in priority order
    fn triggered_condition(
        &self,
        target: u32,
        current: u32,
        features: &FeatureVector,
    ) -> Option<&'static str> {
        let c = &self.config;
        let scale_up = target > current;
        let cpu = features.cpu_per_pod;

        if scale_up && cpu > c.scale_up_cpu_threshold {
            return Some("cpu per pod above scale-up threshold");
        }
        if !scale_up && cpu < c.scale_down_cpu_threshold {
            return Some("cpu per pod below scale-down threshold");
        }
        if target.abs_diff(current) >= c.large_difference {
            return Some("large replica difference");
        }
        if target == self.bounds.min_replicas && cpu < c.floor_cpu_threshold {
            return Some("floor confirmed by very low cpu");
        }
        if target == self.bounds.max_replicas && cpu > c.ceiling_cpu_threshold {
            return Some("ceiling confirmed by very high cpu");
        }

        let velocity = features.cpu_velocity;
        if (scale_up && velocity > c.velocity_spike_threshold)
            || (!scale_up && velocity < -c.velocity_spike_threshold)
        {
            return Some("rapid cpu trend");
        }
        None
    }

    /// Commit an accepted resize and start the cooldown
    pub fn mark_executed(&mut self, replicas: u32, at: Instant) {
        self.state.last_executed_replicas = Some(replicas);
        self.state.last_scaled_at = Some(at);
    }
}

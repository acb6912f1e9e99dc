//! Per-beacon proximity state machine and alert lifecycle.
//!
//! Each configured beacon moves between three phases:
//!
//! ```text
//!            d <= trigger, delay on             now - near_since >= delay
//!   Far ─────────────────────────────▶ EnteringNear ─────────────────────▶ Near
//!    ▲ ◀──────────────────────────────────── │                              │
//!    │              d > trigger                                            │
//!    │ ◀────────────────────────────────────────────────────────────────────┘
//!    │                    d > trigger or beacon lost (cancels alert)
//!    └────────────────────────────────────────────────────────────────────▶ Near
//!                              d <= trigger, delay off
//! ```
//!
//! An alert may only start on entry to `Near`. Cooldown is a guard on that
//! entry (time since the last activation), not a phase of its own. Once
//! started, an alert runs for at most `alert_duration_ms`; continued
//! presence does not extend or re-arm it.
//!
//! There is no exit margin: a reading just above the trigger distance
//! returns the beacon to `Far`, so noisy readings at the boundary can toggle
//! between phases.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::alert::{ActuatorPolicy, AlertDriver, AlertFaults, AlertRequest};
use crate::config::{AlertMode, ProximityConfig};
use crate::types::{elapsed, Millis};

/// Where a configured beacon stands relative to its trigger distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityPhase {
    /// Out of range or not currently observed.
    #[default]
    Far,
    /// In range, waiting out the entry delay.
    EnteringNear,
    /// In range; an alert may be running.
    Near,
}

/// Mutable proximity state of one configured beacon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProximityState {
    /// Current phase.
    pub phase: ProximityPhase,
    /// Start of the current continuous in-range period.
    pub near_since: Option<Millis>,
    /// Start of the most recent alert.
    pub last_alert_at: Option<Millis>,
    /// Whether the actuator should currently be engaged for this beacon.
    pub alert_active: bool,
    /// Distance seen at the last evaluation, if the beacon was observed.
    pub last_distance_cm: Option<f32>,
}

/// Why an eligible near-entry did not start an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    /// The previous alert started less than `cooldown_period_ms` ago.
    Cooldown,
    /// The beacon is configured with [`AlertMode::None`].
    ModeNone,
}

/// Why an alert stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeactivationReason {
    /// `alert_duration_ms` elapsed.
    DurationElapsed,
    /// The beacon moved out of range or stopped being observed.
    BeaconLeft,
    /// Another beacon took over the shared actuator.
    Preempted,
    /// Stopped by an explicit stop-all command.
    Cancelled,
    /// The beacon's configuration was removed.
    ConfigRemoved,
}

/// Alert lifecycle notifications produced by an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AlertEvent {
    /// The driver accepted an activation.
    Activated {
        /// Configured beacon.
        identity: String,
        /// Actuators driven.
        mode: AlertMode,
        /// Intensity, 1 to 5.
        intensity: u8,
        /// Planned duration.
        duration_ms: Millis,
        /// Evaluation time.
        at: Millis,
    },
    /// A near-entry did not start an alert.
    Suppressed {
        /// Configured beacon.
        identity: String,
        /// Why.
        reason: SuppressionReason,
        /// Evaluation time.
        at: Millis,
    },
    /// The driver refused an activation. The alert is treated as started so
    /// that cooldown still throttles the next attempt.
    ActivationFailed {
        /// Configured beacon.
        identity: String,
        /// Driver error text.
        message: String,
        /// Evaluation time.
        at: Millis,
    },
    /// An alert stopped.
    Deactivated {
        /// Configured beacon.
        identity: String,
        /// Why.
        reason: DeactivationReason,
        /// Evaluation time.
        at: Millis,
    },
}

impl AlertEvent {
    /// Beacon the event concerns.
    #[must_use]
    pub fn identity(&self) -> &str {
        match self {
            Self::Activated { identity, .. }
            | Self::Suppressed { identity, .. }
            | Self::ActivationFailed { identity, .. }
            | Self::Deactivated { identity, .. } => identity,
        }
    }
}

/// One configured beacon's input to an evaluation step.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    /// Configured identity.
    pub identity: &'a str,
    /// Its alert rules.
    pub config: &'a ProximityConfig,
    /// Current estimated distance, or `None` if the beacon is not active.
    pub distance_cm: Option<f32>,
}

/// Owner of every configured beacon's [`ProximityState`].
#[derive(Debug, Clone, Default)]
pub struct ProximityStateMachine {
    states: HashMap<String, ProximityState>,
    policy: ActuatorPolicy,
    holder: Option<String>,
    faults: AlertFaults,
}

impl ProximityStateMachine {
    /// Create a state machine for the given actuator policy.
    #[must_use]
    pub fn new(policy: ActuatorPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Actuator sharing policy.
    #[must_use]
    pub const fn policy(&self) -> ActuatorPolicy {
        self.policy
    }

    /// Evaluate every input at time `now`, driving `driver` as needed.
    ///
    /// Inputs are independent; with a shared actuator a later activation in
    /// the same step preempts an earlier one.
    pub fn evaluate(
        &mut self,
        now: Millis,
        inputs: &[EvaluationInput<'_>],
        driver: &mut dyn AlertDriver,
    ) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        for input in inputs {
            let (key, mut state) = self
                .states
                .remove_entry(input.identity)
                .unwrap_or_else(|| (input.identity.to_string(), ProximityState::default()));
            self.step(now, input, &mut state, driver, &mut events);
            debug_assert!(!state.alert_active || state.phase == ProximityPhase::Near);
            self.states.insert(key, state);
        }
        events
    }

    /// Stop every running alert immediately.
    ///
    /// Cooldown bookkeeping is left untouched, so the usual cooldown still
    /// applies to the next near-entry.
    pub fn stop_all(&mut self, now: Millis, driver: &mut dyn AlertDriver) -> Vec<AlertEvent> {
        let mut active: Vec<&String> = self
            .states
            .iter()
            .filter(|(_, s)| s.alert_active)
            .map(|(id, _)| id)
            .collect();
        active.sort();
        let active: Vec<String> = active.into_iter().cloned().collect();

        let mut events = Vec::with_capacity(active.len());
        for identity in active {
            if let Some(state) = self.states.get_mut(&identity) {
                state.alert_active = false;
            }
            driver.deactivate(&identity);
            info!(identity = %identity, "Alert cancelled");
            events.push(AlertEvent::Deactivated {
                identity,
                reason: DeactivationReason::Cancelled,
                at: now,
            });
        }
        self.holder = None;
        events
    }

    /// Drop the state of a beacon whose configuration was removed, stopping
    /// its alert if one is running.
    pub fn forget(
        &mut self,
        identity: &str,
        now: Millis,
        driver: &mut dyn AlertDriver,
    ) -> Option<AlertEvent> {
        let state = self.states.remove(identity)?;
        if self.holder.as_deref() == Some(identity) {
            self.holder = None;
        }
        if !state.alert_active {
            return None;
        }
        driver.deactivate(identity);
        info!(identity = %identity, "Alert stopped, configuration removed");
        Some(AlertEvent::Deactivated {
            identity: identity.to_string(),
            reason: DeactivationReason::ConfigRemoved,
            at: now,
        })
    }

    /// State of one configured beacon, if it has been evaluated.
    #[must_use]
    pub fn state(&self, identity: &str) -> Option<&ProximityState> {
        self.states.get(identity)
    }

    /// Every tracked state, in unspecified order.
    pub fn states(&self) -> impl Iterator<Item = (&str, &ProximityState)> {
        self.states.iter().map(|(id, s)| (id.as_str(), s))
    }

    /// Beacon currently holding the shared actuator.
    #[must_use]
    pub fn alert_holder(&self) -> Option<&str> {
        self.holder.as_deref()
    }

    /// Whether any alert is running.
    #[must_use]
    pub fn any_alert_active(&self) -> bool {
        self.states.values().any(|s| s.alert_active)
    }

    /// Actuator failure record.
    #[must_use]
    pub const fn faults(&self) -> &AlertFaults {
        &self.faults
    }

    fn step(
        &mut self,
        now: Millis,
        input: &EvaluationInput<'_>,
        state: &mut ProximityState,
        driver: &mut dyn AlertDriver,
        events: &mut Vec<AlertEvent>,
    ) {
        let config = input.config;
        let in_range = input
            .distance_cm
            .is_some_and(|d| d <= config.trigger_distance_cm);
        state.last_distance_cm = input.distance_cm;

        match state.phase {
            ProximityPhase::Far => {
                if !in_range {
                    return;
                }
                state.near_since = Some(now);
                if config.enable_entry_delay {
                    state.phase = ProximityPhase::EnteringNear;
                    info!(
                        identity = input.identity,
                        distance_cm = input.distance_cm,
                        delay_ms = config.entry_delay_ms,
                        "Entered range, waiting out entry delay"
                    );
                    self.finish_entry_delay(now, input, state, driver, events);
                } else {
                    info!(
                        identity = input.identity,
                        distance_cm = input.distance_cm,
                        "Entered range"
                    );
                    self.enter_near(now, input, state, driver, events);
                }
            }
            ProximityPhase::EnteringNear => {
                if in_range {
                    self.finish_entry_delay(now, input, state, driver, events);
                } else {
                    info!(identity = input.identity, "Left range during entry delay");
                    state.phase = ProximityPhase::Far;
                    state.near_since = None;
                }
            }
            ProximityPhase::Near => {
                if !in_range {
                    if state.alert_active {
                        self.release(
                            now,
                            input.identity,
                            state,
                            DeactivationReason::BeaconLeft,
                            driver,
                            events,
                        );
                    }
                    info!(
                        identity = input.identity,
                        distance_cm = input.distance_cm,
                        "Left range"
                    );
                    state.phase = ProximityPhase::Far;
                    state.near_since = None;
                    return;
                }
                let due = state
                    .last_alert_at
                    .is_some_and(|t| elapsed(now, t) >= config.alert_duration_ms);
                if state.alert_active && due {
                    self.release(
                        now,
                        input.identity,
                        state,
                        DeactivationReason::DurationElapsed,
                        driver,
                        events,
                    );
                }
            }
        }
    }

    fn finish_entry_delay(
        &mut self,
        now: Millis,
        input: &EvaluationInput<'_>,
        state: &mut ProximityState,
        driver: &mut dyn AlertDriver,
        events: &mut Vec<AlertEvent>,
    ) {
        let since = state.near_since.unwrap_or(now);
        if elapsed(now, since) >= input.config.entry_delay_ms {
            self.enter_near(now, input, state, driver, events);
        }
    }

    fn enter_near(
        &mut self,
        now: Millis,
        input: &EvaluationInput<'_>,
        state: &mut ProximityState,
        driver: &mut dyn AlertDriver,
        events: &mut Vec<AlertEvent>,
    ) {
        let config = input.config;
        let identity = input.identity;
        state.phase = ProximityPhase::Near;

        if config.alert_mode.is_silent() {
            debug!(identity, "Near, alert mode is none");
            events.push(AlertEvent::Suppressed {
                identity: identity.to_string(),
                reason: SuppressionReason::ModeNone,
                at: now,
            });
            return;
        }

        if let Some(last) = state.last_alert_at {
            if elapsed(now, last) < config.cooldown_period_ms {
                debug!(
                    identity,
                    since_last_ms = elapsed(now, last),
                    cooldown_ms = config.cooldown_period_ms,
                    "Near, alert suppressed by cooldown"
                );
                events.push(AlertEvent::Suppressed {
                    identity: identity.to_string(),
                    reason: SuppressionReason::Cooldown,
                    at: now,
                });
                return;
            }
        }

        if self.policy == ActuatorPolicy::Shared {
            self.preempt_holder(now, identity, driver, events);
        }

        let request = AlertRequest {
            identity: identity.to_string(),
            mode: config.alert_mode,
            intensity: config.alert_intensity,
            duration_hint_ms: config.alert_duration_ms,
        };
        match driver.activate(&request) {
            Ok(()) => {
                info!(
                    identity,
                    mode = ?config.alert_mode,
                    intensity = config.alert_intensity,
                    duration_ms = config.alert_duration_ms,
                    distance_cm = input.distance_cm,
                    "Proximity alert started"
                );
                events.push(AlertEvent::Activated {
                    identity: identity.to_string(),
                    mode: config.alert_mode,
                    intensity: config.alert_intensity,
                    duration_ms: config.alert_duration_ms,
                    at: now,
                });
            }
            Err(err) => {
                warn!(identity, error = %err, "Alert activation failed");
                self.faults.record(&err, now);
                events.push(AlertEvent::ActivationFailed {
                    identity: identity.to_string(),
                    message: err.to_string(),
                    at: now,
                });
            }
        }

        state.alert_active = true;
        state.last_alert_at = Some(now);
        if self.policy == ActuatorPolicy::Shared {
            self.holder = Some(identity.to_string());
        }
    }

    fn preempt_holder(
        &mut self,
        now: Millis,
        identity: &str,
        driver: &mut dyn AlertDriver,
        events: &mut Vec<AlertEvent>,
    ) {
        let Some(holder) = self.holder.take() else {
            return;
        };
        if holder == identity {
            return;
        }
        let Some(other) = self.states.get_mut(&holder) else {
            return;
        };
        if !other.alert_active {
            return;
        }
        other.alert_active = false;
        driver.deactivate(&holder);
        info!(identity = %holder, by = identity, "Alert preempted");
        events.push(AlertEvent::Deactivated {
            identity: holder,
            reason: DeactivationReason::Preempted,
            at: now,
        });
    }

    fn release(
        &mut self,
        now: Millis,
        identity: &str,
        state: &mut ProximityState,
        reason: DeactivationReason,
        driver: &mut dyn AlertDriver,
        events: &mut Vec<AlertEvent>,
    ) {
        state.alert_active = false;
        driver.deactivate(identity);
        if self.holder.as_deref() == Some(identity) {
            self.holder = None;
        }
        info!(identity, ?reason, "Proximity alert stopped");
        events.push(AlertEvent::Deactivated {
            identity: identity.to_string(),
            reason,
            at: now,
        });
    }
}

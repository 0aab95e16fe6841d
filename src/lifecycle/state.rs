// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Fall lifecycle state machine
//!
//! ```text
//! Idle --Trigger--> Triggered --StartCountdown--> CountdownActive
//! CountdownActive --Cancel--> FalseAlarm
//! CountdownActive --Escalate | Expire--> Emergency --Resolve--> Resolved
//! ```
//!
//! `FalseAlarm` and `Resolved` are terminal. Resolving twice is accepted and
//! leaves the state where it is.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SafeFallError};
use crate::models::FallStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallState {
    Idle,
    Triggered,
    CountdownActive,
    Emergency,
    FalseAlarm,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallInput {
    Trigger,
    StartCountdown,
    /// "I'm OK"
    Cancel,
    /// "Need help"
    Escalate,
    /// Countdown reached zero
    Expire,
    Resolve,
}

impl FallState {
    pub fn apply(self, input: FallInput) -> Result<FallState> {
        use FallInput::*;
        use FallState::*;

        let next = match (self, input) {
            (Idle, Trigger) => Triggered,
            (Triggered, StartCountdown) => CountdownActive,
            (CountdownActive, Cancel) => FalseAlarm,
            (CountdownActive, Escalate) | (CountdownActive, Expire) => Emergency,
            (Emergency, Resolve) | (Resolved, Resolve) => Resolved,
            (from, input) => {
                return Err(SafeFallError::InvalidTransition {
                    from: from.to_string(),
                    input: input.to_string(),
                })
            }
        };
        Ok(next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FallState::FalseAlarm | FallState::Resolved)
    }

    /// Patient-side controls are only live while counting down
    pub fn accepts_user_input(&self) -> bool {
        *self == FallState::CountdownActive
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FallState::Idle => "idle",
            FallState::Triggered => "triggered",
            FallState::CountdownActive => "countdown_active",
            FallState::Emergency => "emergency",
            FallState::FalseAlarm => "false_alarm",
            FallState::Resolved => "resolved",
        }
    }
}

/// State a stored event is in once nothing is running for it
impl From<FallStatus> for FallState {
    fn from(status: FallStatus) -> Self {
        match status {
            FallStatus::Pending => FallState::Triggered,
            FallStatus::Emergency => FallState::Emergency,
            FallStatus::FalseAlarm => FallState::FalseAlarm,
            FallStatus::Resolved => FallState::Resolved,
        }
    }
}

impl fmt::Display for FallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for FallInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FallInput::Trigger => "trigger",
            FallInput::StartCountdown => "start_countdown",
            FallInput::Cancel => "cancel",
            FallInput::Escalate => "escalate",
            FallInput::Expire => "expire",
            FallInput::Resolve => "resolve",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_happy_paths() {
        let counting = FallState::Idle
            .apply(FallInput::Trigger)
            .and_then(|s| s.apply(FallInput::StartCountdown))
            .unwrap();
        assert_eq!(counting, FallState::CountdownActive);

        assert_eq!(counting.apply(FallInput::Cancel).unwrap(), FallState::FalseAlarm);
        assert_eq!(counting.apply(FallInput::Escalate).unwrap(), FallState::Emergency);
        assert_eq!(counting.apply(FallInput::Expire).unwrap(), FallState::Emergency);

        let resolved = FallState::Emergency.apply(FallInput::Resolve).unwrap();
        assert_eq!(resolved, FallState::Resolved);
        assert_eq!(resolved.apply(FallInput::Resolve).unwrap(), FallState::Resolved);
    }

    #[test]
    fn test_rejected_inputs() {
        assert!(FallState::FalseAlarm.apply(FallInput::Escalate).is_err());
        assert!(FallState::Emergency.apply(FallInput::Cancel).is_err());
        assert!(FallState::Triggered.apply(FallInput::Cancel).is_err());
        assert!(FallState::Idle.apply(FallInput::Resolve).is_err());

        let err = FallState::FalseAlarm.apply(FallInput::Resolve).unwrap_err();
        assert!(matches!(
            err,
            SafeFallError::InvalidTransition { ref from, ref input }
                if from == "false_alarm" && input == "resolve"
        ));
    }

    fn any_input() -> impl Strategy<Value = FallInput> {
        prop_oneof![
            Just(FallInput::Trigger),
            Just(FallInput::StartCountdown),
            Just(FallInput::Cancel),
            Just(FallInput::Escalate),
            Just(FallInput::Expire),
            Just(FallInput::Resolve),
        ]
    }

    proptest! {
        #[test]
        fn prop_false_alarm_and_emergency_are_exclusive(inputs in prop::collection::vec(any_input(), 0..24)) {
            let mut state = FallState::Idle;
            let mut visited = vec![state];
            for input in inputs {
                if let Ok(next) = state.apply(input) {
                    state = next;
                    visited.push(state);
                }
            }
            let false_alarm = visited.contains(&FallState::FalseAlarm);
            let emergency = visited.contains(&FallState::Emergency);
            prop_assert!(!(false_alarm && emergency));
            if false_alarm {
                prop_assert_eq!(state, FallState::FalseAlarm);
            }
        }
    }
}

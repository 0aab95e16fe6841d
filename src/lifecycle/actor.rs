// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Per-event countdown actor
//!
//! One task owns the state of a triggered fall. User commands and the expiry
//! timer race inside a single `select!`, and whichever wins is written with a
//! version-checked update, so at most one terminal state is ever stored.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::state::{FallInput, FallState};
use crate::auth::Session;
use crate::core::{EscalationReason, EventBus, LifecycleKind, NoticeLevel};
use crate::db::Database;
use crate::error::{Result, SafeFallError};
use crate::models::{FallEvent, FallTransition, NewNotification};

pub const ESCALATED_NOTICE: &str = "Emergency alert sent. Help is on the way.";
pub const FALSE_ALARM_NOTICE: &str = "Glad you're okay! Event marked as a false alarm.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Cancel,
    Escalate,
}

impl Command {
    fn input(self) -> FallInput {
        match self {
            Command::Cancel => FallInput::Cancel,
            Command::Escalate => FallInput::Escalate,
        }
    }
}

/// What the countdown overlay shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownStatus {
    pub state: FallState,
    pub remaining_secs: u64,
}

/// How a countdown ended
#[derive(Debug, Clone, PartialEq)]
pub enum FallOutcome {
    Emergency {
        event: FallEvent,
        reason: EscalationReason,
    },
    FalseAlarm {
        event: FallEvent,
    },
    /// The row changed underneath the actor; nothing was written
    Superseded {
        event: Option<FallEvent>,
    },
    /// The decision was taken but could not be stored
    PersistFailed {
        state: FallState,
        message: String,
    },
    Interrupted {
        message: String,
    },
}

impl FallOutcome {
    /// Terminal or resting state the event ended in, if one was stored
    pub fn state(&self) -> Option<FallState> {
        match self {
            FallOutcome::Emergency { .. } => Some(FallState::Emergency),
            FallOutcome::FalseAlarm { .. } => Some(FallState::FalseAlarm),
            FallOutcome::Superseded { event } => event.as_ref().map(|e| e.status().into()),
            FallOutcome::PersistFailed { .. } | FallOutcome::Interrupted { .. } => None,
        }
    }

    pub fn event(&self) -> Option<&FallEvent> {
        match self {
            FallOutcome::Emergency { event, .. } | FallOutcome::FalseAlarm { event } => Some(event),
            FallOutcome::Superseded { event } => event.as_ref(),
            _ => None,
        }
    }
}

pub(crate) struct Countdown {
    pub db: Database,
    pub bus: Arc<EventBus>,
    pub session: Session,
    pub event: FallEvent,
    pub overlay_delay: Duration,
    pub window: Duration,
    pub tick: Duration,
}

/// Owner-side handle to a running countdown
///
/// Dropping the handle aborts the countdown. Use [`FallHandle::detach`] to
/// let it run to completion unattended.
#[derive(Debug)]
pub struct FallHandle {
    event: FallEvent,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<CountdownStatus>,
    task: Option<JoinHandle<FallOutcome>>,
}

impl FallHandle {
    pub(crate) fn spawn(countdown: Countdown, buffer: usize) -> Self {
        let (commands, command_rx) = mpsc::channel(buffer.max(1));
        let (status_tx, status) = watch::channel(CountdownStatus {
            state: FallState::Triggered,
            remaining_secs: countdown.window.as_secs(),
        });
        let event = countdown.event.clone();
        let task = tokio::spawn(run(countdown, command_rx, status_tx));

        Self {
            event,
            commands,
            status,
            task: Some(task),
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event.id
    }

    /// The row as it was created
    pub fn event(&self) -> &FallEvent {
        &self.event
    }

    /// "I'm OK": mark the event a false alarm
    pub fn cancel(&self) -> Result<()> {
        self.send(Command::Cancel)
    }

    /// "Need Help": escalate without waiting for the countdown
    pub fn escalate(&self) -> Result<()> {
        self.send(Command::Escalate)
    }

    fn send(&self, command: Command) -> Result<()> {
        let state = self.state();
        let rejected = || SafeFallError::InvalidTransition {
            from: state.to_string(),
            input: command.input().to_string(),
        };

        if state != FallState::Triggered && !state.accepts_user_input() {
            return Err(rejected());
        }
        match self.commands.try_send(command) {
            Ok(()) => Ok(()),
            // An earlier command is queued and wins regardless
            Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(rejected()),
        }
    }

    pub fn state(&self) -> FallState {
        self.status.borrow().state
    }

    pub fn remaining_secs(&self) -> u64 {
        self.status.borrow().remaining_secs
    }

    pub fn status(&self) -> CountdownStatus {
        *self.status.borrow()
    }

    /// Follow countdown progress
    pub fn subscribe(&self) -> watch::Receiver<CountdownStatus> {
        self.status.clone()
    }

    /// Wait for the countdown to finish
    pub async fn outcome(mut self) -> FallOutcome {
        match self.task.take() {
            Some(task) => task.await.unwrap_or_else(|e| FallOutcome::Interrupted {
                message: e.to_string(),
            }),
            None => FallOutcome::Interrupted {
                message: "countdown already detached".to_string(),
            },
        }
    }

    /// Release the countdown so it runs on without this handle
    pub fn detach(mut self) -> JoinHandle<FallOutcome> {
        match self.task.take() {
            Some(task) => task,
            None => tokio::spawn(async {
                FallOutcome::Interrupted {
                    message: "countdown already detached".to_string(),
                }
            }),
        }
    }
}

impl Drop for FallHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            debug!(event_id = %self.event.id, "Countdown handle dropped, stopping timer");
            task.abort();
        }
    }
}

fn remaining_secs(deadline: Instant) -> u64 {
    let left = deadline.saturating_duration_since(Instant::now());
    left.as_secs() + u64::from(left.subsec_nanos() > 0)
}

async fn run(
    countdown: Countdown,
    mut commands: mpsc::Receiver<Command>,
    status: watch::Sender<CountdownStatus>,
) -> FallOutcome {
    let event_id = countdown.event.id;
    let user_id = countdown.event.user_id;

    if !countdown.overlay_delay.is_zero() {
        sleep(countdown.overlay_delay).await;
    }

    let state = match FallState::Triggered.apply(FallInput::StartCountdown) {
        Ok(s) => s,
        Err(e) => return FallOutcome::Interrupted { message: e.to_string() },
    };

    let started = Instant::now();
    let deadline = started + countdown.window;
    status.send_replace(CountdownStatus {
        state,
        remaining_secs: countdown.window.as_secs(),
    });
    info!(event_id = %event_id, "Countdown started ({}s)", countdown.window.as_secs());

    let expiry = sleep_until(deadline);
    tokio::pin!(expiry);
    let mut ticker = interval_at(started + countdown.tick, countdown.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut commands_open = true;

    let input = loop {
        tokio::select! {
            biased;

            command = commands.recv(), if commands_open => match command {
                Some(command) => break command.input(),
                None => {
                    debug!(event_id = %event_id, "Countdown detached, running to expiry");
                    commands_open = false;
                }
            },

            _ = &mut expiry => break FallInput::Expire,

            _ = ticker.tick() => {
                let remaining = remaining_secs(deadline);
                status.send_modify(|s| s.remaining_secs = remaining);
                countdown.bus.publish_lifecycle(
                    event_id,
                    user_id,
                    LifecycleKind::CountdownTick { remaining_secs: remaining },
                );
            }
        }
    };

    let next = match state.apply(input) {
        Ok(s) => s,
        Err(e) => return FallOutcome::Interrupted { message: e.to_string() },
    };
    let remaining = remaining_secs(deadline);
    let transition = match next {
        FallState::FalseAlarm => FallTransition::FalseAlarm,
        _ => FallTransition::Escalate,
    };

    let written = countdown.db.transition_fall_event(
        &countdown.session,
        event_id,
        countdown.event.version,
        transition,
    );

    match written {
        Ok(Some(event)) => {
            status.send_replace(CountdownStatus {
                state: next,
                remaining_secs: remaining,
            });
            if next == FallState::Emergency {
                let reason = match input {
                    FallInput::Escalate => EscalationReason::UserRequest,
                    _ => EscalationReason::Timeout,
                };
                escalated(&countdown, &event, reason);
                FallOutcome::Emergency { event, reason }
            } else {
                info!(event_id = %event_id, "Fall marked as false alarm");
                countdown
                    .bus
                    .publish_lifecycle(event_id, user_id, LifecycleKind::FalseAlarm);
                countdown
                    .bus
                    .publish_notice(user_id, NoticeLevel::Info, FALSE_ALARM_NOTICE);
                FallOutcome::FalseAlarm { event }
            }
        }
        Ok(None) => {
            let current = countdown.db.fall_event(&countdown.session, event_id).ok();
            warn!(event_id = %event_id, "Fall event changed elsewhere; {} not applied", input);
            if let Some(event) = &current {
                status.send_replace(CountdownStatus {
                    state: event.status().into(),
                    remaining_secs: remaining,
                });
            }
            FallOutcome::Superseded { event: current }
        }
        Err(e) => {
            error!(event_id = %event_id, "Failed to store {} decision: {}", next, e);
            countdown
                .bus
                .publish_notice(user_id, NoticeLevel::Error, e.user_message());
            countdown.bus.publish_lifecycle(
                event_id,
                user_id,
                LifecycleKind::Error {
                    message: e.to_string(),
                },
            );
            status.send_modify(|s| s.remaining_secs = remaining);
            FallOutcome::PersistFailed {
                state: next,
                message: e.to_string(),
            }
        }
    }
}

fn escalated(countdown: &Countdown, event: &FallEvent, reason: EscalationReason) {
    warn!(
        event_id = %event.id,
        user_id = %event.user_id,
        ?reason,
        "Fall escalated to emergency"
    );
    countdown.bus.publish_lifecycle(
        event.id,
        event.user_id,
        LifecycleKind::Escalated { reason },
    );

    let notification = NewNotification::emergency_raised(event.user_id, event.id);
    match countdown.db.insert_notification(&countdown.session, notification) {
        Ok(_) => countdown
            .bus
            .publish_notice(event.user_id, NoticeLevel::Success, ESCALATED_NOTICE),
        Err(e) => {
            warn!(event_id = %event.id, "Emergency notification not stored: {}", e);
            countdown
                .bus
                .publish_notice(event.user_id, NoticeLevel::Error, e.user_message());
        }
    }
}

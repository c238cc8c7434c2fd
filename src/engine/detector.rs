//! Decides whether a status transition deserves a notification, and what it
//! means.
//!
//! Everything here is pure: callers pass in the notification states they
//! already loaded and the current time.

use chrono::{DateTime, Duration, Utc};

use crate::models::{EnvironmentStatus, EventType, NotificationState};

/// How long an unhealthy environment stays quiet on a channel before it is
/// reminded again.
pub const RENOTIFY_AFTER: Duration = Duration::hours(24);

/// The detector's verdict on a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing worth telling anyone.
    Ignore,
    /// The status changed; notify every resolved channel.
    Changed(EventType),
    /// The environment stayed drifting or erroring; notify only channels
    /// whose last alert is older than [`RENOTIFY_AFTER`].
    Lateral(EventType),
}

impl Transition {
    /// The event to render, unless the transition is ignored.
    pub fn event_type(&self) -> Option<EventType> {
        match self {
            Transition::Ignore => None,
            Transition::Changed(event) | Transition::Lateral(event) => Some(*event),
        }
    }
}

/// Classifies a transition from `old` to `new`.
pub fn classify(old: EnvironmentStatus, new: EnvironmentStatus) -> Transition {
    use EnvironmentStatus::{Drift, Error, Ok, Unknown};

    if old == new {
        return match new {
            Drift => Transition::Lateral(EventType::DriftDetected),
            Error => Transition::Lateral(EventType::ErrorDetected),
            _ => Transition::Ignore,
        };
    }
    if old == Unknown {
        return Transition::Ignore;
    }

    let event = match (old, new) {
        (_, Error) => EventType::ErrorDetected,
        (Error, Ok | Drift) => EventType::ErrorResolved,
        (_, Drift) => EventType::DriftDetected,
        (Drift, Ok) => EventType::DriftResolved,
        _ => EventType::Unknown,
    };
    Transition::Changed(event)
}

/// Whether a channel with `state` is due a lateral reminder at `now`.
///
/// A channel is due when it never sent an alert for the environment, or when
/// its last one is at least [`RENOTIFY_AFTER`] old.
pub fn is_due(state: Option<&NotificationState>, now: DateTime<Utc>) -> bool {
    let Some(state) = state else {
        return true;
    };
    if state.last_notified_status.is_none() {
        return true;
    }
    match state.last_sent_at() {
        Some(sent_at) => now - sent_at >= RENOTIFY_AFTER,
        None => true,
    }
}

/// Decides whether to notify, given the states of the enabled channels.
///
/// Status changes notify unless the old status is `unknown`. Lateral moves
/// notify when at least one channel is due.
pub fn should_notify(
    old: EnvironmentStatus,
    new: EnvironmentStatus,
    channel_states: &[Option<NotificationState>],
    now: DateTime<Utc>,
) -> Option<EventType> {
    match classify(old, new) {
        Transition::Ignore => None,
        Transition::Changed(event) => Some(event),
        Transition::Lateral(event) =>
            channel_states.iter().any(|state| is_due(state.as_ref(), now)).then_some(event),
    }
}

//! Countdown state machine for a session.
//!
//! ```text
//!   Main ──(0, grace configured)──▶ Grace ──(0)──▶ Ended
//!    │  ──(0, prevent-submit)────▶ Prevented
//!    │  ──(0, auto-submit)───────▶ Ended
//!    └──(manual submit)──────────▶ Ended   (also from Grace)
//! ```
//!
//! The clock is cooperative: the owner calls [`SessionClock::tick`] once per
//! second and acts on the returned [`ClockEvent`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{ExamDefinition, OnTimeUpAction};

/// Phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Main,
    Grace,
    Prevented,
    Ended,
}

impl Phase {
    /// `Prevented` and `Ended` accept no further countdown, edits or submissions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Prevented | Phase::Ended)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Main => write!(f, "main"),
            Phase::Grace => write!(f, "grace"),
            Phase::Prevented => write!(f, "prevented"),
            Phase::Ended => write!(f, "ended"),
        }
    }
}

/// A phase transition produced by a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// The main countdown ran out and a grace countdown started.
    GraceStarted { seconds: u64 },
    /// The main countdown ran out and submission is no longer possible.
    Prevented,
    /// Time is up; the owner must submit automatically.
    Expired,
}

/// Timing configuration extracted from an exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingPolicy {
    pub duration_secs: u64,
    pub on_time_up: OnTimeUpAction,
    pub grace_secs: u64,
}

impl TimingPolicy {
    pub fn from_exam(exam: &ExamDefinition) -> Self {
        Self {
            duration_secs: u64::from(exam.duration_minutes) * 60,
            on_time_up: exam.on_time_up_action,
            grace_secs: u64::from(exam.grace_period_minutes.unwrap_or(0)) * 60,
        }
    }
}

/// The session countdown.
#[derive(Debug, Clone)]
pub struct SessionClock {
    policy: TimingPolicy,
    phase: Phase,
    /// Seconds left in the current countdown (main or grace).
    remaining: u64,
    /// Seconds left on the main countdown; frozen once it leaves `Main`.
    main_remaining: u64,
}

impl SessionClock {
    pub fn new(policy: TimingPolicy) -> Self {
        Self {
            policy,
            phase: Phase::Main,
            remaining: policy.duration_secs,
            main_remaining: policy.duration_secs,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn policy(&self) -> &TimingPolicy {
        &self.policy
    }

    /// Seconds left in the active countdown; zero once terminal.
    pub fn remaining_secs(&self) -> u64 {
        if self.phase.is_terminal() {
            0
        } else {
            self.remaining
        }
    }

    /// Configured duration minus the time left on the main countdown.
    pub fn elapsed_secs(&self) -> u64 {
        self.policy.duration_secs - self.main_remaining
    }

    /// Remaining time as `MM:SS`.
    pub fn formatted_remaining(&self) -> String {
        let secs = self.remaining_secs();
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }

    /// Advance the active countdown by one second.
    pub fn tick(&mut self) -> Option<ClockEvent> {
        if self.phase.is_terminal() {
            return None;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.phase == Phase::Main {
            self.main_remaining = self.remaining;
        }

        if self.remaining > 0 {
            return None;
        }

        Some(match self.phase {
            Phase::Main => self.expire_main(),
            _ => {
                self.phase = Phase::Ended;
                ClockEvent::Expired
            }
        })
    }

    fn expire_main(&mut self) -> ClockEvent {
        match self.policy.on_time_up {
            OnTimeUpAction::AllowSubmissionGracePeriod if self.policy.grace_secs > 0 => {
                self.phase = Phase::Grace;
                self.remaining = self.policy.grace_secs;
                ClockEvent::GraceStarted {
                    seconds: self.policy.grace_secs,
                }
            }
            OnTimeUpAction::PreventSubmit => {
                self.phase = Phase::Prevented;
                ClockEvent::Prevented
            }
            // A grace period of zero behaves like auto-submit.
            OnTimeUpAction::AllowSubmissionGracePeriod | OnTimeUpAction::AutoSubmit => {
                self.phase = Phase::Ended;
                ClockEvent::Expired
            }
        }
    }

    /// Stop the countdown after a manual submission.
    ///
    /// Returns `false` if the clock was already terminal.
    pub fn finish(&mut self) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.phase = Phase::Ended;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(minutes: u64, on_time_up: OnTimeUpAction, grace_minutes: u64) -> TimingPolicy {
        TimingPolicy {
            duration_secs: minutes * 60,
            on_time_up,
            grace_secs: grace_minutes * 60,
        }
    }

    fn tick_n(clock: &mut SessionClock, n: u64) -> Vec<ClockEvent> {
        (0..n).filter_map(|_| clock.tick()).collect()
    }

    #[test]
    fn starts_in_main_with_full_duration() {
        let clock = SessionClock::new(policy(2, OnTimeUpAction::AutoSubmit, 0));
        assert_eq!(clock.phase(), Phase::Main);
        assert_eq!(clock.remaining_secs(), 120);
        assert_eq!(clock.elapsed_secs(), 0);
        assert_eq!(clock.formatted_remaining(), "02:00");
    }

    #[test]
    fn auto_submit_expires_into_ended() {
        let mut clock = SessionClock::new(policy(1, OnTimeUpAction::AutoSubmit, 0));
        assert!(tick_n(&mut clock, 59).is_empty());
        assert_eq!(clock.formatted_remaining(), "00:01");
        assert_eq!(clock.tick(), Some(ClockEvent::Expired));
        assert_eq!(clock.phase(), Phase::Ended);
        assert_eq!(clock.elapsed_secs(), 60);
        assert_eq!(clock.tick(), None);
    }

    #[test]
    fn grace_period_restarts_countdown() {
        let mut clock = SessionClock::new(policy(
            1,
            OnTimeUpAction::AllowSubmissionGracePeriod,
            5,
        ));
        let events = tick_n(&mut clock, 60);
        assert_eq!(events, vec![ClockEvent::GraceStarted { seconds: 300 }]);
        assert_eq!(clock.phase(), Phase::Grace);
        assert_eq!(clock.remaining_secs(), 300);
        assert_eq!(clock.elapsed_secs(), 60);

        let events = tick_n(&mut clock, 300);
        assert_eq!(events, vec![ClockEvent::Expired]);
        assert_eq!(clock.phase(), Phase::Ended);
        // Grace time is not counted as elapsed exam time.
        assert_eq!(clock.elapsed_secs(), 60);
    }

    #[test]
    fn grace_without_duration_falls_back_to_auto_submit() {
        let mut clock = SessionClock::new(policy(
            1,
            OnTimeUpAction::AllowSubmissionGracePeriod,
            0,
        ));
        assert_eq!(tick_n(&mut clock, 60), vec![ClockEvent::Expired]);
        assert_eq!(clock.phase(), Phase::Ended);
    }

    #[test]
    fn prevent_submit_stops_the_clock() {
        let mut clock = SessionClock::new(policy(1, OnTimeUpAction::PreventSubmit, 5));
        assert_eq!(tick_n(&mut clock, 60), vec![ClockEvent::Prevented]);
        assert_eq!(clock.phase(), Phase::Prevented);
        assert_eq!(tick_n(&mut clock, 10), vec![]);
        assert!(!clock.finish());
        assert_eq!(clock.phase(), Phase::Prevented);
    }

    #[test]
    fn manual_finish_from_main_and_grace() {
        let mut clock = SessionClock::new(policy(1, OnTimeUpAction::AutoSubmit, 0));
        tick_n(&mut clock, 15);
        assert!(clock.finish());
        assert_eq!(clock.phase(), Phase::Ended);
        assert_eq!(clock.elapsed_secs(), 15);
        assert_eq!(clock.remaining_secs(), 0);

        let mut clock = SessionClock::new(policy(
            1,
            OnTimeUpAction::AllowSubmissionGracePeriod,
            1,
        ));
        tick_n(&mut clock, 70);
        assert_eq!(clock.phase(), Phase::Grace);
        assert!(clock.finish());
        assert!(!clock.finish());
    }

    #[test]
    fn zero_duration_expires_on_first_tick() {
        let mut clock = SessionClock::new(policy(0, OnTimeUpAction::AutoSubmit, 0));
        assert_eq!(clock.tick(), Some(ClockEvent::Expired));
        assert_eq!(clock.elapsed_secs(), 0);
    }

    #[test]
    fn policy_from_exam() {
        let exam: ExamDefinition = toml::from_str(
            r#"
id = "e1"
duration_minutes = 45
on_time_up_action = "allow-submission-grace-period"
grace_period_minutes = 5
"#,
        )
        .unwrap();
        let p = TimingPolicy::from_exam(&exam);
        assert_eq!(p.duration_secs, 2700);
        assert_eq!(p.grace_secs, 300);
        assert_eq!(p.on_time_up, OnTimeUpAction::AllowSubmissionGracePeriod);
    }
}

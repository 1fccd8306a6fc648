use chrono::Duration;

use crate::error::QuizError;
use crate::session::{Mode, TestSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Running,
    Paused,
    Expired,
}

/// Emitted once, on the transition into `Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeUp;

/// Whole-second countdown with pause/resume and a single expiry signal.
///
/// Elapsed time is fed in by the owner; while paused or expired it is
/// discarded, so resuming continues from the stored remaining value.
#[derive(Debug, Clone)]
pub struct CountdownTimer {
    total_secs: u64,
    remaining_secs: u64,
    state: TimerState,
    can_pause: bool,
    carry: Duration,
}

impl CountdownTimer {
    /// A limited timer restored with nothing left still starts un-expired,
    /// so the first `advance` reports `TimeUp`.
    pub fn new(total_secs: u64, remaining_secs: u64, can_pause: bool, paused: bool) -> Self {
        let remaining_secs = remaining_secs.min(total_secs);
        let state = if total_secs == 0 {
            TimerState::Expired
        } else if paused {
            TimerState::Paused
        } else {
            TimerState::Running
        };
        Self {
            total_secs,
            remaining_secs,
            state,
            can_pause,
            carry: Duration::zero(),
        }
    }

    /// `None` when the session has no time limit.
    pub fn for_session(session: &TestSession) -> Option<Self> {
        if !session.has_time_limit() {
            return None;
        }
        Some(Self::new(
            session.time_limit_seconds,
            session.time_remaining_seconds,
            session.mode == Mode::Training,
            session.is_paused,
        ))
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    pub fn total_secs(&self) -> u64 {
        self.total_secs
    }

    pub fn can_pause(&self) -> bool {
        self.can_pause
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    /// One full second of real time.
    pub fn tick(&mut self) -> Option<TimeUp> {
        self.advance(Duration::seconds(1))
    }

    /// Feed elapsed wall time; sub-second remainders accumulate between calls.
    pub fn advance(&mut self, elapsed: Duration) -> Option<TimeUp> {
        if self.state != TimerState::Running {
            return None;
        }

        if self.remaining_secs > 0 {
            if elapsed <= Duration::zero() {
                return None;
            }
            self.carry = self.carry + elapsed;
            let whole = self.carry.num_seconds();
            if whole <= 0 {
                return None;
            }
            self.carry = self.carry - Duration::seconds(whole);
            self.remaining_secs = self.remaining_secs.saturating_sub(whole as u64);
        }

        if self.remaining_secs == 0 {
            self.state = TimerState::Expired;
            self.carry = Duration::zero();
            return Some(TimeUp);
        }
        None
    }

    pub fn pause(&mut self) -> Result<(), QuizError> {
        if !self.can_pause {
            return Err(QuizError::PauseNotAllowed);
        }
        if self.state == TimerState::Running {
            self.state = TimerState::Paused;
        }
        Ok(())
    }

    pub fn resume(&mut self) {
        if self.state == TimerState::Paused {
            self.state = TimerState::Running;
            self.carry = Duration::zero();
        }
    }

    /// Share of the total still left, in percent.
    pub fn remaining_percent(&self) -> f64 {
        if self.total_secs == 0 {
            return 0.0;
        }
        self.remaining_secs as f64 / self.total_secs as f64 * 100.0
    }
}

/// `m:ss`, or `h:mm:ss` once an hour or more is left.
pub fn format_clock(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn ticks_down_and_expires_once() {
        let mut timer = CountdownTimer::new(3, 3, false, false);
        assert_eq!(timer.state(), TimerState::Running);

        assert_eq!(timer.tick(), None);
        assert_eq!(timer.tick(), None);
        assert_eq!(timer.remaining_secs(), 1);
        assert_eq!(timer.tick(), Some(TimeUp));
        assert_eq!(timer.state(), TimerState::Expired);
        assert_eq!(timer.remaining_secs(), 0);

        assert_eq!(timer.tick(), None);
        assert_eq!(timer.remaining_secs(), 0);
    }

    #[test]
    fn large_elapsed_clamps_at_zero() {
        let mut timer = CountdownTimer::new(5, 5, false, false);
        assert_eq!(timer.advance(Duration::seconds(60)), Some(TimeUp));
        assert_eq!(timer.remaining_secs(), 0);
    }

    #[test]
    fn sub_second_elapsed_accumulates() {
        let mut timer = CountdownTimer::new(10, 10, false, false);
        for _ in 0..9 {
            timer.advance(Duration::milliseconds(100));
        }
        assert_eq!(timer.remaining_secs(), 10);
        timer.advance(Duration::milliseconds(100));
        assert_eq!(timer.remaining_secs(), 9);
    }

    #[test]
    fn exam_timer_rejects_pause() {
        let mut timer = CountdownTimer::new(60, 60, false, false);
        assert_matches!(timer.pause(), Err(QuizError::PauseNotAllowed));
        assert!(timer.is_running());
    }

    #[test]
    fn paused_time_does_not_count() {
        let mut timer = CountdownTimer::new(600, 120, true, false);
        timer.pause().unwrap();

        assert_eq!(timer.advance(Duration::seconds(45)), None);
        assert_eq!(timer.remaining_secs(), 120);

        timer.resume();
        assert_eq!(timer.remaining_secs(), 120);
        timer.tick();
        assert_eq!(timer.remaining_secs(), 119);
    }

    #[test]
    fn resume_allowed_in_any_mode() {
        let mut timer = CountdownTimer::new(60, 30, false, true);
        assert_eq!(timer.state(), TimerState::Paused);
        timer.resume();
        assert!(timer.is_running());
    }

    #[test]
    fn restored_with_nothing_left_expires_on_first_advance() {
        let mut timer = CountdownTimer::new(60, 0, false, false);
        assert!(timer.is_running());

        assert_eq!(timer.advance(Duration::zero()), Some(TimeUp));
        assert_eq!(timer.state(), TimerState::Expired);
        assert_eq!(timer.advance(Duration::seconds(1)), None);
    }

    #[test]
    fn paused_with_nothing_left_expires_after_resume() {
        let mut timer = CountdownTimer::new(60, 0, true, true);
        assert_eq!(timer.advance(Duration::seconds(5)), None);
        timer.resume();
        assert_eq!(timer.tick(), Some(TimeUp));
    }

    #[test]
    fn remaining_percent() {
        let timer = CountdownTimer::new(200, 50, false, false);
        assert_eq!(timer.remaining_percent(), 25.0);
    }

    #[test]
    fn clock_format() {
        assert_eq!(format_clock(0), "0:00");
        assert_eq!(format_clock(65), "1:05");
        assert_eq!(format_clock(3600), "1:00:00");
        assert_eq!(format_clock(3725), "1:02:05");
    }
}

use chrono::{DateTime, Duration, Utc};
use std::path::Path;

use crate::bank::select_questions;
use crate::clock::Clock;
use crate::error::QuizError;
use crate::history::{HistoryEntry, HistoryStore};
use crate::import;
use crate::question::Competition;
use crate::scheduler::{Scheduler, TaskHandle};
use crate::session::{AnswerFeedback, Mode, Step, TestConfiguration, TestSession};
use crate::storage::{
    self, KeyValueStore, COMPETITIONS_KEY, CURRENT_SESSION_KEY, HISTORY_KEY, USER_NAME_KEY,
};
use crate::timer::{CountdownTimer, TimeUp};

/// Delay before moving on after an answer; longer in training so feedback stays visible.
pub const TRAINING_ADVANCE_DELAY_MS: i64 = 1500;
pub const EXAM_ADVANCE_DELAY_MS: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Created,
    Resumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Training session kept, paused, for a later resume.
    Saved,
    /// Exam session thrown away without a history entry.
    Discarded,
}

/// What the results view receives once a session closes.
#[derive(Debug, Clone, PartialEq)]
pub struct Finished {
    /// Snapshot of the session with `end_time`, `score` and `is_completed` filled in.
    pub session: TestSession,
    pub entry: HistoryEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheduled {
    AutoAdvance,
}

/// Owns the single active-session slot and the history log.
///
/// Every mutation goes through `&mut self`, so user actions and timer ticks
/// are applied one at a time in the order the event loop delivers them.
pub struct QuizApp<S: KeyValueStore, C: Clock> {
    store: S,
    clock: C,
    builtin: Competition,
    competitions: Vec<Competition>,
    history: HistoryStore,
    active: Option<TestSession>,
    timer: Option<CountdownTimer>,
    scheduler: Scheduler<Scheduled>,
    pending_advance: Option<TaskHandle>,
    last_tick: DateTime<Utc>,
}

impl<S: KeyValueStore, C: Clock> QuizApp<S, C> {
    /// Load persisted state; unreadable pieces fall back to empty.
    pub fn new(store: S, clock: C) -> Self {
        let active: Option<TestSession> = storage::load_or_default(&store, CURRENT_SESSION_KEY, None);
        let history: HistoryStore = storage::load_or_default(&store, HISTORY_KEY, HistoryStore::default());
        let competitions: Vec<Competition> = storage::load_or_default(&store, COMPETITIONS_KEY, Vec::new());
        let last_tick = clock.now();

        Self {
            store,
            clock,
            builtin: Competition::builtin(),
            competitions,
            history,
            active: active.filter(|s| !s.is_completed),
            timer: None,
            scheduler: Scheduler::new(),
            pending_advance: None,
            last_tick,
        }
    }

    pub fn session(&self) -> Option<&TestSession> {
        self.active.as_ref()
    }

    pub fn timer(&self) -> Option<&CountdownTimer> {
        self.timer.as_ref()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn user_name(&self) -> String {
        storage::load_or_default(&self.store, USER_NAME_KEY, String::new())
    }

    pub fn has_pending_advance(&self) -> bool {
        self.pending_advance
            .is_some_and(|handle| self.scheduler.is_pending(handle))
    }

    pub fn competitions(&self) -> impl Iterator<Item = &Competition> {
        std::iter::once(&self.builtin).chain(self.competitions.iter())
    }

    pub fn competition(&self, id: &str) -> Result<&Competition, QuizError> {
        self.competitions()
            .find(|c| c.id == id)
            .ok_or_else(|| QuizError::CompetitionNotFound(id.to_string()))
    }

    /// Enter the test screen.
    ///
    /// An existing active session is always resumed; otherwise `config`
    /// creates a new one. Having neither is a missing prerequisite.
    pub fn start(&mut self, config: Option<TestConfiguration>) -> Result<Entry, QuizError> {
        self.last_tick = self.clock.now();

        if let Some(session) = &self.active {
            if config.is_some() {
                log::info!("active session {} exists, resuming it instead of starting anew", session.id);
            }
            log::info!(
                "resuming session {} at question {}",
                session.id,
                session.current_question_position
            );
            self.timer = CountdownTimer::for_session(session);
            return Ok(Entry::Resumed);
        }

        let config = config.ok_or(QuizError::MissingPrerequisite)?;
        let competition = self.competition(config.competition_id())?;
        let questions = select_questions(&competition.questions, &config.subjects, config.question_count);
        if questions.len() < config.question_count {
            log::debug!(
                "requested {} questions, only {} available",
                config.question_count,
                questions.len()
            );
        }

        let session = TestSession::create(&config, questions, self.last_tick);
        log::info!(
            "created {} session {} with {} questions",
            session.mode,
            session.id,
            session.len()
        );

        if !config.user_name.is_empty() && config.user_name != self.user_name() {
            storage::save_logged(&mut self.store, USER_NAME_KEY, &config.user_name);
        }

        self.timer = CountdownTimer::for_session(&session);
        self.scheduler.cancel_all();
        self.pending_advance = None;
        self.active = Some(session);
        self.persist();
        Ok(Entry::Created)
    }

    /// Answer a question by id. Returns feedback in training mode.
    pub fn record_answer(
        &mut self,
        question_id: i64,
        selected_option_index: usize,
    ) -> Result<Option<AnswerFeedback>, QuizError> {
        let now = self.clock.now();
        let session = self.active.as_mut().ok_or(QuizError::NoActiveSession)?;

        let Some(recorded) = session.record_answer(question_id, selected_option_index) else {
            log::warn!("ignoring answer for question {question_id}, not part of session {}", session.id);
            return Ok(None);
        };

        let delay = match session.mode {
            Mode::Training => TRAINING_ADVANCE_DELAY_MS,
            Mode::Exam => EXAM_ADVANCE_DELAY_MS,
        };
        let should_advance = !session.is_last_position();

        self.cancel_pending_advance();
        if should_advance {
            let handle = self
                .scheduler
                .schedule(now, Duration::milliseconds(delay), Scheduled::AutoAdvance);
            self.pending_advance = Some(handle);
        }
        self.persist();
        Ok(recorded.feedback)
    }

    /// Answer whatever question is currently shown. A session without
    /// questions has nothing to answer and is left as it is.
    pub fn answer_current(&mut self, selected_option_index: usize) -> Result<Option<AnswerFeedback>, QuizError> {
        let session = self.active.as_ref().ok_or(QuizError::NoActiveSession)?;
        let Some(question_id) = session.current_question().map(|q| q.id) else {
            log::debug!("session {} has no question to answer", session.id);
            return Ok(None);
        };
        self.record_answer(question_id, selected_option_index)
    }

    /// Next question, or submit when already on the last one.
    pub fn go_next(&mut self) -> Result<Option<Finished>, QuizError> {
        self.cancel_pending_advance();
        let session = self.active.as_mut().ok_or(QuizError::NoActiveSession)?;
        match session.step_forward() {
            Step::Moved(_) => {
                self.persist();
                Ok(None)
            }
            Step::AtEnd => Ok(self.finalize()),
        }
    }

    pub fn go_previous(&mut self) -> Result<(), QuizError> {
        self.cancel_pending_advance();
        let session = self.active.as_mut().ok_or(QuizError::NoActiveSession)?;
        if session.go_previous() {
            self.persist();
        }
        Ok(())
    }

    pub fn go_to(&mut self, position: usize) -> Result<(), QuizError> {
        self.cancel_pending_advance();
        let session = self.active.as_mut().ok_or(QuizError::NoActiveSession)?;
        session.go_to(position)?;
        self.persist();
        Ok(())
    }

    /// Training only. Stops the clock until [`QuizApp::resume`].
    pub fn pause(&mut self) -> Result<(), QuizError> {
        let session = self.active.as_mut().ok_or(QuizError::NoActiveSession)?;
        session.set_paused(true)?;
        if let Some(timer) = self.timer.as_mut() {
            timer.pause()?;
        }
        log::debug!("session {} paused", session.id);
        self.persist();
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), QuizError> {
        let session = self.active.as_mut().ok_or(QuizError::NoActiveSession)?;
        session.set_paused(false)?;
        if let Some(timer) = self.timer.as_mut() {
            timer.resume();
        }
        self.last_tick = self.clock.now();
        log::debug!("session {} resumed", session.id);
        self.persist();
        Ok(())
    }

    /// Advance the clock-driven parts: the countdown and any due auto-advance.
    ///
    /// Returns the finished session when time ran out.
    pub fn on_tick(&mut self) -> Option<Finished> {
        let now = self.clock.now();
        let elapsed = now - self.last_tick;
        self.last_tick = now;

        let session = self.active.as_mut()?;

        if let Some(timer) = self.timer.as_mut() {
            let before = timer.remaining_secs();
            let expired = timer.advance(elapsed);
            session.time_remaining_seconds = timer.remaining_secs();

            if let Some(TimeUp) = expired {
                log::info!("time is up for session {}", session.id);
                return self.finalize();
            }
            if before != timer.remaining_secs() {
                self.persist();
            }
        }

        for task in self.scheduler.poll(now) {
            match task {
                Scheduled::AutoAdvance => {
                    self.pending_advance = None;
                    if let Some(session) = self.active.as_mut() {
                        if let Step::Moved(position) = session.step_forward() {
                            log::debug!("auto-advanced to question {position}");
                            self.persist();
                        }
                    }
                }
            }
        }
        None
    }

    /// Close the active session, score it and append it to the history.
    pub fn finalize(&mut self) -> Option<Finished> {
        let mut session = self.active.take()?;
        let now = self.clock.now();

        self.cancel_pending_advance();
        self.scheduler.cancel_all();
        if let Some(timer) = self.timer.take() {
            session.time_remaining_seconds = timer.remaining_secs();
        }

        let competition_name = self
            .competition(&session.competition_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|_| session.competition_id.clone());
        let entry = HistoryEntry::from_session(&session, now, &competition_name);

        self.history.append(entry.clone());
        storage::save_logged(&mut self.store, HISTORY_KEY, &self.history);
        storage::remove_logged(&mut self.store, CURRENT_SESSION_KEY);

        log::info!(
            "session {} finalized: {}/{} correct, score {}",
            entry.id,
            entry.correct_count,
            entry.total_questions,
            entry.score
        );

        session.end_time = Some(now);
        session.score = Some(entry.score);
        session.is_completed = true;
        Some(Finished { session, entry })
    }

    /// Leave the test screen without submitting.
    ///
    /// Training sessions are kept paused; exams are discarded once `confirmed`.
    pub fn exit(&mut self, confirmed: bool) -> Result<Exit, QuizError> {
        self.cancel_pending_advance();
        let session = self.active.as_mut().ok_or(QuizError::NoActiveSession)?;

        match session.mode {
            Mode::Training => {
                session.set_paused(true)?;
                if let Some(timer) = self.timer.as_mut() {
                    timer.pause()?;
                }
                log::info!("training session {} saved for later", session.id);
                self.persist();
                Ok(Exit::Saved)
            }
            Mode::Exam if !confirmed => Err(QuizError::ConfirmationRequired),
            Mode::Exam => {
                log::info!("exam session {} discarded", session.id);
                self.active = None;
                self.timer = None;
                self.scheduler.cancel_all();
                self.persist();
                Ok(Exit::Discarded)
            }
        }
    }

    pub fn review(&self, id: &str) -> Result<&HistoryEntry, QuizError> {
        self.history.get(id)
    }

    pub fn import_competition(
        &mut self,
        path: &Path,
        name: &str,
        exam_time_limit_minutes: u32,
    ) -> Result<&Competition, QuizError> {
        let competition = import::import_file(path, name, exam_time_limit_minutes, self.clock.now())?;
        let mut candidate = self.competitions.clone();
        candidate.push(competition);
        storage::save(&mut self.store, COMPETITIONS_KEY, &candidate)?;
        self.competitions = candidate;
        Ok(&self.competitions[self.competitions.len() - 1])
    }

    /// Remove an imported competition. History entries that refer to it stay.
    pub fn delete_competition(&mut self, id: &str) -> Result<(), QuizError> {
        if !self.competitions.iter().any(|c| c.id == id) {
            return Err(QuizError::CompetitionNotFound(id.to_string()));
        }
        let candidate: Vec<Competition> = self.competitions.iter().filter(|c| c.id != id).cloned().collect();
        storage::save(&mut self.store, COMPETITIONS_KEY, &candidate)?;
        self.competitions = candidate;
        Ok(())
    }

    fn cancel_pending_advance(&mut self) {
        if let Some(handle) = self.pending_advance.take() {
            self.scheduler.cancel(handle);
        }
    }

    fn persist(&mut self) {
        match &self.active {
            Some(session) => storage::save_logged(&mut self.store, CURRENT_SESSION_KEY, session),
            None => storage::remove_logged(&mut self.store, CURRENT_SESSION_KEY),
        }
    }
}

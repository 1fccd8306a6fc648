use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::QuizError;
use crate::question::{Question, DEFAULT_COMPETITION_ID};
use crate::storage::tagged_date;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    /// fixed time, no pause, no feedback until the end
    Exam,
    /// pausable, immediate feedback on every answer
    Training,
}

/// What the user asked for on the configuration screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConfiguration {
    pub mode: Mode,
    pub subjects: Vec<String>,
    pub question_count: usize,
    /// 0 means unlimited
    pub time_limit_minutes: u32,
    pub user_name: String,
    #[serde(default)]
    pub competition_id: Option<String>,
}

impl TestConfiguration {
    pub fn competition_id(&self) -> &str {
        self.competition_id.as_deref().unwrap_or(DEFAULT_COMPETITION_ID)
    }
}

/// Correctness shown to the user right after a training-mode answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerFeedback {
    pub question_id: i64,
    pub is_correct: bool,
    pub correct_option_index: usize,
}

/// Result of applying an answer to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedAnswer {
    pub question_id: i64,
    /// 1-based position of the answered question
    pub position: usize,
    /// Only present in training mode
    pub feedback: Option<AnswerFeedback>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Moved(usize),
    /// Already on the last question; moving forward means submitting.
    AtEnd,
}

/// One in-progress attempt. Mutated in place until it is finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSession {
    pub id: String,
    pub user_name: String,
    pub competition_id: String,
    pub mode: Mode,
    pub subjects: Vec<String>,
    pub questions: Vec<Question>,
    pub answers: BTreeMap<i64, usize>,
    // Kept for every mode; only written to in training.
    pub correct_question_ids: BTreeSet<i64>,
    pub incorrect_question_ids: BTreeSet<i64>,
    #[serde(with = "tagged_date")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "tagged_date::option", default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub is_paused: bool,
    pub time_limit_seconds: u64,
    pub time_remaining_seconds: u64,
    pub total_questions: usize,
    pub current_question_position: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    pub is_completed: bool,
}

impl TestSession {
    pub fn create(
        config: &TestConfiguration,
        questions: Vec<Question>,
        now: DateTime<Utc>,
    ) -> Self {
        let time_limit_seconds = u64::from(config.time_limit_minutes) * 60;
        Self {
            id: generate_session_id(now),
            user_name: config.user_name.clone(),
            competition_id: config.competition_id().to_string(),
            mode: config.mode,
            subjects: config.subjects.clone(),
            total_questions: questions.len(),
            questions,
            answers: BTreeMap::new(),
            correct_question_ids: BTreeSet::new(),
            incorrect_question_ids: BTreeSet::new(),
            start_time: now,
            end_time: None,
            is_paused: false,
            time_limit_seconds,
            time_remaining_seconds: time_limit_seconds,
            current_question_position: 1,
            score: None,
            is_completed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn has_time_limit(&self) -> bool {
        self.time_limit_seconds > 0
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_question_position.saturating_sub(1))
    }

    pub fn position_of(&self, question_id: i64) -> Option<usize> {
        self.questions
            .iter()
            .position(|q| q.id == question_id)
            .map(|idx| idx + 1)
    }

    pub fn answer_for(&self, question_id: i64) -> Option<usize> {
        self.answers.get(&question_id).copied()
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    pub fn is_last_position(&self) -> bool {
        self.current_question_position >= self.questions.len()
    }

    /// Store the selected option, overwriting any earlier one.
    ///
    /// Unknown question ids are ignored. In training mode the question is
    /// moved into exactly one of the correct/incorrect sets.
    pub fn record_answer(&mut self, question_id: i64, selected_option_index: usize) -> Option<RecordedAnswer> {
        let position = self.position_of(question_id)?;
        let correct_option_index = self.questions[position - 1].correct_option_index;

        self.answers.insert(question_id, selected_option_index);

        let feedback = match self.mode {
            Mode::Exam => None,
            Mode::Training => {
                let is_correct = selected_option_index == correct_option_index;
                if is_correct {
                    self.incorrect_question_ids.remove(&question_id);
                    self.correct_question_ids.insert(question_id);
                } else {
                    self.correct_question_ids.remove(&question_id);
                    self.incorrect_question_ids.insert(question_id);
                }
                Some(AnswerFeedback {
                    question_id,
                    is_correct,
                    correct_option_index,
                })
            }
        };

        Some(RecordedAnswer {
            question_id,
            position,
            feedback,
        })
    }

    /// Move back one question. Returns false when already on the first.
    pub fn go_previous(&mut self) -> bool {
        if self.current_question_position > 1 {
            self.current_question_position -= 1;
            true
        } else {
            false
        }
    }

    pub fn step_forward(&mut self) -> Step {
        if self.is_last_position() {
            Step::AtEnd
        } else {
            self.current_question_position += 1;
            Step::Moved(self.current_question_position)
        }
    }

    /// Jump to any 1-based position. Free navigation is allowed during a test.
    pub fn go_to(&mut self, position: usize) -> Result<(), QuizError> {
        if position == 0 || position > self.questions.len() {
            return Err(QuizError::PositionOutOfRange {
                position,
                len: self.questions.len(),
            });
        }
        self.current_question_position = position;
        Ok(())
    }

    pub fn set_paused(&mut self, paused: bool) -> Result<(), QuizError> {
        if paused && self.mode == Mode::Exam {
            return Err(QuizError::PauseNotAllowed);
        }
        self.is_paused = paused;
        Ok(())
    }
}

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `test_<unix millis>_<9 random base-36 chars>`
pub fn generate_session_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("test_{}_{}", now.timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::fixtures::pool;
    use assert_matches::assert_matches;

    fn config(mode: Mode, minutes: u32) -> TestConfiguration {
        TestConfiguration {
            mode,
            subjects: vec!["Math".into()],
            question_count: 5,
            time_limit_minutes: minutes,
            user_name: "ada".into(),
            competition_id: None,
        }
    }

    fn session(mode: Mode) -> TestSession {
        TestSession::create(&config(mode, 10), pool("Math", 1..=5), Utc::now())
    }

    #[test]
    fn factory_initial_state() {
        let now = Utc::now();
        let s = TestSession::create(&config(Mode::Exam, 10), pool("Math", 1..=5), now);

        assert!(s.id.starts_with("test_"));
        assert_eq!(s.competition_id, DEFAULT_COMPETITION_ID);
        assert_eq!(s.len(), 5);
        assert_eq!(s.total_questions, 5);
        assert_eq!(s.time_limit_seconds, 600);
        assert_eq!(s.time_remaining_seconds, 600);
        assert_eq!(s.current_question_position, 1);
        assert_eq!(s.start_time, now);
        assert!(s.answers.is_empty());
        assert!(s.correct_question_ids.is_empty());
        assert!(s.incorrect_question_ids.is_empty());
        assert!(!s.is_paused);
        assert!(!s.is_completed);
    }

    #[test]
    fn unlimited_time() {
        let s = TestSession::create(&config(Mode::Training, 0), pool("Math", 1..=2), Utc::now());
        assert!(!s.has_time_limit());
        assert_eq!(s.time_remaining_seconds, 0);
    }

    #[test]
    fn session_ids_are_unique() {
        let now = Utc::now();
        let a = generate_session_id(now);
        let b = generate_session_id(now);
        assert_ne!(a, b);
        let suffix = a.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 9);
        assert!(suffix.bytes().all(|c| ID_ALPHABET.contains(&c)));
    }

    #[test]
    fn reanswering_overwrites() {
        let mut s = session(Mode::Exam);
        s.record_answer(2, 0);
        s.record_answer(2, 3);

        assert_eq!(s.answers.len(), 1);
        assert_eq!(s.answer_for(2), Some(3));
    }

    #[test]
    fn exam_answers_keep_sets_empty() {
        let mut s = session(Mode::Exam);
        let recorded = s.record_answer(1, 1).unwrap();

        assert_eq!(recorded.position, 1);
        assert_eq!(recorded.feedback, None);
        assert!(s.correct_question_ids.is_empty());
        assert!(s.incorrect_question_ids.is_empty());
    }

    #[test]
    fn training_reclassifies_on_reanswer() {
        let mut s = session(Mode::Training);
        // question 3 has correct option 3
        let first = s.record_answer(3, 0).unwrap();
        assert_eq!(
            first.feedback,
            Some(AnswerFeedback {
                question_id: 3,
                is_correct: false,
                correct_option_index: 3
            })
        );
        assert!(s.incorrect_question_ids.contains(&3));

        s.record_answer(3, 3);
        assert!(s.correct_question_ids.contains(&3));
        assert!(!s.incorrect_question_ids.contains(&3));

        s.record_answer(3, 3);
        assert_eq!(s.correct_question_ids.len(), 1);
        assert!(s.incorrect_question_ids.is_empty());
    }

    #[test]
    fn unknown_question_is_ignored() {
        let mut s = session(Mode::Training);
        assert_eq!(s.record_answer(42, 0), None);
        assert!(s.answers.is_empty());
        assert!(s.incorrect_question_ids.is_empty());
    }

    #[test]
    fn navigation_stays_in_bounds() {
        let mut s = session(Mode::Exam);

        assert!(!s.go_previous());
        assert_eq!(s.current_question_position, 1);

        for expected in 2..=5 {
            assert_eq!(s.step_forward(), Step::Moved(expected));
        }
        assert_eq!(s.step_forward(), Step::AtEnd);
        assert_eq!(s.current_question_position, 5);

        assert!(s.go_previous());
        assert_eq!(s.current_question_position, 4);
    }

    #[test]
    fn go_to_any_position_during_test() {
        let mut s = session(Mode::Exam);
        s.go_to(5).unwrap();
        assert_eq!(s.current_question_position, 5);
        s.go_to(2).unwrap();
        assert_eq!(s.current_question().map(|q| q.id), Some(2));

        assert_matches!(
            s.go_to(0),
            Err(QuizError::PositionOutOfRange { position: 0, len: 5 })
        );
        assert_matches!(s.go_to(6), Err(QuizError::PositionOutOfRange { .. }));
        assert_eq!(s.current_question_position, 2);
    }

    #[test]
    fn exam_cannot_pause() {
        let mut s = session(Mode::Exam);
        assert_matches!(s.set_paused(true), Err(QuizError::PauseNotAllowed));
        assert!(!s.is_paused);

        let mut t = session(Mode::Training);
        t.set_paused(true).unwrap();
        assert!(t.is_paused);
        t.set_paused(false).unwrap();
        assert!(!t.is_paused);
    }

    #[test]
    fn serialized_session_roundtrips() {
        let mut s = session(Mode::Training);
        s.record_answer(1, 1);
        s.record_answer(2, 0);
        s.go_to(3).unwrap();

        let json = serde_json::to_string(&s).unwrap();
        let back: TestSession = serde_json::from_str(&json).unwrap();

        assert_eq!(back, s);
    }
}

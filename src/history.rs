use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::QuizError;
use crate::question::Question;
use crate::session::{Mode, TestSession};
use crate::storage::tagged_date;
use crate::util::{mean, score_percent};

/// Immutable record of one finalized session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub user_name: String,
    pub competition_id: String,
    pub competition_name: String,
    pub mode: Mode,
    pub score: u32,
    pub total_questions: usize,
    pub correct_count: usize,
    #[serde(with = "tagged_date")]
    pub completed_at: DateTime<Utc>,
    pub time_spent_seconds: u64,
    pub subjects: Vec<String>,
    pub questions: Vec<Question>,
    pub answers: BTreeMap<i64, usize>,
}

/// Correct answers counted over every question, ignoring any incremental bookkeeping.
pub fn count_correct(questions: &[Question], answers: &BTreeMap<i64, usize>) -> usize {
    questions
        .iter()
        .filter(|q| answers.get(&q.id) == Some(&q.correct_option_index))
        .count()
}

impl HistoryEntry {
    /// Score the session as of `completed_at`.
    pub fn from_session(session: &TestSession, completed_at: DateTime<Utc>, competition_name: &str) -> Self {
        let total_questions = session.questions.len();
        let correct_count = count_correct(&session.questions, &session.answers);
        let time_spent_seconds = (completed_at - session.start_time).num_seconds().max(0) as u64;

        Self {
            id: session.id.clone(),
            user_name: session.user_name.clone(),
            competition_id: session.competition_id.clone(),
            competition_name: competition_name.to_string(),
            mode: session.mode,
            score: score_percent(correct_count, total_questions),
            total_questions,
            correct_count,
            completed_at,
            time_spent_seconds,
            subjects: session.subjects.clone(),
            questions: session.questions.clone(),
            answers: session.answers.clone(),
        }
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    pub fn is_answered(&self, position: usize) -> bool {
        position
            .checked_sub(1)
            .and_then(|idx| self.questions.get(idx))
            .is_some_and(|q| self.answers.contains_key(&q.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistorySummary {
    pub attempts: usize,
    pub mean_score: Option<f64>,
    pub best_score: Option<u32>,
}

/// Append-only log of finalized sessions, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
}

impl HistoryStore {
    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn all(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Result<&HistoryEntry, QuizError> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| QuizError::HistoryEntryNotFound(id.to_string()))
    }

    pub fn by_competition<'a>(&'a self, competition_id: &'a str) -> impl Iterator<Item = &'a HistoryEntry> {
        self.entries
            .iter()
            .filter(move |e| e.competition_id == competition_id)
    }

    pub fn by_mode(&self, mode: Mode) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().filter(move |e| e.mode == mode)
    }

    /// Entries matching both filters when given; `None` matches everything.
    pub fn query<'a>(
        &'a self,
        competition_id: Option<&'a str>,
        mode: Option<Mode>,
    ) -> impl Iterator<Item = &'a HistoryEntry> {
        self.entries.iter().filter(move |e| {
            competition_id.map_or(true, |c| e.competition_id == c) && mode.map_or(true, |m| e.mode == m)
        })
    }

    pub fn summary(&self, competition_id: Option<&str>) -> BTreeMap<Mode, HistorySummary> {
        self.query(competition_id, None)
            .map(|e| (e.mode, e))
            .into_group_map()
            .into_iter()
            .map(|(mode, entries)| {
                let scores: Vec<f64> = entries.iter().map(|e| f64::from(e.score)).collect();
                let summary = HistorySummary {
                    attempts: entries.len(),
                    mean_score: mean(&scores),
                    best_score: entries.iter().map(|e| e.score).max(),
                };
                (mode, summary)
            })
            .collect()
    }
}

/// Read-only walk through a finished test. Jumps only land on answered questions.
#[derive(Debug, Clone)]
pub struct ReviewCursor<'a> {
    entry: &'a HistoryEntry,
    position: usize,
}

impl<'a> ReviewCursor<'a> {
    pub fn new(entry: &'a HistoryEntry) -> Self {
        Self { entry, position: 1 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn question(&self) -> Option<&'a Question> {
        self.entry.questions.get(self.position.saturating_sub(1))
    }

    pub fn selected(&self) -> Option<usize> {
        self.question().and_then(|q| self.entry.answers.get(&q.id).copied())
    }

    pub fn previous(&mut self) -> bool {
        if self.position > 1 {
            self.position -= 1;
            true
        } else {
            false
        }
    }

    pub fn next(&mut self) -> bool {
        if self.position < self.entry.questions.len() {
            self.position += 1;
            true
        } else {
            false
        }
    }

    pub fn go_to(&mut self, position: usize) -> Result<(), QuizError> {
        if position == 0 || position > self.entry.questions.len() {
            return Err(QuizError::PositionOutOfRange {
                position,
                len: self.entry.questions.len(),
            });
        }
        if !self.entry.is_answered(position) {
            return Err(QuizError::NotAnswered(position));
        }
        self.position = position;
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::storage::tagged_date;

static DATA_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/data");

/// Id of the built-in competition, also used when a configuration names none.
pub const DEFAULT_COMPETITION_ID: &str = "default";

pub const OPTIONS_PER_QUESTION: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// A single multiple-choice question. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    #[serde(rename = "question")]
    pub text: String,
    pub options: Vec<String>,
    #[serde(rename = "correctAnswer")]
    pub correct_option_index: usize,
    pub subject: String,
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Question {
    pub fn is_correct(&self, selected_option_index: usize) -> bool {
        selected_option_index == self.correct_option_index
    }

    /// Letter shown next to an option: 0 -> 'A', 1 -> 'B', ...
    pub fn option_label(index: usize) -> char {
        (b'A' + (index as u8 % 26)) as char
    }
}

/// A named question bank. Tests are always run against one competition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Competition {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "examTimeLimit")]
    pub exam_time_limit_minutes: u32,
    pub subjects: Vec<String>,
    pub questions: Vec<Question>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(with = "tagged_date")]
    pub created_at: DateTime<Utc>,
}

impl Competition {
    /// Builds a competition, deriving its subjects from the questions.
    pub fn new(
        id: String,
        name: String,
        description: String,
        exam_time_limit_minutes: u32,
        questions: Vec<Question>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let subjects = subjects_of(&questions);
        Self {
            id,
            name,
            description,
            exam_time_limit_minutes,
            subjects,
            questions,
            is_default: false,
            created_at,
        }
    }

    /// The bank compiled into the binary.
    pub fn builtin() -> Self {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct BuiltinBank {
            name: String,
            description: String,
            exam_time_limit: u32,
            questions: Vec<Question>,
        }

        let bank: BuiltinBank = DATA_DIR
            .get_file("default_bank.json")
            .and_then(|f| f.contents_utf8())
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_else(|| {
                log::error!("built-in question bank is missing or malformed");
                BuiltinBank {
                    name: "General knowledge".to_string(),
                    description: String::new(),
                    exam_time_limit: 30,
                    questions: Vec::new(),
                }
            });

        let mut competition = Competition::new(
            DEFAULT_COMPETITION_ID.to_string(),
            bank.name,
            bank.description,
            bank.exam_time_limit,
            bank.questions,
            DateTime::from_timestamp(0, 0).unwrap_or_else(Utc::now),
        );
        competition.is_default = true;
        competition
    }
}

/// Distinct non-empty subjects in first-seen order.
pub fn subjects_of(questions: &[Question]) -> Vec<String> {
    let mut seen = HashSet::new();
    questions
        .iter()
        .map(|q| q.subject.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .map(str::to_string)
        .collect()
}

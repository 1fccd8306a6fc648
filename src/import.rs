use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::error::ImportError;
use crate::question::{Competition, Difficulty, Question, OPTIONS_PER_QUESTION};

const CSV_COLUMNS: [&str; 8] = [
    "question",
    "option1",
    "option2",
    "option3",
    "option4",
    "correct_answer",
    "subject",
    "difficulty",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankFormat {
    Json,
    Csv,
}

impl BankFormat {
    pub fn from_path(path: &Path) -> Result<Self, ImportError> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("json") => Ok(BankFormat::Json),
            Some("csv") => Ok(BankFormat::Csv),
            _ => Err(ImportError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// A question as it appears in an upload, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    id: Option<i64>,
    question: Option<String>,
    options: Option<Vec<String>>,
    /// 0-based in JSON uploads
    correct_answer: Option<serde_json::Value>,
    subject: Option<String>,
    difficulty: Option<String>,
    explanation: Option<String>,
}

/// Read a bank file and turn it into a new competition.
///
/// The whole upload is rejected on the first invalid row.
pub fn import_file(
    path: &Path,
    name: &str,
    exam_time_limit_minutes: u32,
    now: DateTime<Utc>,
) -> Result<Competition, ImportError> {
    let format = BankFormat::from_path(path)?;
    let text = std::fs::read_to_string(path)?;
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    import_text(&text, format, name, &file_name, exam_time_limit_minutes, now)
}

pub fn import_text(
    text: &str,
    format: BankFormat,
    name: &str,
    file_name: &str,
    exam_time_limit_minutes: u32,
    now: DateTime<Utc>,
) -> Result<Competition, ImportError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ImportError::MissingName);
    }

    let id_base = now.timestamp_millis();
    let questions = match format {
        BankFormat::Json => parse_json(text, id_base)?,
        BankFormat::Csv => parse_csv(text, id_base)?,
    };

    log::info!("imported {} questions from {file_name}", questions.len());
    Ok(Competition::new(
        format!("comp_{id_base}"),
        name.to_string(),
        format!("Imported from {file_name}"),
        exam_time_limit_minutes,
        questions,
        now,
    ))
}

pub fn parse_json(text: &str, id_base: i64) -> Result<Vec<Question>, ImportError> {
    let raw: Vec<RawQuestion> = serde_json::from_str(text)?;
    let raw = raw
        .into_iter()
        .map(|mut q| {
            let correct = match q.correct_answer.take() {
                Some(serde_json::Value::Number(n)) => n.to_string(),
                Some(serde_json::Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => String::new(),
            };
            (q, correct, false)
        })
        .collect();
    validate(raw, id_base)
}

pub fn parse_csv(text: &str, id_base: i64) -> Result<Vec<Question>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    if !CSV_COLUMNS.iter().all(|c| headers.iter().any(|h| h == c)) {
        return Err(ImportError::MissingColumns(CSV_COLUMNS.join(", ")));
    }
    let column = |name: &str| headers.iter().position(|h| h == name);

    let mut raw = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        let field = |name: &str| {
            column(name)
                .and_then(|i| record.get(i))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let options = (1..=OPTIONS_PER_QUESTION)
            .filter_map(|n| field(&format!("option{n}")))
            .collect::<Vec<_>>();
        let question = RawQuestion {
            id: field("id").and_then(|v| v.parse().ok()),
            question: field("question"),
            options: Some(options),
            correct_answer: None,
            subject: field("subject"),
            difficulty: field("difficulty"),
            explanation: field("explanation"),
        };
        raw.push((question, field("correct_answer").unwrap_or_default(), true));
    }
    validate(raw, id_base)
}

/// `(question, correct answer text, correct answer is 1-based)`
fn validate(raw: Vec<(RawQuestion, String, bool)>, id_base: i64) -> Result<Vec<Question>, ImportError> {
    if raw.is_empty() {
        return Err(ImportError::Empty);
    }

    let mut seen_ids = HashSet::new();
    let mut questions = Vec::with_capacity(raw.len());

    for (idx, (q, correct, one_based)) in raw.into_iter().enumerate() {
        let row = idx + 1;

        let text = required(q.question, row, "question")?;
        let subject = required(q.subject, row, "subject")?;
        let difficulty_raw = required(q.difficulty, row, "difficulty")?;
        let options = q.options.ok_or(ImportError::MissingField { row, field: "options" })?;
        if options.len() != OPTIONS_PER_QUESTION {
            return Err(ImportError::OptionCount {
                row,
                found: options.len(),
            });
        }
        if correct.trim().is_empty() {
            return Err(ImportError::MissingField {
                row,
                field: "correct_answer",
            });
        }

        let correct_option_index = correct
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| if one_based { n.checked_sub(1) } else { Some(n) })
            .filter(|n| *n < options.len())
            .ok_or_else(|| ImportError::CorrectAnswer {
                row,
                value: correct.clone(),
            })?;

        let difficulty = Difficulty::parse(&difficulty_raw).ok_or_else(|| ImportError::Difficulty {
            row,
            value: difficulty_raw.clone(),
        })?;

        let id = q.id.unwrap_or(id_base + idx as i64);
        if !seen_ids.insert(id) {
            return Err(ImportError::DuplicateId { row, id });
        }

        questions.push(Question {
            id,
            text,
            options,
            correct_option_index,
            subject,
            difficulty,
            explanation: q.explanation.filter(|e| !e.trim().is_empty()),
        });
    }

    Ok(questions)
}

fn required(value: Option<String>, row: usize, field: &'static str) -> Result<String, ImportError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ImportError::MissingField { row, field })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    const CSV: &str = "\
question,option1,option2,option3,option4,correct_answer,subject,difficulty
What is 2+2?,3,4,5,6,2,Math,easy
Capital of France?,Rome,Madrid,Paris,Berlin,3,Geography,Medium
";

    #[test]
    fn csv_converts_one_based_answers() {
        let qs = parse_csv(CSV, 1000).unwrap();

        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].correct_option_index, 1);
        assert_eq!(qs[1].correct_option_index, 2);
        assert_eq!(qs[1].difficulty, Difficulty::Medium);
        assert_eq!(qs[0].id, 1000);
        assert_eq!(qs[1].id, 1001);
    }

    #[test]
    fn csv_columns_in_any_order() {
        let csv = "\
subject,difficulty,correct_answer,question,option4,option3,option2,option1,explanation
Math,hard,4,Pick d,d,c,b,a,because
";
        let qs = parse_csv(csv, 1).unwrap();
        assert_eq!(qs[0].options, vec!["a", "b", "c", "d"]);
        assert_eq!(qs[0].correct_option_index, 3);
        assert_eq!(qs[0].explanation.as_deref(), Some("because"));
    }

    #[test]
    fn csv_missing_column_rejected() {
        let csv = "question,option1,option2,option3,option4,subject,difficulty\nq,a,b,c,d,Math,easy\n";
        assert_matches!(parse_csv(csv, 1), Err(ImportError::MissingColumns(_)));
    }

    #[test]
    fn csv_answer_out_of_range_rejected() {
        let csv = "question,option1,option2,option3,option4,correct_answer,subject,difficulty\nq,a,b,c,d,5,Math,easy\n";
        assert_matches!(
            parse_csv(csv, 1),
            Err(ImportError::CorrectAnswer { row: 1, .. })
        );

        let zero = "question,option1,option2,option3,option4,correct_answer,subject,difficulty\nq,a,b,c,d,0,Math,easy\n";
        assert_matches!(parse_csv(zero, 1), Err(ImportError::CorrectAnswer { .. }));
    }

    #[test]
    fn csv_missing_option_rejected() {
        let csv = "question,option1,option2,option3,option4,correct_answer,subject,difficulty\nq,a,b,,d,1,Math,easy\n";
        assert_matches!(
            parse_csv(csv, 1),
            Err(ImportError::OptionCount { row: 1, found: 3 })
        );
    }

    #[test]
    fn json_bank_parses() {
        let json = r#"[
            {"id": 7, "question": "q", "options": ["a","b","c","d"], "correctAnswer": 0, "subject": "Math", "difficulty": "easy", "explanation": "x"},
            {"question": "r", "options": ["a","b","c","d"], "correctAnswer": 3, "subject": "Art", "difficulty": "hard"}
        ]"#;
        let qs = parse_json(json, 500).unwrap();

        assert_eq!(qs[0].id, 7);
        assert_eq!(qs[1].id, 501);
        assert_eq!(qs[1].correct_option_index, 3);
    }

    #[test]
    fn json_missing_field_rejected() {
        let json = r#"[{"question": "q", "options": ["a","b","c","d"], "correctAnswer": 0, "difficulty": "easy"}]"#;
        assert_matches!(
            parse_json(json, 1),
            Err(ImportError::MissingField { row: 1, field: "subject" })
        );
    }

    #[test]
    fn json_bad_difficulty_rejected() {
        let json = r#"[{"question": "q", "options": ["a","b","c","d"], "correctAnswer": 0, "subject": "Math", "difficulty": "brutal"}]"#;
        assert_matches!(parse_json(json, 1), Err(ImportError::Difficulty { .. }));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let json = r#"[
            {"id": 1, "question": "q", "options": ["a","b","c","d"], "correctAnswer": 0, "subject": "M", "difficulty": "easy"},
            {"id": 1, "question": "r", "options": ["a","b","c","d"], "correctAnswer": 0, "subject": "M", "difficulty": "easy"}
        ]"#;
        assert_matches!(parse_json(json, 1), Err(ImportError::DuplicateId { row: 2, id: 1 }));
    }

    #[test]
    fn empty_bank_rejected() {
        assert_matches!(parse_json("[]", 1), Err(ImportError::Empty));
        assert_matches!(parse_csv(&CSV[..CSV.find('\n').unwrap() + 1], 1), Err(ImportError::Empty));
    }

    #[test]
    fn import_file_builds_competition() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bank.csv");
        std::fs::write(&path, CSV).unwrap();
        let now = Utc::now();

        let comp = import_file(&path, "  Public 2024 ", 45, now).unwrap();

        assert_eq!(comp.id, format!("comp_{}", now.timestamp_millis()));
        assert_eq!(comp.name, "Public 2024");
        assert_eq!(comp.description, "Imported from bank.csv");
        assert_eq!(comp.exam_time_limit_minutes, 45);
        assert_eq!(comp.subjects, vec!["Math", "Geography"]);
        assert!(!comp.is_default);
    }

    #[test]
    fn unsupported_extension_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bank.txt");
        std::fs::write(&path, CSV).unwrap();
        assert_matches!(
            import_file(&path, "x", 30, Utc::now()),
            Err(ImportError::UnsupportedFormat(_))
        );
    }

    #[test]
    fn blank_name_rejected() {
        assert_matches!(
            import_text(CSV, BankFormat::Csv, "  ", "bank.csv", 30, Utc::now()),
            Err(ImportError::MissingName)
        );
    }
}

use thiserror::Error;

/// Failures surfaced by the quiz state machine to its caller.
///
/// None of these terminate an active session: the caller converts them to
/// a redirect or a user-facing message.
#[derive(Debug, Error)]
pub enum QuizError {
    #[error("no test configuration supplied and no active session to resume")]
    MissingPrerequisite,

    #[error("history entry not found: {0}")]
    HistoryEntryNotFound(String),

    #[error("competition not found: {0}")]
    CompetitionNotFound(String),

    #[error("pausing is only available in training mode")]
    PauseNotAllowed,

    #[error("there is no active session")]
    NoActiveSession,

    #[error("position {position} is outside 1..={len}")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("question {0} has not been answered")]
    NotAnswered(usize),

    #[error("leaving an exam discards it and must be confirmed")]
    ConfirmationRequired,

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Reasons a question-bank upload is rejected.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unsupported file format: {0} (expected .json or .csv)")]
    UnsupportedFormat(String),

    #[error("CSV must contain the columns: {0}")]
    MissingColumns(String),

    #[error("row {row}: missing field `{field}`")]
    MissingField { row: usize, field: &'static str },

    #[error("row {row}: expected 4 options, found {found}")]
    OptionCount { row: usize, found: usize },

    #[error("row {row}: correct answer `{value}` is not a valid option")]
    CorrectAnswer { row: usize, value: String },

    #[error("row {row}: unknown difficulty `{value}`")]
    Difficulty { row: usize, value: String },

    #[error("row {row}: duplicate question id {id}")]
    DuplicateId { row: usize, id: i64 },

    #[error("the uploaded bank contains no questions")]
    Empty,

    #[error("a competition name is required")]
    MissingName,

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the persisted key-value state.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// Library surface for headless/integration tests and reuse.
// The CLI and terminal event loop live in main.rs.
pub mod app;
pub mod app_dirs;
pub mod bank;
pub mod clock;
pub mod config;
pub mod error;
pub mod history;
pub mod import;
pub mod question;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod timer;
pub mod ui;
pub mod util;

pub use app::{Entry, Exit, Finished, QuizApp};
pub use error::{ImportError, QuizError, StorageError};
pub use session::{Mode, TestConfiguration, TestSession};

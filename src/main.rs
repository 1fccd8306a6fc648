use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use quizr::{
    app::{Exit, Finished, QuizApp},
    app_dirs::AppDirs,
    clock::{Clock, SystemClock},
    config::{Config, ConfigStore, FileConfigStore},
    history::ReviewCursor,
    question::{Question, DEFAULT_COMPETITION_ID},
    runtime::{Command, CrosstermEventSource, FixedTicker, QuizEvent, QuizEventSource, Runner, Ticker},
    session::{Mode, TestConfiguration},
    storage::{KeyValueStore, SqliteStore},
    timer::format_clock,
    ui::{ui, Prompt, ScreenState},
    QuizError,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    time::Duration,
};
use time_humanize::HumanTime;

const TICK_RATE_MS: u64 = 100;

/// multiple-choice quizzes with timed exams, pausable training and a score history
#[derive(Parser, Debug)]
#[clap(version, about)]
pub struct Cli {
    /// database file holding sessions, history and imported competitions
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// config file with default counts, time limits and user name
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// start a new test, or resume the active one
    Start {
        #[clap(short, long, value_enum, default_value_t = Mode::Training)]
        mode: Mode,

        /// subject to draw questions from (repeatable; default: all)
        #[clap(short, long = "subject")]
        subjects: Vec<String>,

        /// number of questions
        #[clap(short = 'n', long)]
        count: Option<usize>,

        /// time limit in minutes, 0 for unlimited
        #[clap(short = 't', long)]
        minutes: Option<u32>,

        /// name recorded in the history
        #[clap(long)]
        name: Option<String>,

        /// competition id (see `competitions`)
        #[clap(short, long)]
        competition: Option<String>,
    },
    /// resume a saved training session
    Resume,
    /// list finished tests
    History {
        #[clap(short, long)]
        competition: Option<String>,

        #[clap(short, long, value_enum)]
        mode: Option<Mode>,
    },
    /// show every question and answer of a finished test
    Review { id: String },
    /// import a question bank from a .csv or .json file
    Import {
        file: PathBuf,

        /// competition name
        #[clap(long)]
        name: String,

        /// exam time limit in minutes for this competition
        #[clap(short = 't', long)]
        minutes: Option<u32>,
    },
    /// list available competitions
    Competitions,
    /// remove an imported competition
    DeleteCompetition { id: String },
    /// show the effective settings and where they are read from
    Config {
        /// write the current settings to the config file
        #[clap(long)]
        init: bool,
    },
}

#[derive(Debug)]
enum LoopOutcome {
    Finished(Box<Finished>),
    Left(Exit),
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config_store = cli
        .config
        .as_ref()
        .map(FileConfigStore::with_path)
        .unwrap_or_default();
    let config = config_store.load();

    let db_path = AppDirs::db_path(cli.db.as_deref().or(config.database_path.as_deref()));
    let store = SqliteStore::open(&db_path)?;
    log::debug!("using database {}", db_path.display());
    let mut app = QuizApp::new(store, SystemClock);

    match cli.command {
        Commands::Start {
            mode,
            subjects,
            count,
            minutes,
            name,
            competition,
        } => {
            let test_config = build_test_config(&app, &config, mode, subjects, count, minutes, name, competition)?;
            require_tty();
            app.start(Some(test_config))?;
            run_interactive(&mut app)?;
        }
        Commands::Resume => {
            if app.session().is_none() {
                println!("No saved session. Start one with `quizr start`.");
                return Ok(());
            }
            require_tty();
            app.start(None)?;
            run_interactive(&mut app)?;
        }
        Commands::History { competition, mode } => print_history(&app, competition.as_deref(), mode),
        Commands::Review { id } => match app.review(&id) {
            Ok(entry) => print_review(entry),
            Err(QuizError::HistoryEntryNotFound(id)) => {
                println!("No finished test with id {id}. Run `quizr history` to list them.");
            }
            Err(e) => return Err(e.into()),
        },
        Commands::Import { file, name, minutes } => {
            let minutes = minutes.unwrap_or(config.exam_time_limit_minutes);
            match app.import_competition(&file, &name, minutes) {
                Ok(comp) => println!(
                    "Created competition {} ({}): {} questions in {} subjects",
                    comp.name,
                    comp.id,
                    comp.questions.len(),
                    comp.subjects.len()
                ),
                Err(QuizError::Import(e)) => {
                    eprintln!("Import rejected: {e}");
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Competitions => {
            for comp in app.competitions() {
                println!(
                    "{:<24} {:<30} {:>4} questions  {:>3} min  {}",
                    comp.id,
                    comp.name,
                    comp.questions.len(),
                    comp.exam_time_limit_minutes,
                    comp.subjects.join(", ")
                );
            }
        }
        Commands::DeleteCompetition { id } => {
            if id == DEFAULT_COMPETITION_ID {
                eprintln!("The built-in competition cannot be deleted.");
                std::process::exit(2);
            }
            app.delete_competition(&id)?;
            println!("Deleted competition {id}");
        }
        Commands::Config { init } => {
            if init {
                config_store.save(&config)?;
                println!("Wrote {}", config_store.path().display());
            } else {
                println!("# {}", config_store.path().display());
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

fn require_tty() {
    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }
}

#[allow(clippy::too_many_arguments)]
fn build_test_config<S: KeyValueStore, C: Clock>(
    app: &QuizApp<S, C>,
    config: &Config,
    mode: Mode,
    subjects: Vec<String>,
    count: Option<usize>,
    minutes: Option<u32>,
    name: Option<String>,
    competition_id: Option<String>,
) -> Result<TestConfiguration, QuizError> {
    let competition = app.competition(competition_id.as_deref().unwrap_or(DEFAULT_COMPETITION_ID))?;

    let subjects = if subjects.is_empty() {
        competition.subjects.clone()
    } else {
        subjects
    };
    let question_count = count.unwrap_or(match mode {
        Mode::Exam => config.exam_question_count,
        Mode::Training => config.training_question_count,
    });
    let time_limit_minutes = minutes.unwrap_or(match mode {
        Mode::Exam => competition.exam_time_limit_minutes,
        Mode::Training => config.training_time_limit_minutes,
    });
    let user_name = name
        .or_else(|| config.user_name.clone())
        .or_else(|| Some(app.user_name()).filter(|n| !n.is_empty()))
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "anonymous".to_string());

    Ok(TestConfiguration {
        mode,
        subjects,
        question_count: question_count.max(1),
        time_limit_minutes,
        user_name,
        competition_id: Some(competition.id.clone()),
    })
}

fn run_interactive<S: KeyValueStore, C: Clock>(app: &mut QuizApp<S, C>) -> Result<(), Box<dyn Error>> {
    // a saved training session comes back paused
    if app.session().is_some_and(|s| s.is_paused) {
        app.resume()?;
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let outcome = start_tui(&mut terminal, &runner, app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    match outcome? {
        LoopOutcome::Finished(finished) => print_results(&finished),
        LoopOutcome::Left(Exit::Saved) => println!("Progress saved. Continue later with `quizr resume`."),
        LoopOutcome::Left(Exit::Discarded) => println!("Exam abandoned; nothing was recorded."),
    }
    Ok(())
}

fn start_tui<B: Backend, E: QuizEventSource, T: Ticker, S: KeyValueStore, C: Clock>(
    terminal: &mut Terminal<B>,
    runner: &Runner<E, T>,
    app: &mut QuizApp<S, C>,
) -> Result<LoopOutcome, Box<dyn Error>> {
    let mut screen = ScreenState::default();

    loop {
        terminal.draw(|f| ui(app, &screen, f))?;

        let key = match runner.step() {
            QuizEvent::Tick => {
                if let Some(finished) = app.on_tick() {
                    return Ok(LoopOutcome::Finished(Box::new(finished)));
                }
                continue;
            }
            QuizEvent::Resize => continue,
            QuizEvent::Key(key) => key,
        };

        let go_to_pending = matches!(screen.prompt, Prompt::GoTo(_));
        if let Some(outcome) = handle_command(app, &mut screen, Command::from_key(key, go_to_pending)) {
            return Ok(outcome);
        }
    }
}

/// Apply one decoded key to the app. Errors end up on screen, never out of the loop.
fn handle_command<S: KeyValueStore, C: Clock>(
    app: &mut QuizApp<S, C>,
    screen: &mut ScreenState,
    command: Option<Command>,
) -> Option<LoopOutcome> {
    // confirmation prompts take a single y, anything else backs out
    match std::mem::take(&mut screen.prompt) {
        Prompt::ConfirmExit => {
            return match command {
                Some(Command::Confirm) => report(screen, app.exit(true)).map(LoopOutcome::Left),
                _ => None,
            };
        }
        Prompt::ConfirmEnd => {
            return match command {
                Some(Command::Confirm) => app.finalize().map(|f| LoopOutcome::Finished(Box::new(f))),
                _ => None,
            };
        }
        prompt => screen.prompt = prompt,
    }

    let command = command?;
    screen.message = None;

    match command {
        Command::Answer(option) => {
            screen.feedback = report(screen, app.answer_current(option)).flatten();
        }
        Command::Next => {
            screen.feedback = None;
            if let Some(finished) = report(screen, app.go_next()).flatten() {
                return Some(LoopOutcome::Finished(Box::new(finished)));
            }
        }
        Command::Previous => {
            screen.feedback = None;
            report(screen, app.go_previous());
        }
        Command::BeginGoTo => screen.prompt = Prompt::GoTo(String::new()),
        Command::Digit(d) => {
            if let Prompt::GoTo(input) = &mut screen.prompt {
                input.push(char::from(b'0' + d));
            }
        }
        Command::Confirm => {
            if let Prompt::GoTo(input) = std::mem::take(&mut screen.prompt) {
                screen.feedback = None;
                report(screen, app.go_to(input.parse().unwrap_or(0)));
            }
        }
        Command::Cancel => screen.prompt = Prompt::None,
        Command::TogglePause => {
            let paused = app.session().is_some_and(|s| s.is_paused);
            report(screen, if paused { app.resume() } else { app.pause() });
        }
        Command::EndTest => {
            if app.session().is_some() {
                screen.prompt = Prompt::ConfirmEnd;
            }
        }
        Command::Exit => match app.exit(false) {
            Ok(exit) => return Some(LoopOutcome::Left(exit)),
            Err(QuizError::ConfirmationRequired) => screen.prompt = Prompt::ConfirmExit,
            Err(e) => screen.message = Some(e.to_string()),
        },
    }
    None
}

fn report<T>(screen: &mut ScreenState, result: Result<T, QuizError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("{e}");
            screen.message = Some(e.to_string());
            None
        }
    }
}

fn print_results(finished: &Finished) {
    let entry = &finished.entry;
    println!("Test complete ({})", entry.mode);
    println!(
        "Score: {}%  ({} of {} correct, {} answered)",
        entry.score,
        entry.correct_count,
        entry.total_questions,
        entry.answered_count()
    );
    println!("Time spent: {}", format_clock(entry.time_spent_seconds));
    println!("Review it with `quizr review {}`", entry.id);
}

fn print_history<S: KeyValueStore, C: Clock>(app: &QuizApp<S, C>, competition: Option<&str>, mode: Option<Mode>) {
    let history = app.history();
    let entries: Vec<_> = history.query(competition, mode).collect();
    if entries.is_empty() {
        println!("No finished tests yet.");
        return;
    }

    let now = chrono::Utc::now();
    for entry in &entries {
        let ago = HumanTime::from_seconds(-(now - entry.completed_at).num_seconds());
        println!(
            "{:<28} {:<9} {:<24} {:>3}%  {:>3}/{:<3} {:>8}  {}",
            entry.id,
            entry.mode.to_string(),
            entry.competition_name,
            entry.score,
            entry.correct_count,
            entry.total_questions,
            format_clock(entry.time_spent_seconds),
            ago
        );
    }

    println!();
    for (summary_mode, summary) in history.summary(competition) {
        if mode.is_some_and(|m| m != summary_mode) {
            continue;
        }
        println!(
            "{summary_mode}: {} attempts, average {:.0}%, best {}%",
            summary.attempts,
            summary.mean_score.unwrap_or(0.0),
            summary.best_score.unwrap_or(0)
        );
    }
}

fn print_review(entry: &quizr::history::HistoryEntry) {
    println!(
        "{} | {} | {} | {}% ({}/{})",
        entry.id, entry.mode, entry.competition_name, entry.score, entry.correct_count, entry.total_questions
    );
    println!();

    let mut cursor = ReviewCursor::new(entry);
    loop {
        if let Some(question) = cursor.question() {
            let selected = cursor.selected();
            println!("{}. [{}] {}", cursor.position(), question.subject, question.text);
            for (idx, option) in question.options.iter().enumerate() {
                let mark = match (selected == Some(idx), question.is_correct(idx)) {
                    (true, true) => "✓",
                    (true, false) => "✗",
                    (false, true) => "→",
                    (false, false) => " ",
                };
                println!("  {mark} {}) {option}", Question::option_label(idx));
            }
            if selected.is_none() {
                println!("  (not answered)");
            }
            if let Some(explanation) = &question.explanation {
                println!("  {explanation}");
            }
            println!();
        }
        if !cursor.next() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use quizr::{clock::ManualClock, runtime::TestEventSource, storage::MemoryStore};
    use ratatui::backend::TestBackend;
    use std::sync::mpsc;

    fn started(mode: Mode, subject: &str) -> QuizApp<MemoryStore, ManualClock> {
        let mut app = QuizApp::new(MemoryStore::new(), ManualClock::default());
        app.start(Some(TestConfiguration {
            mode,
            subjects: vec![subject.to_string()],
            question_count: 3,
            time_limit_minutes: 10,
            user_name: "ada".into(),
            competition_id: None,
        }))
        .unwrap();
        app
    }

    fn press(c: char) -> Option<Command> {
        Command::from_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE), false)
    }

    #[test]
    fn end_test_waits_for_confirmation() {
        let mut app = started(Mode::Exam, "Mathematics");
        let mut screen = ScreenState::default();

        assert!(handle_command(&mut app, &mut screen, press('e')).is_none());
        assert_eq!(screen.prompt, Prompt::ConfirmEnd);
        assert!(app.session().is_some());

        // anything but y backs out and is not applied
        assert!(handle_command(&mut app, &mut screen, press('n')).is_none());
        assert_eq!(screen.prompt, Prompt::None);
        assert_eq!(app.session().unwrap().current_question_position, 1);

        handle_command(&mut app, &mut screen, press('e'));
        let outcome = handle_command(&mut app, &mut screen, press('y'));
        assert!(matches!(outcome, Some(LoopOutcome::Finished(_))));
        assert!(app.session().is_none());
        assert_eq!(app.history().len(), 1);
    }

    #[test]
    fn answering_an_empty_test_keeps_running() {
        let mut app = started(Mode::Exam, "Astrology");
        let mut screen = ScreenState::default();

        assert!(handle_command(&mut app, &mut screen, press('1')).is_none());
        assert!(screen.message.is_none());
        assert!(app.session().is_some());
    }

    #[test]
    fn errors_are_shown_not_returned() {
        let mut app = started(Mode::Exam, "Mathematics");
        let mut screen = ScreenState::default();

        handle_command(&mut app, &mut screen, press('g'));
        handle_command(&mut app, &mut screen, Some(Command::Digit(9)));
        assert!(handle_command(&mut app, &mut screen, Some(Command::Confirm)).is_none());
        assert!(screen.message.as_deref().unwrap().contains('9'));

        assert!(handle_command(&mut app, &mut screen, press(' ')).is_none());
        assert!(screen.message.is_some());
        assert!(app.session().is_some());
    }

    #[test]
    fn exam_exit_confirmed_discards() {
        let mut app = started(Mode::Exam, "History");
        let mut screen = ScreenState::default();

        assert!(handle_command(&mut app, &mut screen, press('q')).is_none());
        assert_eq!(screen.prompt, Prompt::ConfirmExit);
        let outcome = handle_command(&mut app, &mut screen, press('y'));
        assert!(matches!(outcome, Some(LoopOutcome::Left(Exit::Discarded))));
        assert!(app.history().is_empty());
    }

    #[test]
    fn tui_loop_draws_and_submits() {
        let mut app = started(Mode::Training, "Science");
        let (tx, rx) = mpsc::channel();
        for c in ['2', 'e', 'y'] {
            tx.send(QuizEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)))
                .unwrap();
        }
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::new(Duration::from_millis(5)));
        let mut terminal = Terminal::new(TestBackend::new(100, 24)).unwrap();

        let outcome = start_tui(&mut terminal, &runner, &mut app).unwrap();
        let LoopOutcome::Finished(finished) = outcome else {
            panic!("expected the test to be submitted");
        };
        assert_eq!(finished.entry.answered_count(), 1);
        assert_eq!(finished.entry.total_questions, 3);
    }
}

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Everything the quiz loop reacts to, delivered one at a time.
#[derive(Clone, Debug)]
pub enum QuizEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// Source of terminal events (keyboard, resize, etc.)
pub trait QuizEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<QuizEvent, RecvTimeoutError>;
}

/// Reads crossterm events on a background thread and forwards them over a channel.
pub struct CrosstermEventSource {
    rx: Receiver<QuizEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let forwarded = match event::read() {
                // Windows reports both press and release
                Ok(CtEvent::Key(key)) if key.kind != KeyEventKind::Release => tx.send(QuizEvent::Key(key)),
                Ok(CtEvent::Resize(_, _)) => tx.send(QuizEvent::Resize),
                Ok(_) => Ok(()),
                Err(e) => {
                    log::error!("terminal event read failed: {e}");
                    break;
                }
            };
            if forwarded.is_err() {
                break;
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl QuizEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<QuizEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Channel-fed source for headless runs and tests.
pub struct TestEventSource {
    rx: Receiver<QuizEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<QuizEvent>) -> Self {
        Self { rx }
    }
}

impl QuizEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<QuizEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Yields the next event, or a tick when none arrives within the tick interval.
pub struct Runner<E: QuizEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: QuizEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    pub fn step(&self) -> QuizEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => QuizEvent::Tick,
        }
    }
}

/// A user intent decoded from a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// 0-based option index
    Answer(usize),
    Next,
    Previous,
    /// Start typing a question number to jump to
    BeginGoTo,
    Digit(u8),
    Confirm,
    Cancel,
    TogglePause,
    EndTest,
    Exit,
}

impl Command {
    /// `go_to_pending` switches digits from answers to position input.
    pub fn from_key(key: KeyEvent, go_to_pending: bool) -> Option<Command> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(Command::Exit);
        }
        match key.code {
            KeyCode::Char(c @ '0'..='9') if go_to_pending => Some(Command::Digit(c as u8 - b'0')),
            KeyCode::Enter if go_to_pending => Some(Command::Confirm),
            KeyCode::Esc if go_to_pending => Some(Command::Cancel),
            KeyCode::Char(c @ '1'..='4') => Some(Command::Answer((c as u8 - b'1') as usize)),
            KeyCode::Char(c @ 'a'..='d') => Some(Command::Answer((c as u8 - b'a') as usize)),
            KeyCode::Char('n') | KeyCode::Right | KeyCode::Enter => Some(Command::Next),
            KeyCode::Char('p') | KeyCode::Left => Some(Command::Previous),
            KeyCode::Char('g') => Some(Command::BeginGoTo),
            KeyCode::Char(' ') => Some(Command::TogglePause),
            KeyCode::Char('e') => Some(Command::EndTest),
            KeyCode::Char('q') | KeyCode::Esc => Some(Command::Exit),
            KeyCode::Char('y') => Some(Command::Confirm),
            _ => None,
        }
    }
}

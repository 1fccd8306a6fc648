use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
    Frame,
};

use crate::app::QuizApp;
use crate::clock::Clock;
use crate::question::Question;
use crate::session::{AnswerFeedback, Mode, TestSession};
use crate::storage::KeyValueStore;
use crate::timer::{format_clock, CountdownTimer};

const HORIZONTAL_MARGIN: u16 = 2;

/// A question the screen is waiting on before it acts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Prompt {
    #[default]
    None,
    /// Digits typed so far for a jump.
    GoTo(String),
    ConfirmExit,
    ConfirmEnd,
}

/// Front-end state that is never persisted.
#[derive(Debug, Clone, Default)]
pub struct ScreenState {
    pub feedback: Option<AnswerFeedback>,
    pub prompt: Prompt,
    pub message: Option<String>,
}

/// Warning shown before a test is submitted from the keyboard.
pub fn end_test_warning(session: &TestSession) -> String {
    let unanswered = session.len() - session.answered_count().min(session.len());
    let mut warning = if unanswered == 0 {
        format!("All {} questions answered.", session.len())
    } else {
        format!("{unanswered} of {} questions are unanswered.", session.len())
    };
    if session.mode == Mode::Exam {
        warning.push_str(" Answers become final.");
    }
    warning.push_str(" End the test? (y/N)");
    warning
}

/// One frame of the test screen.
pub struct QuizView<'a> {
    session: &'a TestSession,
    timer: Option<&'a CountdownTimer>,
    screen: &'a ScreenState,
}

impl<'a> QuizView<'a> {
    pub fn new(session: &'a TestSession, timer: Option<&'a CountdownTimer>, screen: &'a ScreenState) -> Self {
        Self { session, timer, screen }
    }

    fn clock_span(&self) -> Span<'static> {
        let Some(timer) = self.timer else {
            return Span::styled("no time limit", Style::default().add_modifier(Modifier::DIM));
        };
        let color = match timer.remaining_percent() {
            p if p > 50.0 => Color::Green,
            p if p > 20.0 => Color::Yellow,
            _ => Color::Red,
        };
        let mut style = Style::default().fg(color).add_modifier(Modifier::BOLD);
        if self.session.is_paused {
            style = style.add_modifier(Modifier::DIM);
        }
        Span::styled(format!("time left {}", format_clock(timer.remaining_secs())), style)
    }

    fn header(&self) -> Line<'static> {
        let session = self.session;
        let mut spans = vec![
            Span::styled(
                session.mode.to_string().to_uppercase(),
                Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(
                "  question {}/{}  answered {}  ",
                session.current_question_position,
                session.len(),
                session.answered_count()
            )),
            self.clock_span(),
        ];
        if session.is_paused {
            spans.push(Span::styled(
                "  PAUSED",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD | Modifier::ITALIC),
            ));
        }
        Line::from(spans)
    }

    fn question_lines(&self, question: &Question) -> Vec<Line<'static>> {
        let selected = self.session.answer_for(question.id);
        let mut lines = vec![
            Line::from(Span::styled(question.text.clone(), Style::default().add_modifier(Modifier::BOLD))),
            Line::default(),
        ];
        for (idx, option) in question.options.iter().enumerate() {
            let chosen = selected == Some(idx);
            let style = if chosen {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            lines.push(Line::from(Span::styled(
                format!("{} {}) {option}", if chosen { '>' } else { ' ' }, Question::option_label(idx)),
                style,
            )));
        }
        lines
    }

    fn feedback_line(&self, question: &Question) -> Line<'static> {
        match self.screen.feedback.as_ref().filter(|f| f.question_id == question.id) {
            Some(f) if f.is_correct => Line::from(Span::styled(
                "Correct!",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            )),
            Some(f) => {
                let mut text = format!(
                    "Wrong. The correct answer is {}.",
                    Question::option_label(f.correct_option_index)
                );
                if let Some(explanation) = &question.explanation {
                    text.push(' ');
                    text.push_str(explanation);
                }
                Line::from(Span::styled(text, Style::default().fg(Color::Red)))
            }
            None => Line::default(),
        }
    }

    fn footer(&self) -> Line<'static> {
        let warn = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
        match &self.screen.prompt {
            Prompt::ConfirmExit => Line::from(Span::styled(
                "Leave the exam? Your progress will be lost. (y/N)",
                warn,
            )),
            Prompt::ConfirmEnd => Line::from(Span::styled(end_test_warning(self.session), warn)),
            Prompt::GoTo(input) => Line::from(format!("go to question: {input}_  (enter to jump, esc to cancel)")),
            Prompt::None => {
                let pause = if self.session.mode == Mode::Training { "  space pause" } else { "" };
                Line::from(Span::styled(
                    format!("1-4 answer  n next  p previous  g go to{pause}  e end test  q leave"),
                    Style::default().add_modifier(Modifier::DIM),
                ))
            }
        }
    }
}

impl Widget for &QuizView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let session = self.session;
        let tally_lines = if session.mode == Mode::Training { 1 } else { 0 };

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(tally_lines),
                Constraint::Min(4),
                Constraint::Length(2),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(area);

        Paragraph::new(self.header()).render(chunks[0], buf);

        if tally_lines > 0 {
            Paragraph::new(Line::from(vec![
                Span::styled(
                    format!("correct {}", session.correct_question_ids.len()),
                    Style::default().fg(Color::Green),
                ),
                Span::raw("  "),
                Span::styled(
                    format!("wrong {}", session.incorrect_question_ids.len()),
                    Style::default().fg(Color::Red),
                ),
            ]))
            .render(chunks[1], buf);
        }

        match session.current_question() {
            Some(question) => {
                Paragraph::new(self.question_lines(question))
                    .block(
                        Block::default()
                            .borders(Borders::ALL)
                            .title(format!(" {} ", question.subject)),
                    )
                    .wrap(Wrap { trim: false })
                    .render(chunks[2], buf);
                Paragraph::new(self.feedback_line(question))
                    .wrap(Wrap { trim: true })
                    .render(chunks[3], buf);
            }
            None => {
                Paragraph::new("This test has no questions. Press e to end it.")
                    .alignment(Alignment::Center)
                    .block(Block::default().borders(Borders::ALL))
                    .render(chunks[2], buf);
            }
        }

        Paragraph::new(self.footer()).render(chunks[4], buf);
        if let Some(message) = &self.screen.message {
            Paragraph::new(Span::styled(message.clone(), Style::default().fg(Color::Red))).render(chunks[5], buf);
        }
    }
}

/// Draw the active session, if there is one.
pub fn ui<S: KeyValueStore, C: Clock>(app: &QuizApp<S, C>, screen: &ScreenState, f: &mut Frame) {
    if let Some(session) = app.session() {
        f.render_widget(&QuizView::new(session, app.timer(), screen), f.area());
    }
}

//! Interactive progress view for `gitagu analyze --tui`.
//!
//! The progress stream is drained on the async runtime and forwarded over a
//! channel to a blocking render loop that owns the terminal.

use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use gitagu_core::{AnalysisResult, ProgressStatus, ProgressStream, Signal, StreamMessage};
use ratatui::DefaultTerminal;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Gauge, List, ListItem, Paragraph, Wrap};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

const POLL_INTERVAL: Duration = Duration::from_millis(80);
const FORWARD_CHANNEL_SIZE: usize = 64;

/// Show `stream` until the user quits; returns the final result if one arrived.
pub async fn run(
    mut stream: ProgressStream,
    repo: String,
    assistant: String,
) -> Result<Option<AnalysisResult>> {
    let (tx, rx) = mpsc::channel(FORWARD_CHANNEL_SIZE);
    let forwarder = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            if tx.send(message).await.is_err() {
                break;
            }
        }
    });

    let app = App::new(repo, assistant);
    let outcome = tokio::task::spawn_blocking(move || {
        let mut terminal = ratatui::init();
        let outcome = app.run(&mut terminal, rx);
        ratatui::restore();
        outcome
    })
    .await
    .context("terminal view panicked")?;

    forwarder.abort();
    let app = outcome?;
    if let Some(error) = app.error {
        anyhow::bail!("analysis failed: {error}");
    }
    Ok(app.result)
}

/// Render state.
#[derive(Debug)]
pub struct App {
    repo: String,
    assistant: String,
    percentage: u8,
    events: Vec<(ProgressStatus, String)>,
    result: Option<AnalysisResult>,
    error: Option<String>,
    finished: bool,
    running: bool,
    scroll: u16,
}

impl App {
    pub fn new(repo: String, assistant: String) -> Self {
        Self {
            repo,
            assistant,
            percentage: 0,
            events: Vec::new(),
            result: None,
            error: None,
            finished: false,
            running: true,
            scroll: 0,
        }
    }

    fn run(
        mut self,
        terminal: &mut DefaultTerminal,
        mut rx: mpsc::Receiver<StreamMessage>,
    ) -> Result<Self> {
        while self.running {
            loop {
                match rx.try_recv() {
                    Ok(message) => self.apply(message),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.finished = true;
                        break;
                    }
                }
            }
            terminal.draw(|frame| self.draw(frame))?;
            self.handle_events()?;
        }
        Ok(self)
    }

    /// Fold one stream message into the view state.
    pub fn apply(&mut self, message: StreamMessage) {
        match message {
            StreamMessage::Progress(update) => {
                self.percentage = self.percentage.max(update.progress_percentage);
                let line = format!("[{}] {}: {}", update.step, update.step_name, update.message);
                self.events.push((update.status, line));
            }
            StreamMessage::Signal(Signal::FinalResult { data }) => {
                self.result = Some(data);
            }
            StreamMessage::Signal(Signal::Complete) => {
                self.percentage = 100;
                self.finished = true;
            }
            StreamMessage::Signal(Signal::Error { error, .. }) => {
                self.error = Some(error);
                self.finished = true;
            }
        }
    }

    fn result_text(&self) -> Vec<Line<'static>> {
        if let Some(error) = &self.error {
            return vec![Line::from(error.clone()).fg(Color::Red)];
        }
        let Some(result) = &self.result else {
            return vec![Line::from("Waiting for analysis...").italic()];
        };

        let mut lines: Vec<Line<'static>> =
            result.analysis.lines().map(|l| Line::from(l.to_owned())).collect();
        if let Some(commands) = &result.setup_commands {
            lines.push(Line::default());
            lines.push(Line::from("Setup commands").bold());
            for (key, value) in commands.iter() {
                lines.push(Line::from(Span::styled(format!("{key}:"), Style::new().bold())));
                lines.extend(value.lines().map(|l| Line::from(format!("  {l}"))));
            }
        }
        lines
    }

    fn draw(&self, frame: &mut ratatui::Frame) {
        let [gauge_area, events_area, result_area] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Length(9),
            Constraint::Min(5),
        ])
        .areas(frame.area());

        let title = format!(" {} for {} ", self.repo, self.assistant);
        let label = if self.finished {
            format!("{}% done (q to quit)", self.percentage)
        } else {
            format!("{}%", self.percentage)
        };
        let gauge = Gauge::default()
            .block(Block::bordered().title(title))
            .gauge_style(Style::new().fg(Color::Cyan))
            .percent(u16::from(self.percentage.min(100)))
            .label(label);
        frame.render_widget(gauge, gauge_area);

        let visible = usize::from(events_area.height.saturating_sub(2));
        let skip = self.events.len().saturating_sub(visible);
        let items: Vec<ListItem> = self
            .events
            .iter()
            .skip(skip)
            .map(|(status, line)| ListItem::new(line.clone()).style(status_style(*status)))
            .collect();
        frame.render_widget(List::new(items).block(Block::bordered().title(" Progress ")), events_area);

        let result = Paragraph::new(self.result_text())
            .block(Block::bordered().title(" Result "))
            .wrap(Wrap { trim: false })
            .scroll((self.scroll, 0));
        frame.render_widget(result, result_area);
    }

    fn handle_events(&mut self) -> Result<()> {
        if !event::poll(POLL_INTERVAL)? {
            return Ok(());
        }
        if let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => self.running = false,
                KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
                KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
                _ => {}
            }
        }
        Ok(())
    }
}

fn status_style(status: ProgressStatus) -> Style {
    match status {
        ProgressStatus::Starting => Style::new(),
        ProgressStatus::InProgress => Style::new().fg(Color::Yellow),
        ProgressStatus::Completed => Style::new().fg(Color::Green),
        ProgressStatus::Failed => Style::new().fg(Color::Red),
    }
}

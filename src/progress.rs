use anyhow::Result;
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::index::FileRecord;
use crate::scan::{ScanObserver, ScanWarning};
use crate::tui::{self, fmt_size};

const REDRAW_INTERVAL: Duration = Duration::from_millis(50);

/// Counters behind the panel, kept apart from the terminal so they can be
/// read without one.
#[derive(Debug, Default)]
struct ScanStats {
    current_dir: String,
    files_digested: u64,
    bytes_digested: u64,
    warnings: usize,
}

impl ScanStats {
    /// Label, value and colour for each status row below the current directory.
    fn rows(&self, elapsed: Duration) -> [(&'static str, String, Color); 4] {
        [
            ("Files digested", self.files_digested.to_string(), Color::Cyan),
            ("Bytes read", fmt_size(self.bytes_digested), Color::Yellow),
            ("Warnings", self.warnings.to_string(), Color::Red),
            ("Elapsed", format!("{:.1}s", elapsed.as_secs_f64()), Color::Green),
        ]
    }
}

/// Live scan progress panel for one tree.
pub struct ScanProgress {
    label: String,
    stats: ScanStats,
    warnings: Vec<ScanWarning>,
    log_lines: Vec<String>,
    start: Instant,
    last_draw: Option<Instant>,
    terminal: tui::Term,
}

impl ScanProgress {
    /// Take over the terminal. Fails when stdout is not a usable TTY.
    pub fn start(label: &str) -> Result<Self> {
        let terminal = tui::enter()?;
        let mut progress = Self {
            label: label.to_string(),
            stats: ScanStats::default(),
            warnings: Vec::new(),
            log_lines: Vec::new(),
            start: Instant::now(),
            last_draw: None,
            terminal,
        };
        progress.render()?;
        Ok(progress)
    }

    /// Restore the terminal and replay the warnings it was hiding.
    pub fn finish(mut self) -> Result<()> {
        tui::leave(&mut self.terminal)?;
        for warning in &self.warnings {
            tracing::warn!("{warning}");
        }
        tracing::info!(
            "{} tree: {} files digested ({}) in {:.1}s",
            self.label,
            self.stats.files_digested,
            fmt_size(self.stats.bytes_digested),
            self.start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    fn maybe_render(&mut self) {
        let due = self
            .last_draw
            .map_or(true, |t| t.elapsed() >= REDRAW_INTERVAL);
        if due {
            let _ = self.render();
        }
    }

    fn render(&mut self) -> Result<()> {
        self.last_draw = Some(Instant::now());

        let title = format!(" dircmp: digesting {} tree ", self.label);
        let rows = self.stats.rows(self.start.elapsed());
        let current_dir = &self.stats.current_dir;
        let log_lines = &self.log_lines;

        self.terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(rows.len() as u16 + 4), Constraint::Min(0)])
                .split(f.area());

            const SCANNING: &str = "Scanning: ";
            let path_width = (chunks[0].width as usize).saturating_sub(2 + SCANNING.len());
            let mut status_text = vec![
                Line::from(vec![
                    Span::styled(SCANNING, Style::default().add_modifier(Modifier::BOLD)),
                    Span::raw(tui::truncate_path(current_dir, path_width)),
                ]),
                Line::from(""),
            ];
            status_text.extend(rows.iter().map(|(label, value, colour)| {
                Line::from(vec![
                    Span::styled(format!("{:<16}", format!("{label}:")), Style::default().fg(*colour)),
                    Span::raw(value.clone()),
                ])
            }));
            let status = Paragraph::new(status_text)
                .block(Block::default().borders(Borders::ALL).title(title.as_str()))
                .wrap(Wrap { trim: false });
            f.render_widget(status, chunks[0]);

            let log_text: Vec<Line> = log_lines.iter().map(|l| Line::from(l.as_str())).collect();
            let log = Paragraph::new(log_text)
                .block(Block::default().borders(Borders::ALL).title(" Log "))
                .wrap(Wrap { trim: true });
            f.render_widget(log, chunks[1]);
        })?;

        Ok(())
    }
}

impl ScanObserver for ScanProgress {
    fn enter_dir(&mut self, dir: &Path) {
        self.stats.current_dir = dir.to_string_lossy().into_owned();
        self.maybe_render();
    }

    fn file_digested(&mut self, record: &FileRecord) {
        self.stats.files_digested += 1;
        self.stats.bytes_digested += record.size;
        self.maybe_render();
    }

    fn warning(&mut self, warning: &ScanWarning) {
        self.log_lines.push(warning.to_string());
        if self.log_lines.len() > 100 {
            self.log_lines.remove(0);
        }
        self.stats.warnings += 1;
        self.warnings.push(warning.clone());
        let _ = self.render();
    }
}

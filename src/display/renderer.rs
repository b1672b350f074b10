use std::borrow::Cow;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crossterm::queue;
use crossterm::style::Print;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::theme;
use crate::classifier::ClassificationError;
use crate::session::{ChunkOutcome, SessionPhase};

/// Progress output for an analysis run.
pub struct Renderer<W: Write = io::Stdout> {
    /// Whether a chunk line has been started and not yet finished.
    line_open: bool,
    /// Fixed width for truncation; the terminal is queried when unset.
    width: Option<usize>,
    out: W,
}

impl Default for Renderer<io::Stdout> {
    fn default() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl Renderer<io::Stdout> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<W: Write> Renderer<W> {
    pub fn with_writer(writer: W) -> Self {
        Self {
            line_open: false,
            width: None,
            out: writer,
        }
    }

    /// Truncate summaries to `width` columns instead of the terminal width.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render_start(&mut self, chat_file: &Path, messages: usize, chunks: usize, chunk_size: usize) {
        let line = format!(
            "Analyzing {} ({messages} messages, {chunks} chunks of {chunk_size})",
            chat_file.display()
        );
        queue!(self.out, Print(theme::dim().apply(line)), Print("\n")).ok();
        self.out.flush().ok();
    }

    pub fn render_bounded(&mut self, first_chunk: usize, limit: Option<usize>) {
        let line = match limit {
            Some(n) => format!("Bounded run: up to {n} chunk(s) from chunk {first_chunk}, checkpoint untouched"),
            None => format!("Bounded run: from chunk {first_chunk}, checkpoint untouched"),
        };
        queue!(self.out, Print(theme::dim().apply(line)), Print("\n")).ok();
        self.out.flush().ok();
    }

    /// `next_chunk` is 1-based.
    pub fn render_resume(&mut self, next_chunk: usize, total: usize, phase: &SessionPhase) {
        let line = format!("Resuming at chunk {next_chunk}/{total} ({phase})");
        queue!(self.out, Print(theme::dim().apply(line)), Print("\n")).ok();
        self.out.flush().ok();
    }

    /// Start the line for a chunk about to be classified. `chunk_number` is
    /// 1-based.
    pub fn render_chunk_sent(&mut self, chunk_number: usize, total: usize, messages: usize) {
        self.close_line();
        let label = format!("Chunk {chunk_number}/{total}");
        queue!(
            self.out,
            Print(theme::chunk_label().apply(label)),
            Print(theme::dim().apply(format!(" ({messages} messages) "))),
        )
        .ok();
        self.line_open = true;
        self.out.flush().ok();
    }

    /// Finish the chunk line with where its messages went.
    pub fn render_chunk_done(&mut self, outcome: &ChunkOutcome, opened_summary: Option<&str>) {
        let mut placed = format!("{} main", outcome.to_main);
        if let Some(key) = &outcome.session {
            placed.push_str(&format!(", {} {key}", outcome.to_session));
        }
        queue!(self.out, Print(placed)).ok();
        if let Some(key) = &outcome.closed {
            queue!(self.out, Print(theme::dim().apply(format!(" (closed {key})")))).ok();
        }
        queue!(self.out, Print("\n")).ok();
        self.line_open = false;

        if let Some(key) = &outcome.opened {
            let prefix = format!("  ▶ {key}: ");
            let room = self.width().saturating_sub(prefix.width());
            let summary = fit_to_width(opened_summary.unwrap_or_default(), room);
            let line = format!("{prefix}{summary}");
            queue!(self.out, Print(theme::session().apply(line)), Print("\n")).ok();
        }
        self.out.flush().ok();
    }

    /// Report a chunk that could not be classified, with the reply text when
    /// one was received. Nothing is truncated: the raw reply is what the
    /// user needs to diagnose the failure.
    pub fn render_classification_error(&mut self, chunk_number: usize, error: &ClassificationError) {
        self.close_line();
        let line = format!("✗ chunk {chunk_number}: {error}");
        queue!(self.out, Print(theme::error().apply(line)), Print("\n")).ok();
        if let Some(raw) = error.raw_response() {
            queue!(self.out, Print(theme::dim().apply("  raw response:")), Print("\n")).ok();
            for raw_line in raw.lines() {
                queue!(self.out, Print("    "), Print(raw_line), Print("\n")).ok();
            }
        }
        self.out.flush().ok();
    }

    pub fn render_complete(&mut self, chunks: usize, sessions: u32, files: &[PathBuf]) {
        self.close_line();
        let line = format!("Done: {chunks} chunk(s), {sessions} debugging session(s)");
        queue!(self.out, Print(theme::result_line().apply(line)), Print("\n")).ok();
        for file in files {
            queue!(
                self.out,
                Print(theme::dim().apply(format!("  wrote {}", file.display()))),
                Print("\n"),
            )
            .ok();
        }
        self.out.flush().ok();
    }

    pub fn render_warning(&mut self, warning: &str) {
        self.close_line();
        queue!(
            self.out,
            Print(theme::warning().apply(format!("[warn] {warning}"))),
            Print("\n"),
        )
        .ok();
        self.out.flush().ok();
    }

    fn close_line(&mut self) {
        if self.line_open {
            queue!(self.out, Print("\n")).ok();
            self.line_open = false;
        }
    }

    /// Columns available for a line; 80 when stdout is not a terminal.
    fn width(&self) -> usize {
        self.width.unwrap_or_else(|| {
            crossterm::terminal::size().map_or(80, |(cols, _)| usize::from(cols))
        })
    }
}

/// Cut `s` to at most `columns` display columns, marking a cut with `…`.
fn fit_to_width(s: &str, columns: usize) -> Cow<'_, str> {
    if s.width() <= columns {
        return Cow::Borrowed(s);
    }
    let Some(room) = columns.checked_sub(1) else {
        return Cow::Borrowed("");
    };
    let mut used = 0;
    let kept: String = s
        .chars()
        .take_while(|ch| {
            used += ch.width().unwrap_or(0);
            used <= room
        })
        .collect();
    Cow::Owned(kept + "…")
}

use std::env;
use std::fs;
use std::io::{self, Stdout, Write};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{
    self as term, disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{queue, ExecutableCommand};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Clear, Padding, Paragraph};
use ratatui::{Frame, Terminal};
use tracing::{debug, warn};
use unicode_width::UnicodeWidthStr;

use crate::loader::Surface;

/// Symbols that have a plain ASCII fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glyphs {
    pub upvote: &'static str,
    pub downvote: &'static str,
    pub neutral: &'static str,
    pub gilded: &'static str,
    pub bar: &'static str,
}

impl Glyphs {
    pub const UNICODE: Glyphs = Glyphs {
        upvote: "▲",
        downvote: "▼",
        neutral: "•",
        gilded: "✪",
        bar: "│",
    };

    pub const ASCII: Glyphs = Glyphs {
        upvote: "^",
        downvote: "v",
        neutral: "o",
        gilded: "*",
        bar: "|",
    };

    pub fn select(ascii: bool) -> &'static Glyphs {
        if ascii {
            &Glyphs::ASCII
        } else {
            &Glyphs::UNICODE
        }
    }
}

const LEVEL_COLORS: [Color; 4] = [Color::Magenta, Color::Cyan, Color::Green, Color::Yellow];

/// Color of the comment bar at a nesting level.
pub fn level_color(level: usize) -> Color {
    LEVEL_COLORS[level % LEVEL_COLORS.len()]
}

/// Everything a page needs from the screen and the host system.
pub trait Ui {
    fn draw(&mut self, render: &mut dyn FnMut(&mut Frame<'_>)) -> Result<()>;

    /// Next key press. `None` when the terminal was resized instead.
    fn next_key(&mut self) -> Result<Option<KeyEvent>>;

    /// Signals an invalid action.
    fn flash(&mut self) -> Result<()>;

    /// Shows `message` over the current frame until a key is pressed and
    /// returns that key.
    fn notify(&mut self, message: &str) -> Result<KeyEvent>;

    /// Reads one line of input. `None` when the user backs out.
    fn prompt(&mut self, label: &str) -> Result<Option<String>>;

    fn confirm(&mut self, question: &str) -> Result<bool> {
        let key = self.notify(question)?;
        Ok(matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')))
    }

    /// Opens `text` in the user's editor. Lines starting with `#` are
    /// dropped from the result; `None` when nothing is left.
    fn edit(&mut self, text: &str) -> Result<Option<String>>;

    fn open_browser(&mut self, url: &str) -> Result<()>;

    fn loading_surface(&mut self) -> Box<dyn Surface>;

    fn glyphs(&self) -> &'static Glyphs;
}

pub fn is_interrupt(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
}

/// Text typed into a prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineInput {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputStatus {
    Pending,
    Done(String),
    Cancelled,
}

impl LineInput {
    pub fn handle(&mut self, key: KeyEvent) -> InputStatus {
        if is_interrupt(&key) {
            return InputStatus::Cancelled;
        }
        match key.code {
            KeyCode::Enter => InputStatus::Done(self.text.trim().to_string()),
            KeyCode::Esc => InputStatus::Cancelled,
            KeyCode::Backspace => {
                self.text.pop();
                InputStatus::Pending
            }
            KeyCode::Char(ch) => {
                self.text.push(ch);
                InputStatus::Pending
            }
            _ => InputStatus::Pending,
        }
    }
}

/// Centered, bordered box sized to fit `message` inside `area`.
pub fn message_area(message: &str, area: Rect) -> Rect {
    let text_width = message
        .lines()
        .map(UnicodeWidthStr::width)
        .max()
        .unwrap_or(0) as u16;
    let text_height = message.lines().count().max(1) as u16;
    let width = text_width.saturating_add(4).min(area.width);
    let height = text_height.saturating_add(2).min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

pub fn render_message(frame: &mut Frame<'_>, message: &str) {
    let area = message_area(message, frame.size());
    let lines: Vec<Line<'_>> = message.lines().map(Line::from).collect();
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .padding(Padding::horizontal(1))
                .border_style(Style::default().add_modifier(Modifier::BOLD)),
        ),
        area,
    );
}

/// One-line input at the bottom of the screen.
pub fn render_prompt(frame: &mut Frame<'_>, label: &str, input: &LineInput) {
    let size = frame.size();
    if size.height == 0 {
        return;
    }
    let area = Rect {
        x: size.x,
        y: size.y + size.height - 1,
        width: size.width,
        height: 1,
    };
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(format!("{}{}", label, input.text))
            .style(Style::default().add_modifier(Modifier::REVERSED)),
        area,
    );
    let cursor = UnicodeWidthStr::width(label) + UnicodeWidthStr::width(input.text.as_str());
    frame.set_cursor(area.x + (cursor as u16).min(area.width.saturating_sub(1)), area.y);
}

/// Draws `overlay` on top of the last completed frame.
pub fn draw_over<B: Backend>(
    terminal: &mut Terminal<B>,
    backdrop: &Buffer,
    overlay: impl FnOnce(&mut Frame<'_>),
) -> io::Result<Buffer> {
    let completed = terminal.draw(|frame| {
        if frame.buffer_mut().area == backdrop.area {
            frame.buffer_mut().clone_from(backdrop);
        }
        overlay(frame);
    })?;
    Ok(completed.buffer.clone())
}

/// Drops instruction lines (`#...`) and surrounding blank space.
pub fn strip_instructions(text: &str) -> String {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Editor command: configured value, then `$RTV_EDITOR`, `$EDITOR`, `nano`.
pub fn editor_command(configured: Option<&str>) -> Vec<String> {
    let raw = configured
        .map(str::to_string)
        .or_else(|| env::var("RTV_EDITOR").ok())
        .or_else(|| env::var("EDITOR").ok())
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "nano".to_string());
    raw.split_whitespace().map(str::to_string).collect()
}

/// The real terminal.
pub struct Term {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    backdrop: Buffer,
    glyphs: &'static Glyphs,
    editor: Option<String>,
    stale: Arc<AtomicBool>,
}

impl Term {
    pub fn enter(ascii: bool, editor: Option<String>) -> Result<Self> {
        let mut stdout = io::stdout();
        enable_raw_mode().context("terminal: enable raw mode")?;
        stdout
            .execute(EnterAlternateScreen)
            .context("terminal: enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("terminal: create")?;
        terminal.clear()?;
        terminal.hide_cursor()?;
        Ok(Self {
            terminal,
            backdrop: Buffer::empty(Rect::default()),
            glyphs: Glyphs::select(ascii),
            editor,
            stale: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn leave(&mut self) -> Result<()> {
        disable_raw_mode()?;
        self.terminal.backend_mut().execute(LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }

    fn suspend<T>(&mut self, run: impl FnOnce() -> Result<T>) -> Result<T> {
        self.leave()?;
        let result = run();
        enable_raw_mode()?;
        self.terminal.backend_mut().execute(EnterAlternateScreen)?;
        self.terminal.clear()?;
        self.terminal.hide_cursor()?;
        result
    }

    fn read_key(&mut self) -> Result<Option<KeyEvent>> {
        loop {
            match event::read().context("terminal: read event")? {
                Event::Key(key) if key.kind == KeyEventKind::Press => return Ok(Some(key)),
                Event::Resize(..) => {
                    self.terminal.autoresize()?;
                    return Ok(None);
                }
                _ => {}
            }
        }
    }

    fn overlay(&mut self, render: impl FnOnce(&mut Frame<'_>)) -> Result<()> {
        if self.stale.swap(false, Ordering::SeqCst) {
            self.terminal.clear()?;
        }
        draw_over(&mut self.terminal, &self.backdrop, render)?;
        Ok(())
    }
}

impl Drop for Term {
    fn drop(&mut self) {
        if let Err(err) = self.leave() {
            warn!("terminal restore failed: {err:#}");
        }
    }
}

impl Ui for Term {
    fn draw(&mut self, render: &mut dyn FnMut(&mut Frame<'_>)) -> Result<()> {
        if self.stale.swap(false, Ordering::SeqCst) {
            self.terminal.clear()?;
        }
        let completed = self.terminal.draw(|frame| render(frame))?;
        self.backdrop = completed.buffer.clone();
        Ok(())
    }

    fn next_key(&mut self) -> Result<Option<KeyEvent>> {
        self.read_key()
    }

    fn flash(&mut self) -> Result<()> {
        let backend = self.terminal.backend_mut();
        backend.write_all(b"\x07")?;
        io::Write::flush(backend)?;
        Ok(())
    }

    fn notify(&mut self, message: &str) -> Result<KeyEvent> {
        loop {
            self.overlay(|frame| render_message(frame, message))?;
            if let Some(key) = self.read_key()? {
                // the next page draw paints over the message
                return Ok(key);
            }
        }
    }

    fn prompt(&mut self, label: &str) -> Result<Option<String>> {
        let mut input = LineInput::default();
        self.terminal.show_cursor()?;
        let result = loop {
            self.overlay(|frame| render_prompt(frame, label, &input))?;
            let Some(key) = self.read_key()? else {
                continue;
            };
            match input.handle(key) {
                InputStatus::Pending => {}
                InputStatus::Done(text) => break Some(text).filter(|text| !text.is_empty()),
                InputStatus::Cancelled => break None,
            }
        };
        self.terminal.hide_cursor()?;
        Ok(result)
    }

    fn edit(&mut self, text: &str) -> Result<Option<String>> {
        let mut file = tempfile::Builder::new()
            .prefix("rtv_")
            .suffix(".txt")
            .tempfile()
            .context("terminal: create editor file")?;
        file.write_all(text.as_bytes())?;
        file.flush()?;
        let path = file.path().to_path_buf();
        let command = editor_command(self.editor.as_deref());
        debug!(?command, "launching editor");

        let status = self.suspend(|| {
            let Some((program, args)) = command.split_first() else {
                bail!("terminal: empty editor command");
            };
            Command::new(program)
                .args(args)
                .arg(&path)
                .status()
                .with_context(|| format!("terminal: could not open editor {}", program))
        })?;
        if !status.success() {
            bail!("terminal: editor exited with {}", status);
        }
        let edited = fs::read_to_string(&path).context("terminal: read editor file")?;
        let stripped = strip_instructions(&edited);
        Ok(Some(stripped).filter(|text| !text.is_empty()))
    }

    fn open_browser(&mut self, url: &str) -> Result<()> {
        debug!(%url, "opening browser");
        webbrowser::open(url).with_context(|| format!("terminal: could not open {}", url))?;
        self.stale.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn loading_surface(&mut self) -> Box<dyn Surface> {
        Box::new(LoadingSurface {
            ascii: *self.glyphs == Glyphs::ASCII,
            stale: self.stale.clone(),
            interrupted: false,
        })
    }

    fn glyphs(&self) -> &'static Glyphs {
        self.glyphs
    }
}

/// Paints the loading box straight to stdout from the animator thread.
struct LoadingSurface {
    ascii: bool,
    stale: Arc<AtomicBool>,
    interrupted: bool,
}

impl Surface for LoadingSurface {
    fn draw(&mut self, text: &str) -> io::Result<()> {
        let (cols, rows) = term::size()?;
        let inner = UnicodeWidthStr::width(text) as u16;
        let width = inner + 4;
        if cols < width || rows < 3 {
            return Ok(());
        }
        let x = (cols - width) / 2;
        let y = (rows - 3) / 2;
        let (h, v, tl, tr, bl, br) = if self.ascii {
            ("-", "|", "+", "+", "+", "+")
        } else {
            ("─", "│", "┌", "┐", "└", "┘")
        };
        let edge = h.repeat(width as usize - 2);
        let mut out = io::stdout();
        queue!(
            out,
            MoveTo(x, y),
            Print(format!("{tl}{edge}{tr}")),
            MoveTo(x, y + 1),
            Print(format!("{v} {text} {v}")),
            MoveTo(x, y + 2),
            Print(format!("{bl}{edge}{br}")),
        )?;
        out.flush()?;
        self.stale.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        self.stale.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn interrupted(&mut self) -> bool {
        while let Ok(true) = event::poll(Duration::ZERO) {
            match event::read() {
                Ok(Event::Key(key)) if is_interrupt(&key) => self.interrupted = true,
                Ok(Event::Resize(..)) => self.stale.store(true, Ordering::SeqCst),
                Ok(_) => {}
                Err(_) => break,
            }
        }
        self.interrupted
    }
}

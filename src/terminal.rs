// SPDX-License-Identifier: GPL-3.0-only

//! Terminal viewer
//!
//! Renders the newest presented frame to the terminal using Unicode
//! half-block characters for improved vertical resolution, and feeds the
//! user's key presses back into the transform parameters.

use crate::constants::transform::ALPHA_STEP;
use crate::constants::viewer::{FPS_WINDOW, INPUT_POLL};
use crate::errors::{AppError, AppResult};
use crate::invariant::PipelineVariant;
use crate::pipelines::{FrameCounts, PresentedFrame, PresentedReceiver};
use crate::session::{RenderBackend, Session};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    widgets::Widget,
};
use std::io::{self, stdout};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// Where frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Camera,
    Still,
}

impl SourceMode {
    fn label(&self) -> &'static str {
        match self {
            SourceMode::Camera => "camera",
            SourceMode::Still => "still",
        }
    }
}

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Quit,
    ToggleInvariance,
    AdjustAlpha(f32),
    ToggleSource,
    Save,
    ToggleHelp,
}

/// Map a key press to a command
pub fn command_for(key: &KeyEvent) -> Option<Command> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Command::Quit);
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(Command::Quit),
        KeyCode::Char('i') => Some(Command::ToggleInvariance),
        KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Up | KeyCode::Right => {
            Some(Command::AdjustAlpha(ALPHA_STEP))
        }
        KeyCode::Char('-') | KeyCode::Down | KeyCode::Left => {
            Some(Command::AdjustAlpha(-ALPHA_STEP))
        }
        KeyCode::Char('c') => Some(Command::ToggleSource),
        KeyCode::Char('s') => Some(Command::Save),
        KeyCode::Char('h') => Some(Command::ToggleHelp),
        _ => None,
    }
}

/// Run the terminal viewer until the user quits
pub fn run(session: Session, start_live: bool) -> AppResult<()> {
    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let mut viewer = Viewer::new(session);
    viewer.start(start_live);
    let result = viewer.run_loop(&mut terminal);
    drop(viewer);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

struct Viewer {
    session: Session,
    presented: PresentedReceiver,
    frame_widget: FrameWidget,
    mode: SourceMode,
    show_help: bool,
    notice: Option<String>,
    fps: FpsCounter,
}

impl Viewer {
    fn new(session: Session) -> Self {
        Self {
            presented: session.presented(),
            session,
            frame_widget: FrameWidget::new(),
            mode: SourceMode::Still,
            show_help: false,
            notice: None,
            fps: FpsCounter::new(),
        }
    }

    fn start(&mut self, live: bool) {
        if live {
            self.enter_camera_mode();
        } else {
            self.enter_still_mode();
        }
    }

    fn enter_camera_mode(&mut self) {
        match self.session.start_live() {
            Ok(()) => {
                self.mode = SourceMode::Camera;
                self.notice = None;
            }
            Err(e) => {
                warn!(error = %e, "Camera unavailable, showing still image");
                self.notice = Some(format!("Camera unavailable: {}", e));
                self.enter_still_mode();
            }
        }
    }

    fn enter_still_mode(&mut self) {
        self.session.stop_live();
        self.mode = SourceMode::Still;
        self.session.submit_still();
    }

    fn run_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> AppResult<()> {
        loop {
            if self.mode == SourceMode::Camera && !self.session.is_live() {
                warn!("Capture thread exited, showing still image");
                self.enter_still_mode();
                self.notice = Some("Camera stopped".to_string());
            }

            // Take the newest frame, skipping any we missed
            if self.presented.has_changed().unwrap_or(false) {
                let latest = self.presented.borrow_and_update().clone();
                if let Some(frame) = latest {
                    self.fps.tick();
                    self.frame_widget.update_frame(frame);
                }
            }

            let status = self.status_line();
            terminal.draw(|f| {
                let area = f.area();

                // Reserve bottom line for status
                let frame_area = Rect {
                    x: area.x,
                    y: area.y,
                    width: area.width,
                    height: area.height.saturating_sub(1),
                };
                f.render_widget(&self.frame_widget, frame_area);

                let status_area = Rect {
                    x: area.x,
                    y: area.height.saturating_sub(1),
                    width: area.width,
                    height: 1,
                };
                f.render_widget(StatusBar { message: &status }, status_area);
            })?;

            // Handle input with timeout for frame updates
            if event::poll(INPUT_POLL)?
                && let Event::Key(key) = event::read()?
                && let Some(command) = command_for(&key)
                && !self.apply(command)
            {
                break;
            }
        }

        Ok(())
    }

    /// Apply a command; false means quit
    fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::Quit => return false,
            Command::ToggleHelp => {
                self.show_help = !self.show_help;
                return true;
            }
            Command::ToggleInvariance => {
                let enabled = self.session.params().toggle_invariance();
                info!(enabled, "Invariance toggled");
                self.notice = None;
            }
            Command::AdjustAlpha(delta) => {
                let alpha = self.session.params().adjust_alpha(delta);
                info!(alpha, "Alpha adjusted");
                self.notice = None;
            }
            Command::ToggleSource => {
                match self.mode {
                    SourceMode::Camera => self.enter_still_mode(),
                    SourceMode::Still => self.enter_camera_mode(),
                }
                return true;
            }
            Command::Save => {
                self.notice = Some(match &self.frame_widget.frame {
                    Some(frame) => match save_frame(frame, &capture_directory()) {
                        Ok(path) => format!("Saved: {}", path.display()),
                        Err(e) => {
                            error!("Failed to save frame: {}", e);
                            format!("Error: {}", e)
                        }
                    },
                    None => "Nothing to save yet".to_string(),
                });
                return true;
            }
        }

        // Live frames pick the change up on their own
        if self.mode == SourceMode::Still {
            self.session.submit_still();
        }
        true
    }

    fn status_line(&self) -> String {
        if self.show_help {
            return help_message();
        }
        if let Some(notice) = &self.notice {
            return notice.clone();
        }
        let params = self.session.params().snapshot();
        status_message(
            self.mode,
            self.session.backend(),
            params.variant(),
            params.alpha,
            self.session.counts(),
            self.fps.rate(),
        )
    }
}

fn status_message(
    mode: SourceMode,
    backend: RenderBackend,
    variant: PipelineVariant,
    alpha: f32,
    counts: FrameCounts,
    fps: f64,
) -> String {
    format!(
        "{} | {} {} | alpha {:.2} | {:.0} fps | shown {} dropped {} failed {} | 'h' help",
        mode.label(),
        backend,
        variant,
        alpha,
        fps,
        counts.presented,
        counts.dropped,
        counts.failed
    )
}

fn help_message() -> String {
    "i: Toggle invariance | +/-: Alpha | c: Camera/still | s: Save | h: Toggle help | q/Ctrl+C: Quit"
        .to_string()
}

/// Directory frames are saved to
fn capture_directory() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::constants::config_file::APP_DIR)
}

/// Save a presented frame as a timestamped PNG
pub fn save_frame(frame: &PresentedFrame, dir: &Path) -> AppResult<PathBuf> {
    let img = frame
        .to_image()
        .ok_or_else(|| AppError::Image("Frame buffer does not match its size".into()))?;

    std::fs::create_dir_all(dir)?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let filename = format!("IMG_{}_{}.png", timestamp, frame.sequence);
    let filepath = dir.join(&filename);

    img.save(&filepath)?;
    info!(path = %filepath.display(), "Frame saved");

    Ok(filepath)
}

/// Presented frames per second over a sliding window
struct FpsCounter {
    window_start: Instant,
    frames: u32,
    rate: f64,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            rate: 0.0,
        }
    }

    fn tick(&mut self) {
        self.frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= FPS_WINDOW {
            self.rate = self.frames as f64 / elapsed.as_secs_f64();
            self.frames = 0;
            self.window_start = Instant::now();
        }
    }

    fn rate(&self) -> f64 {
        self.rate
    }
}

/// Widget that renders a frame using half-block characters
struct FrameWidget {
    frame: Option<PresentedFrame>,
}

impl FrameWidget {
    fn new() -> Self {
        Self { frame: None }
    }

    fn update_frame(&mut self, frame: PresentedFrame) {
        self.frame = Some(frame);
    }
}

impl Widget for &FrameWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = self.frame.as_ref().filter(|f| f.width > 0 && f.height > 0) else {
            // No frame yet - show placeholder
            let msg = "Waiting for frames...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, ratatui::style::Style::default());
            }
            return;
        };

        // Each terminal cell displays 2 vertical pixels using half-block characters
        let frame_aspect = frame.width as f64 / frame.height as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64;

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            // Terminal is wider - fit to height
            let h = term_height;
            let w = h * frame_aspect;
            (w as u16, (h / 2.0) as u16)
        } else {
            // Terminal is taller - fit to width
            let w = term_width;
            let h = w / frame_aspect;
            (w as u16, (h / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        // Center the image
        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        let x_scale = frame.width as f64 / display_width as f64;
        let y_scale = frame.height as f64 / (display_height * 2) as f64;

        for ty in 0..display_height {
            for tx in 0..display_width {
                let term_x = x_offset + tx;
                let term_y = y_offset + ty;

                if term_x >= area.x + area.width || term_y >= area.y + area.height {
                    continue;
                }

                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                if let Some(cell) = buf.cell_mut((term_x, term_y)) {
                    cell.set_char('▀');
                    cell.set_fg(sample_pixel(frame, src_x, src_y_top));
                    cell.set_bg(sample_pixel(frame, src_x, src_y_bottom));
                }
            }
        }
    }
}

fn sample_pixel(frame: &PresentedFrame, x: u32, y: u32) -> Color {
    let x = x.min(frame.width - 1);
    let y = y.min(frame.height - 1);
    match frame.pixel(x, y) {
        Some([r, g, b, _]) => Color::Rgb(r, g, b),
        None => Color::Black,
    }
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Fill background
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();

        buf.set_string(
            area.x,
            area.y,
            text,
            ratatui::style::Style::default()
                .fg(Color::White)
                .bg(Color::DarkGray),
        );
    }
}

// crates/kryon-ratatui/src/lib.rs

use std::io::{self, Stdout};
use std::time::Duration;

use crossterm::{
    event::{self, Event as CrosstermEvent, KeyCode, MouseButton, MouseEventKind},
    execute,
    terminal::{enable_raw_mode, EnterAlternateScreen},
};
use glam::{Vec2, Vec4};
use kryon_core::ResourceEntry;
use kryon_render::{
    InputEvent, Key, PointerButton, RenderBackend, RenderError, RenderResult, TextureHandle,
    WindowConfig,
};
use ratatui::{
    backend::{Backend, CrosstermBackend, TestBackend},
    layout::{Alignment, Rect},
    style::{Color, Style},
    widgets::{Block, Clear, Paragraph},
    Frame, Terminal,
};

const CHAR_ASPECT: f32 = 0.6;

/// What a terminal target needs beyond being a ratatui backend: how to
/// bring itself up and whether it has real input to poll. The stdout
/// surface owns raw mode and the alternate screen; the in-memory test
/// surface does neither.
pub trait TerminalSurface: Backend + Sized {
    fn create() -> RenderResult<Self>;

    fn poll_input(&mut self) -> RenderResult<Vec<CrosstermEvent>> {
        Ok(Vec::new())
    }
}

impl TerminalSurface for CrosstermBackend<Stdout> {
    fn create() -> RenderResult<Self> {
        enable_raw_mode().map_err(|e| RenderError::InitializationFailed(e.to_string()))?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;
        Ok(CrosstermBackend::new(stdout))
    }

    fn poll_input(&mut self) -> RenderResult<Vec<CrosstermEvent>> {
        let mut events = Vec::new();
        while event::poll(Duration::ZERO)
            .map_err(|e| RenderError::RenderFailed(e.to_string()))?
        {
            events.push(event::read().map_err(|e| RenderError::RenderFailed(e.to_string()))?);
        }
        Ok(events)
    }
}

impl TerminalSurface for TestBackend {
    fn create() -> RenderResult<Self> {
        Ok(TestBackend::new(80, 24))
    }
}

/// One buffered paint operation in source-canvas pixels; translation to
/// character cells happens at frame end.
#[derive(Debug, Clone)]
enum PaintOp {
    Rect {
        position: Vec2,
        size: Vec2,
        color: Vec4,
    },
    Text {
        position: Vec2,
        text: String,
        color: Vec4,
    },
}

/// Terminal renderer: buffers the engine's pixel-space draw calls and maps
/// them onto the character grid relative to the app's canvas size.
pub struct RatatuiBackend<B: Backend> {
    terminal: Terminal<B>,
    canvas_size: Vec2,
    clear_color: Vec4,
    ops: Vec<PaintOp>,
    scissors: Vec<(Vec2, Vec2)>,
    closed: bool,
}

impl<B: Backend> RatatuiBackend<B> {
    pub fn terminal(&self) -> &Terminal<B> {
        &self.terminal
    }

    fn clipped(&self, position: Vec2, size: Vec2) -> Option<(Vec2, Vec2)> {
        let Some(&(clip_pos, clip_size)) = self.scissors.last() else {
            return Some((position, size));
        };
        let x0 = position.x.max(clip_pos.x);
        let y0 = position.y.max(clip_pos.y);
        let x1 = (position.x + size.x).min(clip_pos.x + clip_size.x);
        let y1 = (position.y + size.y).min(clip_pos.y + clip_size.y);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((Vec2::new(x0, y0), Vec2::new(x1 - x0, y1 - y0)))
    }
}

impl<B: TerminalSurface> RenderBackend for RatatuiBackend<B> {
    fn initialize(config: &WindowConfig) -> RenderResult<Self> {
        let surface = B::create()?;
        let terminal =
            Terminal::new(surface).map_err(|e| RenderError::InitializationFailed(e.to_string()))?;
        Ok(Self {
            terminal,
            canvas_size: Vec2::new(config.width.max(1.0), config.height.max(1.0)),
            clear_color: config.clear_color,
            ops: Vec::new(),
            scissors: Vec::new(),
            closed: false,
        })
    }

    fn viewport_size(&self) -> Vec2 {
        // Layout runs in source-canvas pixels; the cell grid is only a
        // presentation concern.
        self.canvas_size
    }

    fn measure_text(&self, text: &str, font_size: f32) -> Vec2 {
        Vec2::new(
            text.chars().count() as f32 * font_size * CHAR_ASPECT,
            font_size,
        )
    }

    fn load_texture(
        &mut self,
        entry: &ResourceEntry,
        strings: &[String],
    ) -> RenderResult<TextureHandle> {
        let name = strings
            .get(entry.name_index as usize)
            .map(String::as_str)
            .unwrap_or("<unnamed>");
        Err(RenderError::TextureLoadFailed(format!(
            "terminal backend cannot rasterize textures ({name})"
        )))
    }

    fn begin_frame(&mut self, clear_color: Vec4) -> RenderResult<()> {
        self.ops.clear();
        self.scissors.clear();
        if clear_color.w > 0.0 {
            self.clear_color = clear_color;
        }
        Ok(())
    }

    fn end_frame(&mut self) -> RenderResult<()> {
        let canvas = self.canvas_size;
        let clear = self.clear_color;
        let ops = std::mem::take(&mut self.ops);
        self.terminal
            .draw(|frame| paint_frame(frame, &ops, canvas, clear))
            .map_err(|e| RenderError::RenderFailed(e.to_string()))?;
        Ok(())
    }

    fn draw_rect(&mut self, position: Vec2, size: Vec2, color: Vec4) {
        if let Some((position, size)) = self.clipped(position, size) {
            self.ops.push(PaintOp::Rect {
                position,
                size,
                color,
            });
        }
    }

    fn draw_text(&mut self, text: &str, position: Vec2, font_size: f32, color: Vec4) {
        let size = self.measure_text(text, font_size);
        if self.clipped(position, size).is_some() {
            self.ops.push(PaintOp::Text {
                position,
                text: text.to_string(),
                color,
            });
        }
    }

    fn draw_texture(&mut self, _handle: TextureHandle, position: Vec2, size: Vec2) {
        // Stand-in glyph block; the terminal has no pixels to give.
        if let Some((position, size)) = self.clipped(position, size) {
            self.ops.push(PaintOp::Rect {
                position,
                size,
                color: Vec4::new(0.5, 0.5, 0.5, 1.0),
            });
        }
    }

    fn push_scissor(&mut self, position: Vec2, size: Vec2) {
        let clipped = self.clipped(position, size).unwrap_or((position, Vec2::ZERO));
        self.scissors.push(clipped);
    }

    fn pop_scissor(&mut self) {
        self.scissors.pop();
    }

    fn poll_events(&mut self) -> Vec<InputEvent> {
        let canvas = self.canvas_size;
        let grid = self
            .terminal
            .size()
            .map(|r| Vec2::new(r.width.max(1) as f32, r.height.max(1) as f32))
            .unwrap_or(Vec2::new(80.0, 24.0));

        let raw = match self.terminal.backend_mut().poll_input() {
            Ok(events) => events,
            Err(_) => return Vec::new(),
        };

        let cell_to_canvas = |column: u16, row: u16| {
            Vec2::new(
                column as f32 / grid.x * canvas.x,
                row as f32 / grid.y * canvas.y,
            )
        };

        let mut events = Vec::new();
        for event in raw {
            match event {
                CrosstermEvent::Key(key) => match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        self.closed = true;
                        events.push(InputEvent::CloseRequested);
                    }
                    KeyCode::Enter => events.push(InputEvent::KeyDown { key: Key::Enter }),
                    KeyCode::Tab => events.push(InputEvent::KeyDown { key: Key::Tab }),
                    KeyCode::Backspace => {
                        events.push(InputEvent::KeyDown { key: Key::Backspace })
                    }
                    KeyCode::Char(c) => events.push(InputEvent::KeyDown { key: Key::Char(c) }),
                    _ => {}
                },
                CrosstermEvent::Mouse(mouse) => {
                    let position = cell_to_canvas(mouse.column, mouse.row);
                    match mouse.kind {
                        MouseEventKind::Down(button) => events.push(InputEvent::PointerDown {
                            position,
                            button: map_button(button),
                        }),
                        MouseEventKind::Up(button) => events.push(InputEvent::PointerUp {
                            position,
                            button: map_button(button),
                        }),
                        MouseEventKind::Moved => {
                            events.push(InputEvent::PointerMove { position })
                        }
                        _ => {}
                    }
                }
                CrosstermEvent::Resize(..) => {
                    // The canvas is virtual; a terminal resize only changes
                    // the projection, which the next draw picks up.
                }
                _ => {}
            }
        }
        events
    }

    fn should_close(&self) -> bool {
        self.closed
    }
}

fn map_button(button: MouseButton) -> PointerButton {
    match button {
        MouseButton::Left => PointerButton::Primary,
        MouseButton::Right => PointerButton::Secondary,
        MouseButton::Middle => PointerButton::Middle,
    }
}

/// Projects a canvas-space rectangle onto the character grid. Returns
/// nothing when the projection has no drawable cells.
fn translate_rect(position: Vec2, size: Vec2, canvas: Vec2, area: Rect) -> Option<Rect> {
    if canvas.x <= 0.0 || canvas.y <= 0.0 {
        return None;
    }

    let rel_x = position.x / canvas.x;
    let rel_y = position.y / canvas.y;
    let rel_w = size.x / canvas.x;
    let rel_h = size.y / canvas.y;

    let term_x = (rel_x * area.width as f32).floor().max(0.0) as u16;
    let term_y = (rel_y * area.height as f32).floor().max(0.0) as u16;
    let term_w = (rel_w * area.width as f32).ceil() as u16;
    let term_h = (rel_h * area.height as f32).ceil() as u16;

    let x = term_x.min(area.right());
    let y = term_y.min(area.bottom());
    let w = term_w.min(area.width.saturating_sub(x));
    let h = term_h.min(area.height.saturating_sub(y));

    let rect = Rect::new(x, y, w, h);
    (rect.width > 0 && rect.height > 0).then_some(rect)
}

fn paint_frame(frame: &mut Frame, ops: &[PaintOp], canvas: Vec2, clear: Vec4) {
    let area = frame.size();
    if clear.w > 0.0 {
        frame.render_widget(
            Block::default().style(Style::default().bg(vec4_to_color(clear))),
            area,
        );
    }

    for op in ops {
        match op {
            PaintOp::Rect {
                position,
                size,
                color,
            } => {
                if color.w < 0.1 {
                    continue;
                }
                if let Some(rect) = translate_rect(*position, *size, canvas, area) {
                    frame.render_widget(Clear, rect);
                    frame.render_widget(
                        Block::default().style(Style::default().bg(vec4_to_color(*color))),
                        rect,
                    );
                }
            }
            PaintOp::Text {
                position,
                text,
                color,
            } => {
                if color.w < 0.1 {
                    continue;
                }
                // One text line is one cell row.
                let size = Vec2::new(
                    text.chars().count() as f32 / area.width.max(1) as f32 * canvas.x,
                    canvas.y / area.height.max(1) as f32,
                );
                if let Some(rect) = translate_rect(*position, size, canvas, area) {
                    frame.render_widget(
                        Paragraph::new(text.as_str())
                            .style(Style::default().fg(vec4_to_color(*color)))
                            .alignment(Alignment::Left),
                        rect,
                    );
                }
            }
        }
    }
}

fn vec4_to_color(color: Vec4) -> Color {
    if color.w < 0.1 {
        return Color::Reset;
    }
    Color::Rgb(
        (color.x * 255.0) as u8,
        (color.y * 255.0) as u8,
        (color.z * 255.0) as u8,
    )
}

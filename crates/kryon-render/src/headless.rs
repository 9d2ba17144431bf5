// crates/kryon-render/src/headless.rs
use crate::{InputEvent, RenderBackend, RenderResult, TextureHandle, WindowConfig};
use glam::{Vec2, Vec4};
use kryon_core::{ResourceEntry, ResourcePayload};
use kryon_layout::{MonospaceTextMeasure, TextMeasure};

/// Everything a frame asked the backend to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    Rect {
        position: Vec2,
        size: Vec2,
        color: Vec4,
    },
    Text {
        text: String,
        position: Vec2,
        font_size: f32,
        color: Vec4,
    },
    Texture {
        id: u32,
        position: Vec2,
        size: Vec2,
    },
    PushScissor {
        position: Vec2,
        size: Vec2,
    },
    PopScissor,
}

/// A recording backend: fixed viewport, deterministic monospace metrics,
/// and a draw-call log instead of pixels. Integration tests assert against
/// the log; embedders can use it to diff frames.
pub struct HeadlessBackend {
    viewport: Vec2,
    measure: MonospaceTextMeasure,
    pub calls: Vec<DrawCall>,
    pub frames_rendered: u32,
    pub last_clear_color: Vec4,
    queued_events: Vec<InputEvent>,
    next_texture: u32,
    closed: bool,
}

impl HeadlessBackend {
    /// Queue an input event for the next `poll_events` call.
    pub fn push_event(&mut self, event: InputEvent) {
        self.queued_events.push(event);
    }

    pub fn request_close(&mut self) {
        self.closed = true;
    }
}

impl RenderBackend for HeadlessBackend {
    fn initialize(config: &WindowConfig) -> RenderResult<Self> {
        Ok(Self {
            viewport: Vec2::new(config.width, config.height),
            measure: MonospaceTextMeasure::default(),
            calls: Vec::new(),
            frames_rendered: 0,
            last_clear_color: Vec4::ZERO,
            queued_events: Vec::new(),
            next_texture: 1,
            closed: false,
        })
    }

    fn viewport_size(&self) -> Vec2 {
        self.viewport
    }

    fn measure_text(&self, text: &str, font_size: f32) -> Vec2 {
        self.measure.measure_text(text, font_size)
    }

    fn load_texture(
        &mut self,
        entry: &ResourceEntry,
        _strings: &[String],
    ) -> RenderResult<TextureHandle> {
        // No decoder here; inline payloads get a nominal size derived from
        // their length so intrinsic-size paths stay exercisable.
        let size = match &entry.payload {
            ResourcePayload::Inline { data } => {
                let side = (data.len() as f32).sqrt().ceil().max(1.0);
                Vec2::new(side, side)
            }
            ResourcePayload::External { .. } => Vec2::new(64.0, 64.0),
        };
        let handle = TextureHandle {
            id: self.next_texture,
            size,
        };
        self.next_texture += 1;
        Ok(handle)
    }

    fn begin_frame(&mut self, clear_color: Vec4) -> RenderResult<()> {
        self.calls.clear();
        self.last_clear_color = clear_color;
        Ok(())
    }

    fn end_frame(&mut self) -> RenderResult<()> {
        self.frames_rendered += 1;
        Ok(())
    }

    fn draw_rect(&mut self, position: Vec2, size: Vec2, color: Vec4) {
        self.calls.push(DrawCall::Rect {
            position,
            size,
            color,
        });
    }

    fn draw_text(&mut self, text: &str, position: Vec2, font_size: f32, color: Vec4) {
        self.calls.push(DrawCall::Text {
            text: text.to_string(),
            position,
            font_size,
            color,
        });
    }

    fn draw_texture(&mut self, handle: TextureHandle, position: Vec2, size: Vec2) {
        self.calls.push(DrawCall::Texture {
            id: handle.id,
            position,
            size,
        });
    }

    fn push_scissor(&mut self, position: Vec2, size: Vec2) {
        self.calls.push(DrawCall::PushScissor { position, size });
    }

    fn pop_scissor(&mut self) {
        self.calls.push(DrawCall::PopScissor);
    }

    fn poll_events(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut self.queued_events)
    }

    fn should_close(&self) -> bool {
        self.closed
    }
}

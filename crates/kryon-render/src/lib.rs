// crates/kryon-render/src/lib.rs

use glam::{Vec2, Vec4};
use kryon_core::ResourceEntry;
use kryon_layout::TextMeasure;

pub mod events;
pub mod frame;
pub mod headless;

pub use events::*;
pub use frame::*;
pub use headless::*;

/// Opaque backend texture binding plus pixel dimensions.
pub use kryon_core::TextureRef as TextureHandle;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),
    #[error("Render operation failed: {0}")]
    RenderFailed(String),
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),
    #[error("Texture load failed: {0}")]
    TextureLoadFailed(String),
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// Window parameters assembled from the App element's properties.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowConfig {
    pub title: String,
    pub width: f32,
    pub height: f32,
    pub resizable: bool,
    pub scale_factor: f32,
    pub clear_color: Vec4,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Kryon".to_string(),
            width: 800.0,
            height: 600.0,
            resizable: true,
            scale_factor: 1.0,
            clear_color: Vec4::new(0.1, 0.1, 0.1, 1.0),
        }
    }
}

/// The capability set every renderer backend provides. The engine drives
/// this interface exclusively; no concrete backend is ever named outside
/// its own crate.
pub trait RenderBackend {
    fn initialize(config: &WindowConfig) -> RenderResult<Self>
    where
        Self: Sized;

    fn viewport_size(&self) -> Vec2;

    /// Single-line measurement; no shaping beyond advance widths.
    fn measure_text(&self, text: &str, font_size: f32) -> Vec2;

    /// Decodes a resource into a backend texture. `strings` resolves
    /// external path references.
    fn load_texture(
        &mut self,
        entry: &ResourceEntry,
        strings: &[String],
    ) -> RenderResult<TextureHandle>;

    fn begin_frame(&mut self, clear_color: Vec4) -> RenderResult<()>;
    fn end_frame(&mut self) -> RenderResult<()>;

    fn draw_rect(&mut self, position: Vec2, size: Vec2, color: Vec4);
    fn draw_text(&mut self, text: &str, position: Vec2, font_size: f32, color: Vec4);
    fn draw_texture(&mut self, handle: TextureHandle, position: Vec2, size: Vec2);

    fn push_scissor(&mut self, position: Vec2, size: Vec2);
    fn pop_scissor(&mut self);

    fn poll_events(&mut self) -> Vec<InputEvent>;
    fn should_close(&self) -> bool;
}

/// Adapts a backend's text measurement to the layout engine's seam.
pub struct BackendTextMeasure<'a, B: RenderBackend>(pub &'a B);

impl<'a, B: RenderBackend> TextMeasure for BackendTextMeasure<'a, B> {
    fn measure_text(&self, text: &str, font_size: f32) -> Vec2 {
        self.0.measure_text(text, font_size)
    }
}

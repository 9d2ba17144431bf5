// crates/kryon-layout/src/lib.rs

use glam::Vec2;

pub mod engine;
pub mod flex;

pub use engine::LayoutEngine;
pub use flex::{LayoutAlignment, LayoutDirection, LayoutFlags};

/// Caller-supplied single-line text measurement. Backends implement this
/// (or adapt to it) so the layout engine never names a concrete renderer.
pub trait TextMeasure {
    fn measure_text(&self, text: &str, font_size: f32) -> Vec2;
}

/// Fixed-advance measurement: every glyph is `aspect * font_size` wide and
/// one line is `font_size` tall. Deterministic, so tests and headless runs
/// produce stable geometry.
#[derive(Debug, Clone, Copy)]
pub struct MonospaceTextMeasure {
    pub aspect: f32,
}

impl Default for MonospaceTextMeasure {
    fn default() -> Self {
        Self { aspect: 0.6 }
    }
}

impl TextMeasure for MonospaceTextMeasure {
    fn measure_text(&self, text: &str, font_size: f32) -> Vec2 {
        Vec2::new(
            text.chars().count() as f32 * font_size * self.aspect,
            font_size,
        )
    }
}

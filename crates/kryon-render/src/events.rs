// crates/kryon-render/src/events.rs
use glam::Vec2;

/// Backend-neutral input. Backends translate their native events into
/// these; the runtime hit-tests them against computed geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerMove { position: Vec2 },
    PointerDown { position: Vec2, button: PointerButton },
    PointerUp { position: Vec2, button: PointerButton },
    KeyDown { key: Key },
    Resize { size: Vec2 },
    CloseRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
    Tab,
    Backspace,
    Char(char),
}

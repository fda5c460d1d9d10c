//! Contracts for the collaborators the core drives but does not implement.

use crate::control::Appearance;
use crate::record::{StartRequest, StopRequest};

/// Outbound command channel to the agent. Calls are fire-and-forget: the
/// outcome never feeds back into roster state.
pub trait CommandTransport {
    fn start(&self, request: StartRequest);
    fn stop(&self, request: StopRequest);
}

/// Free-text args field attached to a control, read at click time.
pub trait InputCapture {
    fn args_for(&self, id: u32) -> Option<String>;
}

pub trait ControlRenderer {
    fn prepare_canvas(&mut self, size: CanvasSize);
    fn create_control(&mut self, directive: &ControlDirective);
    fn update_control(&mut self, id: u32, appearance: Appearance);
    fn set_pressed(&mut self, id: u32, pressed: bool);
}

pub trait TooltipSink {
    fn show(&mut self, text: &str);
    fn hide(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlRect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl ControlRect {
    pub fn contains(&self, x: u16, y: u16) -> bool {
        x >= self.x
            && y >= self.y
            && u32::from(x) < u32::from(self.x) + u32::from(self.width)
            && u32::from(y) < u32::from(self.y) + u32::from(self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanvasSize {
    pub width: u16,
    pub height: u16,
}

/// Everything a renderer needs to create one control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlDirective {
    pub id: u32,
    pub name: String,
    pub rect: ControlRect,
    pub appearance: Appearance,
    pub tooltip: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlInput {
    PointerDown,
    PointerUp,
    Click,
    HoverEnter,
    HoverLeave,
}

/// Input event raised by the renderer, tagged with the control's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: ControlInput,
    pub id: u32,
    pub name: String,
}

impl InputEvent {
    pub fn new(kind: ControlInput, id: u32, name: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_contains_is_half_open() {
        let rect = ControlRect {
            x: 2,
            y: 2,
            width: 10,
            height: 4,
        };
        assert!(rect.contains(2, 2));
        assert!(rect.contains(11, 5));
        assert!(!rect.contains(12, 5));
        assert!(!rect.contains(11, 6));
        assert!(!rect.contains(1, 3));
    }

    #[test]
    fn rect_contains_does_not_overflow_at_edges() {
        let rect = ControlRect {
            x: u16::MAX - 1,
            y: 0,
            width: 10,
            height: 1,
        };
        assert!(rect.contains(u16::MAX, 0));
    }
}

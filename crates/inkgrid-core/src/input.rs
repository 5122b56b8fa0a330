//! Pointer events and interaction modes.

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Pointer event in screen coordinates.
///
/// Serialized as `{"type": "down", "x": 10.0, "y": 10.0}` so gesture scripts
/// stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPointerEvent", into = "RawPointerEvent")]
pub enum PointerEvent {
    Down { position: Point },
    Move { position: Point },
    Up { position: Point },
}

impl PointerEvent {
    pub fn position(&self) -> Point {
        match *self {
            PointerEvent::Down { position }
            | PointerEvent::Move { position }
            | PointerEvent::Up { position } => position,
        }
    }

    pub fn down(x: f64, y: f64) -> Self {
        PointerEvent::Down {
            position: Point::new(x, y),
        }
    }

    pub fn moved(x: f64, y: f64) -> Self {
        PointerEvent::Move {
            position: Point::new(x, y),
        }
    }

    pub fn up(x: f64, y: f64) -> Self {
        PointerEvent::Up {
            position: Point::new(x, y),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Phase {
    Down,
    Move,
    Up,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawPointerEvent {
    #[serde(rename = "type")]
    phase: Phase,
    x: f64,
    y: f64,
}

impl From<RawPointerEvent> for PointerEvent {
    fn from(raw: RawPointerEvent) -> Self {
        let position = Point::new(raw.x, raw.y);
        match raw.phase {
            Phase::Down => PointerEvent::Down { position },
            Phase::Move => PointerEvent::Move { position },
            Phase::Up => PointerEvent::Up { position },
        }
    }
}

impl From<PointerEvent> for RawPointerEvent {
    fn from(event: PointerEvent) -> Self {
        let phase = match event {
            PointerEvent::Down { .. } => Phase::Down,
            PointerEvent::Move { .. } => Phase::Move,
            PointerEvent::Up { .. } => Phase::Up,
        };
        let position = event.position();
        RawPointerEvent {
            phase,
            x: position.x,
            y: position.y,
        }
    }
}

/// What pointer input does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    /// Strokes with the selected brush.
    #[default]
    Drawing,
    /// Drags pan the canvas.
    Navigating,
    /// Strokes with the eraser.
    Erasing,
}

//! Replayable input scripts.
//!
//! A script is a JSON array of steps:
//! ```json
//! [
//!   { "action": "brush", "kind": "pen" },
//!   { "action": "stroke", "points": [[10, 10], [60, 40], [120, 40]] },
//!   { "action": "pointer", "event": { "type": "down", "x": 300, "y": 300 } },
//!   { "action": "toggle_navigating" },
//!   { "action": "sync" }
//! ]
//! ```

use inkgrid_core::{BrushKind, PointerEvent, SerializableColor};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptStep {
    /// A raw pointer event in screen coordinates.
    Pointer { event: PointerEvent },
    /// Press at the first point, move through the rest, release at the last.
    Stroke { points: Vec<[f64; 2]> },
    Brush { kind: BrushKind },
    Color { color: SerializableColor },
    ToggleNavigating,
    ToggleErasing,
    /// Jump the view so `(x, y)` is at the top-left corner.
    Pan { x: f64, y: f64 },
    /// Run a sync round and wait for it to finish.
    Sync,
}

impl ScriptStep {
    /// Pointer events a stroke expands to.
    pub fn stroke_events(points: &[[f64; 2]]) -> Vec<PointerEvent> {
        let Some((&[x0, y0], rest)) = points.split_first() else {
            return Vec::new();
        };
        let mut events = vec![PointerEvent::down(x0, y0)];
        events.extend(rest.iter().map(|&[x, y]| PointerEvent::moved(x, y)));
        let [x, y] = points[points.len() - 1];
        events.push(PointerEvent::up(x, y));
        events
    }
}

/// An ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Script {
    pub steps: Vec<ScriptStep>,
}

impl Script {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::from_json(&json).map_err(|e| format!("Invalid script {}: {}", path.display(), e))
    }
}

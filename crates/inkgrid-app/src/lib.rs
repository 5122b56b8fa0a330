//! InkGrid Application
//!
//! Headless shell around the tile grid: connects to a tile server, replays
//! pointer scripts, runs sync rounds and exports the view as PNG.

mod app;
mod script;

pub use app::{App, AppError, SETTLE_TIMEOUT};
pub use script::{Script, ScriptStep};

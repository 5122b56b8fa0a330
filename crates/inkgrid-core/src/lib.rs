//! InkGrid Core Library
//!
//! Tile grid, brush engine and tile synchronization for an infinite shared
//! drawing canvas.

pub mod brushes;
pub mod cache;
pub mod config;
pub mod geometry;
pub mod grid;
pub mod input;
pub mod remote;
pub mod surface;
pub mod sync;
pub mod tile;
pub mod viewport;

pub use brushes::{Brush, BrushKind, BrushTrait};
pub use cache::{CacheError, CacheResult, DiskCache, MemoryCache, TileCache, tile_key};
pub use config::{CanvasConfig, ConfigError, SerializableColor};
pub use geometry::{Coordinate, TILE_SIZE, TileCoord, align, align_point};
pub use grid::TileGrid;
pub use input::{InteractionMode, PointerEvent};
pub use remote::{HttpAuthority, RemoteAuthority, SyncError, SyncResult};
pub use surface::{Surface, SurfaceError, SurfaceResult};
pub use sync::{Executor, SyncCoordinator, SyncJob, TaskEvent, TaskOutcome};
pub use tile::{SyncState, Tile, TileId};
pub use viewport::{ResidentRange, Viewport};

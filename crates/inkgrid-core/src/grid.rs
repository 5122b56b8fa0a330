//! Tile grid manager: keeps the tiles around the viewport resident, routes
//! input to them and drives periodic sync.

use crate::brushes::BrushKind;
use crate::config::CanvasConfig;
use crate::geometry::TileCoord;
use crate::input::{InteractionMode, PointerEvent};
use crate::surface::{Surface, SurfaceResult};
use crate::sync::{SyncCoordinator, TaskEvent, TaskOutcome};
use crate::tile::Tile;
use crate::viewport::Viewport;
use kurbo::{Point, Vec2};
use peniko::Color;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// The set of resident tiles and everything that acts on all of them.
pub struct TileGrid {
    config: CanvasConfig,
    tiles: BTreeMap<TileCoord, Tile>,
    viewport: Viewport,
    coordinator: SyncCoordinator,
    /// Selected drawing brush, restored when erasing ends.
    brush: BrushKind,
    color: Color,
    mode: InteractionMode,
    /// Last pointer position of a navigation drag.
    drag: Option<Point>,
    last_sync: Option<Instant>,
    rng: u64,
}

impl TileGrid {
    /// Create a grid for `config` and load the tiles around the origin.
    pub fn new(config: CanvasConfig, coordinator: SyncCoordinator) -> Self {
        let viewport = Viewport::new(config.viewport_width, config.viewport_height, Vec2::ZERO);
        let mut grid = Self {
            brush: config.brush,
            color: config.color(),
            rng: config.seed,
            config,
            tiles: BTreeMap::new(),
            viewport,
            coordinator,
            mode: InteractionMode::Drawing,
            drag: None,
            last_sync: None,
        };
        grid.reload();
        grid
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn pan_offset(&self) -> Vec2 {
        self.viewport.offset
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    /// Selected drawing brush. Tiles hold the eraser instead while erasing.
    pub fn brush(&self) -> BrushKind {
        self.brush
    }

    pub fn tile(&self, coord: TileCoord) -> Option<&Tile> {
        self.tiles.get(&coord)
    }

    /// Resident tile keys in x-then-y order.
    pub fn resident_coords(&self) -> Vec<TileCoord> {
        self.tiles.keys().copied().collect()
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Background tasks not yet applied.
    pub fn in_flight(&self) -> usize {
        self.coordinator.in_flight()
    }

    /// The screen was resized or panned.
    pub fn on_viewport_changed(&mut self, width: u32, height: u32, pan_offset: Vec2) {
        self.viewport = Viewport::new(width, height, pan_offset);
        self.reload();
    }

    /// Evict tiles outside the resident range and create the missing ones.
    fn reload(&mut self) {
        let range = self.viewport.resident_range();
        let evicted: Vec<TileCoord> = self
            .tiles
            .keys()
            .copied()
            .filter(|coord| !range.contains_tile(*coord))
            .collect();

        for coord in evicted {
            if let Some(tile) = self.tiles.remove(&coord) {
                log::debug!("Evicting tile {:?} (v{})", coord, tile.version());
                self.persist(&tile);
            }
        }
        self.fill_missing();
    }

    /// Create blank tiles for resident coordinates that have none yet.
    fn fill_missing(&mut self) {
        let range = self.viewport.resident_range();
        let kind = self.active_brush();
        for coord in range.tiles() {
            if self.tiles.contains_key(&coord) {
                continue;
            }
            match Tile::new(coord, kind, self.color) {
                Ok(tile) => {
                    self.coordinator.dispatch_cache_load(coord, tile.id());
                    self.tiles.insert(coord, tile);
                }
                Err(e) => log::warn!("Skipping tile {coord:?}: {e}"),
            }
        }
    }

    /// Queue the committed content of a synced tile for the cache.
    fn persist(&mut self, tile: &Tile) {
        if tile.version() == 0 {
            return;
        }
        match tile.snapshot() {
            Ok(image) => self
                .coordinator
                .dispatch_cache_put(tile.coord(), tile.id(), image),
            Err(e) => log::warn!("Failed to snapshot {:?}: {}", tile.coord(), e),
        }
    }

    /// Route a pointer event according to the interaction mode.
    pub fn on_input_event(&mut self, event: PointerEvent) {
        if self.mode == InteractionMode::Navigating {
            self.navigate(event);
            return;
        }

        match event {
            PointerEvent::Down { position } | PointerEvent::Move { position } => {
                let canvas = self.viewport.screen_to_canvas(position);
                for tile in self.tiles.values_mut() {
                    let local = tile.coord().to_local(canvas);
                    tile.on_move(local.x, local.y);
                }
            }
            PointerEvent::Up { .. } => {
                for tile in self.tiles.values_mut() {
                    tile.on_release();
                }
            }
        }
    }

    fn navigate(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Down { position } => self.drag = Some(position),
            PointerEvent::Move { position } => {
                if let Some(previous) = self.drag.replace(position) {
                    self.viewport.pan(previous - position);
                }
            }
            PointerEvent::Up { .. } => {
                self.drag = None;
                self.reload();
            }
        }
    }

    /// Draw every resident tile onto a viewport-sized target.
    pub fn on_draw(&mut self, target: &mut Surface) {
        let origin = self.viewport.pixel_offset();
        for tile in self.tiles.values_mut() {
            let coord = tile.coord();
            let x = (coord.x - origin.x) as i32;
            let y = (coord.y - origin.y) as i32;
            target.draw_surface(tile.composite(), x, y);
        }
    }

    /// Render the current view into a new surface.
    pub fn render(&mut self) -> SurfaceResult<Surface> {
        let mut target = Surface::new(self.viewport.width, self.viewport.height)?;
        self.on_draw(&mut target);
        Ok(target)
    }

    /// Select a drawing brush. Leaves erasing mode.
    pub fn set_brush(&mut self, kind: BrushKind) {
        self.brush = kind;
        if self.mode == InteractionMode::Erasing {
            self.mode = InteractionMode::Drawing;
        }
        self.apply_brush();
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
        for tile in self.tiles.values_mut() {
            tile.set_color(color);
        }
    }

    /// Switch between navigating and drawing. Returns true if now navigating.
    pub fn toggle_navigating(&mut self) -> bool {
        let navigating = self.mode != InteractionMode::Navigating;
        self.set_mode(if navigating {
            InteractionMode::Navigating
        } else {
            InteractionMode::Drawing
        });
        navigating
    }

    /// Switch between erasing and drawing. Returns true if now erasing.
    pub fn toggle_erasing(&mut self) -> bool {
        let erasing = self.mode != InteractionMode::Erasing;
        self.set_mode(if erasing {
            InteractionMode::Erasing
        } else {
            InteractionMode::Drawing
        });
        erasing
    }

    fn set_mode(&mut self, mode: InteractionMode) {
        log::debug!("Interaction mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        self.drag = None;
        self.apply_brush();
    }

    fn active_brush(&self) -> BrushKind {
        match self.mode {
            InteractionMode::Erasing => BrushKind::Eraser,
            InteractionMode::Drawing | InteractionMode::Navigating => self.brush,
        }
    }

    fn apply_brush(&mut self) {
        let kind = self.active_brush();
        for tile in self.tiles.values_mut() {
            tile.set_brush(kind);
        }
    }

    /// Periodic driver: applies finished tasks, retries tiles that failed to
    /// allocate and starts a sync round when the interval has elapsed. The
    /// first call always syncs.
    pub fn tick(&mut self, now: Instant) {
        self.poll_events();
        self.fill_missing();

        let due = match self.last_sync {
            Some(last) => now.duration_since(last) >= self.config.sync_interval(),
            None => true,
        };
        if due {
            self.last_sync = Some(now);
            self.sync_tiles();
        }
    }

    /// Ask every resident tile to sync and refresh some cache entries.
    pub fn sync_tiles(&mut self) {
        let probability = self.config.cache_refresh_probability;
        for tile in self.tiles.values_mut() {
            if let Some(job) = tile.begin_sync() {
                self.coordinator.dispatch_sync(tile.coord(), tile.id(), job);
            }

            if tile.version() > 0 && next_unit(&mut self.rng) < probability {
                match tile.snapshot() {
                    Ok(image) => self
                        .coordinator
                        .dispatch_cache_put(tile.coord(), tile.id(), image),
                    Err(e) => log::warn!("Failed to snapshot {:?}: {}", tile.coord(), e),
                }
            }
        }
    }

    /// Apply every finished task. Returns how many changed a tile.
    pub fn poll_events(&mut self) -> usize {
        let events = self.coordinator.poll();
        self.apply_all(events)
    }

    /// Block up to `timeout` for a task to finish, then apply what arrived.
    pub fn wait_for_events(&mut self, timeout: Duration) -> usize {
        let events = self.coordinator.wait(timeout);
        self.apply_all(events)
    }

    fn apply_all(&mut self, events: Vec<TaskEvent>) -> usize {
        let mut applied = 0;
        for event in events {
            if self.apply(event) {
                applied += 1;
            }
        }
        applied
    }

    fn apply(&mut self, event: TaskEvent) -> bool {
        let TaskEvent {
            coord,
            tile_id,
            outcome,
        } = event;
        if matches!(outcome, TaskOutcome::CacheStored) {
            return false;
        }

        let Some(tile) = self.tiles.get_mut(&coord).filter(|t| t.id() == tile_id) else {
            log::debug!("Dropping completion for evicted tile {coord:?}");
            return false;
        };

        match outcome {
            TaskOutcome::Pushed(result) => tile.complete_push(result),
            TaskOutcome::Pulled(result) => tile.complete_pull(result),
            TaskOutcome::CacheLoaded(Some(image)) => tile.load_cached(image),
            TaskOutcome::CacheLoaded(None) | TaskOutcome::CacheStored => false,
        }
    }
}

/// Splitmix64 step mapped to `[0, 1)`.
fn next_unit(state: &mut u64) -> f64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 11) as f64 / (1u64 << 53) as f64
}

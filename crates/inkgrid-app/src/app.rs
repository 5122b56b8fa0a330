//! Headless application: wires a cache and a remote authority into a tile
//! grid and drives it from scripts.

use crate::script::{Script, ScriptStep};
use inkgrid_core::{
    CacheError, CanvasConfig, ConfigError, DiskCache, Executor, HttpAuthority, RemoteAuthority,
    SurfaceError, SyncCoordinator, SyncError, TileCache, TileGrid,
};
use kurbo::Vec2;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long to wait for background tasks after each sync round.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Script error: {0}")]
    Script(String),
}

/// A canvas session.
pub struct App {
    grid: TileGrid,
    remote: Arc<dyn RemoteAuthority>,
    clock: Instant,
}

impl App {
    pub fn new(
        config: CanvasConfig,
        remote: Arc<dyn RemoteAuthority>,
        cache: Arc<dyn TileCache>,
        executor: Executor,
    ) -> Self {
        let coordinator =
            SyncCoordinator::new(config.canvas_id, remote.clone(), cache, executor);
        Self {
            grid: TileGrid::new(config, coordinator),
            remote,
            clock: Instant::now(),
        }
    }

    /// Connect to the configured server and open the on-disk cache.
    pub fn connect(config: CanvasConfig) -> Result<Self, AppError> {
        let remote = Arc::new(HttpAuthority::new(&config.server_url, config.request_timeout())?);
        let cache = Arc::new(Self::open_cache(&config)?);
        log::info!(
            "Canvas {} on {} (cache {})",
            config.canvas_id,
            remote.base_url(),
            cache.base_path().display()
        );
        Ok(Self::new(config, remote, cache, Executor::Threaded))
    }

    pub fn open_cache(config: &CanvasConfig) -> Result<DiskCache, CacheError> {
        match &config.cache_dir {
            Some(dir) => DiskCache::open(dir, config.cache_capacity_bytes),
            None => DiskCache::default_location(config.cache_capacity_bytes),
        }
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut TileGrid {
        &mut self.grid
    }

    pub fn remote(&self) -> &Arc<dyn RemoteAuthority> {
        &self.remote
    }

    pub fn run_script(&mut self, script: &Script) {
        for step in &script.steps {
            self.apply(step);
        }
    }

    pub fn apply(&mut self, step: &ScriptStep) {
        match step {
            ScriptStep::Pointer { event } => self.grid.on_input_event(*event),
            ScriptStep::Stroke { points } => {
                for event in ScriptStep::stroke_events(points) {
                    self.grid.on_input_event(event);
                }
            }
            ScriptStep::Brush { kind } => self.grid.set_brush(*kind),
            ScriptStep::Color { color } => self.grid.set_color((*color).into()),
            ScriptStep::ToggleNavigating => {
                let navigating = self.grid.toggle_navigating();
                log::info!("Navigating: {}", navigating);
            }
            ScriptStep::ToggleErasing => {
                let erasing = self.grid.toggle_erasing();
                log::info!("Erasing: {}", erasing);
            }
            ScriptStep::Pan { x, y } => {
                let viewport = *self.grid.viewport();
                self.grid
                    .on_viewport_changed(viewport.width, viewport.height, Vec2::new(*x, *y));
            }
            ScriptStep::Sync => {
                self.grid.sync_tiles();
                self.settle(SETTLE_TIMEOUT);
            }
        }
    }

    /// Run `count` sync intervals back to back, waiting for each round.
    ///
    /// Time is simulated: each tick is one full interval after the previous.
    pub fn run_ticks(&mut self, count: u32) {
        let interval = self.grid.config().sync_interval();
        for _ in 0..count {
            self.grid.tick(self.clock);
            self.settle(SETTLE_TIMEOUT);
            self.clock += interval;
        }
    }

    /// Apply background results until none are outstanding or `timeout`
    /// passes. Returns true if everything finished.
    pub fn settle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.grid.in_flight() > 0 {
            let now = Instant::now();
            if now >= deadline {
                log::warn!("{} background tasks still running", self.grid.in_flight());
                return false;
            }
            self.grid.wait_for_events(deadline - now);
        }
        true
    }

    /// PNG of the current view.
    pub fn export_png(&mut self) -> Result<Vec<u8>, AppError> {
        Ok(self.grid.render()?.encode_png()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkgrid_core::remote::{PullRequest, PullResponse, TilePayload};
    use inkgrid_core::{BrushKind, Coordinate, MemoryCache, Surface, SyncResult, TileCoord};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Last-writer-wins authority held in memory.
    #[derive(Default)]
    struct LocalAuthority {
        tiles: Mutex<HashMap<(i64, i64, i64), (i64, Vec<u8>)>>,
    }

    impl LocalAuthority {
        fn version(&self, coord: TileCoord) -> Option<i64> {
            let tiles = self.tiles.lock().unwrap();
            tiles.get(&(1, coord.x, coord.y)).map(|(v, _)| *v)
        }
    }

    impl RemoteAuthority for LocalAuthority {
        fn push(
            &self,
            canvas_id: i64,
            coord: TileCoord,
            request: &TilePayload,
        ) -> SyncResult<TilePayload> {
            let incoming = Surface::decode_tile_png(&request.png()?)?;
            let mut tiles = self.tiles.lock().unwrap();
            let entry = tiles
                .entry((canvas_id, coord.x, coord.y))
                .or_insert((0, Surface::tile()?.encode_png()?));
            let mut merged = Surface::decode_tile_png(&entry.1)?;
            merged.draw_surface(&incoming, 0, 0);
            *entry = (entry.0 + 1, merged.encode_png()?);
            Ok(TilePayload::new(entry.0, &entry.1))
        }

        fn pull(
            &self,
            canvas_id: i64,
            coord: TileCoord,
            request: &PullRequest,
        ) -> SyncResult<PullResponse> {
            let tiles = self.tiles.lock().unwrap();
            Ok(match tiles.get(&(canvas_id, coord.x, coord.y)) {
                Some((version, png)) if *version > request.version => PullResponse {
                    version: *version,
                    data: Some(TilePayload::new(*version, png).data),
                },
                Some((version, _)) => PullResponse {
                    version: *version,
                    data: None,
                },
                None => PullResponse {
                    version: 0,
                    data: None,
                },
            })
        }

        fn create_canvas(&self, _name: &str) -> SyncResult<i64> {
            Ok(1)
        }

        fn search_canvas(&self, _query: &str) -> SyncResult<i64> {
            Ok(1)
        }
    }

    fn app(executor: Executor) -> (App, Arc<LocalAuthority>) {
        let config = CanvasConfig {
            viewport_width: 512,
            viewport_height: 512,
            brush: BrushKind::Pen,
            cache_refresh_probability: 0.0,
            ..Default::default()
        };
        let remote = Arc::new(LocalAuthority::default());
        let cache = Arc::new(MemoryCache::default());
        (App::new(config, remote.clone(), cache, executor), remote)
    }

    const ORIGIN: TileCoord = Coordinate::new(0, 0);

    #[test]
    fn test_script_draws_into_export() {
        let (mut app, _) = app(Executor::Inline);
        let script = Script::from_json(
            r#"[{"action": "stroke", "points": [[20, 20], [60, 20], [100, 20], [140, 20]]}]"#,
        )
        .unwrap();
        app.run_script(&script);

        let frame = Surface::decode_png(&app.export_png().unwrap()).unwrap();
        assert_eq!(frame.width(), 512);
        assert!(frame.alpha_at(60, 20) > 0);
        assert_eq!(frame.alpha_at(60, 200), 0);
    }

    #[test]
    fn test_ticks_push_edits() {
        let (mut app, remote) = app(Executor::Inline);
        app.apply(&ScriptStep::Stroke {
            points: vec![[10.0, 10.0]],
        });
        app.run_ticks(2);

        assert_eq!(remote.version(ORIGIN), Some(1));
        let tile = app.grid().tile(ORIGIN).unwrap();
        assert_eq!(tile.version(), 1);
        assert!(!tile.is_dirty());
        assert!(tile.synced().alpha_at(10, 10) > 0);
    }

    #[test]
    fn test_threaded_sync_settles() {
        let (mut app, remote) = app(Executor::Threaded);
        app.apply(&ScriptStep::Stroke {
            points: vec![[300.0, 300.0]],
        });
        app.apply(&ScriptStep::Sync);

        assert_eq!(app.grid().in_flight(), 0);
        let coord = Coordinate::new(256, 256);
        assert_eq!(remote.version(coord), Some(1));
        assert_eq!(app.grid().tile(coord).unwrap().version(), 1);
    }

    #[test]
    fn test_pan_step_moves_viewport() {
        let (mut app, _) = app(Executor::Inline);
        app.apply(&ScriptStep::Pan { x: 1000.0, y: 0.0 });

        assert_eq!(app.grid().pan_offset(), Vec2::new(1000.0, 0.0));
        assert!(app.grid().tile(ORIGIN).is_none());
        assert!(app.grid().tile(Coordinate::new(1024, 0)).is_some());
    }

    #[test]
    fn test_open_cache_in_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = CanvasConfig {
            cache_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let cache = App::open_cache(&config).unwrap();
        assert!(cache.base_path().starts_with(dir.path()));
    }
}

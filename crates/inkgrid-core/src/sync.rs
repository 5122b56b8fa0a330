//! Background sync and cache tasks.
//!
//! The interaction loop owns every tile. Network and disk work runs as
//! short-lived tasks that only see private copies of tile images; results come
//! back as [`TaskEvent`]s through a channel drained by [`SyncCoordinator::poll`].

use crate::cache::{TileCache, tile_key};
use crate::geometry::TileCoord;
use crate::remote::{PullRequest, RemoteAuthority, SyncError, SyncResult, TilePayload};
use crate::surface::Surface;
use crate::tile::TileId;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread;

/// Work a tile asks for when it starts a sync.
#[derive(Debug, Clone)]
pub enum SyncJob {
    /// Send local edits drawn over `version`.
    Push { version: i64, image: Surface },
    /// Ask for anything newer than `version`.
    Pull { version: i64 },
}

/// How background tasks are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Executor {
    /// One short-lived thread per task.
    #[default]
    Threaded,
    /// On the calling thread. Results are still delivered through the channel.
    Inline,
}

/// Result of a finished task.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Merged image and version from the authority.
    Pushed(SyncResult<(i64, Surface)>),
    /// A newer image, or `None` if the tile is up to date.
    Pulled(SyncResult<Option<(i64, Surface)>>),
    /// Cached composite, if one was found and decoded.
    CacheLoaded(Option<Surface>),
    CacheStored,
}

/// Completion of a task issued for one tile instance.
#[derive(Debug)]
pub struct TaskEvent {
    pub coord: TileCoord,
    pub tile_id: TileId,
    pub outcome: TaskOutcome,
}

#[derive(Debug)]
enum Task {
    Sync(SyncJob),
    CacheLoad,
    CachePut(Surface),
}

impl Task {
    fn name(&self) -> &'static str {
        match self {
            Task::Sync(SyncJob::Push { .. }) => "push",
            Task::Sync(SyncJob::Pull { .. }) => "pull",
            Task::CacheLoad => "cache-load",
            Task::CachePut(_) => "cache-put",
        }
    }

    /// Outcome reported when the task could not even be started.
    fn not_started(&self, reason: &str) -> TaskOutcome {
        let error = || SyncError::Spawn(reason.to_string());
        match self {
            Task::Sync(SyncJob::Push { .. }) => TaskOutcome::Pushed(Err(error())),
            Task::Sync(SyncJob::Pull { .. }) => TaskOutcome::Pulled(Err(error())),
            Task::CacheLoad => TaskOutcome::CacheLoaded(None),
            Task::CachePut(_) => TaskOutcome::CacheStored,
        }
    }
}

/// Everything a task may touch.
#[derive(Clone)]
struct TaskContext {
    canvas_id: i64,
    remote: Arc<dyn RemoteAuthority>,
    cache: Arc<dyn TileCache>,
}

impl TaskContext {
    fn run(&self, coord: TileCoord, task: Task) -> TaskOutcome {
        match task {
            Task::Sync(SyncJob::Push { version, image }) => {
                TaskOutcome::Pushed(self.push(coord, version, &image))
            }
            Task::Sync(SyncJob::Pull { version }) => TaskOutcome::Pulled(self.pull(coord, version)),
            Task::CacheLoad => TaskOutcome::CacheLoaded(self.cache_load(coord)),
            Task::CachePut(image) => {
                self.cache_put(coord, &image);
                TaskOutcome::CacheStored
            }
        }
    }

    fn push(&self, coord: TileCoord, version: i64, image: &Surface) -> SyncResult<(i64, Surface)> {
        let request = TilePayload::new(version, &image.encode_png()?);
        let response = self.remote.push(self.canvas_id, coord, &request)?;
        let merged = Surface::decode_tile_png(&response.png()?)?;
        Ok((response.version, merged))
    }

    fn pull(&self, coord: TileCoord, version: i64) -> SyncResult<Option<(i64, Surface)>> {
        let response = self
            .remote
            .pull(self.canvas_id, coord, &PullRequest { version })?;
        if response.version <= version {
            return Ok(None);
        }
        let png = response.png()?.ok_or_else(|| {
            SyncError::Malformed(format!("v{} announced without data", response.version))
        })?;
        let image = Surface::decode_tile_png(&png)?;
        Ok(Some((response.version, image)))
    }

    fn cache_load(&self, coord: TileCoord) -> Option<Surface> {
        let key = tile_key(self.canvas_id, coord);
        let bytes = match self.cache.get(&key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Cache read for {key} failed: {e}");
                return None;
            }
        };
        match Surface::decode_tile_png(&bytes) {
            Ok(surface) => Some(surface),
            Err(e) => {
                log::warn!("Discarding unreadable cache entry {key}: {e}");
                if let Err(e) = self.cache.remove(&key) {
                    log::debug!("Failed to remove {key}: {e}");
                }
                None
            }
        }
    }

    fn cache_put(&self, coord: TileCoord, image: &Surface) {
        let key = tile_key(self.canvas_id, coord);
        let result = image
            .encode_png()
            .map_err(|e| e.to_string())
            .and_then(|png| self.cache.put(&key, &png).map_err(|e| e.to_string()));
        match result {
            Ok(()) => log::debug!("Cached {key}"),
            Err(e) => log::warn!("Failed to cache {key}: {e}"),
        }
    }
}

/// Dispatches background tasks and collects their results.
pub struct SyncCoordinator {
    context: TaskContext,
    executor: Executor,
    tx: Sender<TaskEvent>,
    rx: Receiver<TaskEvent>,
    in_flight: usize,
}

impl SyncCoordinator {
    pub fn new(
        canvas_id: i64,
        remote: Arc<dyn RemoteAuthority>,
        cache: Arc<dyn TileCache>,
        executor: Executor,
    ) -> Self {
        let (tx, rx) = channel();
        Self {
            context: TaskContext {
                canvas_id,
                remote,
                cache,
            },
            executor,
            tx,
            rx,
            in_flight: 0,
        }
    }

    pub fn canvas_id(&self) -> i64 {
        self.context.canvas_id
    }

    pub fn cache(&self) -> &Arc<dyn TileCache> {
        &self.context.cache
    }

    pub fn remote(&self) -> &Arc<dyn RemoteAuthority> {
        &self.context.remote
    }

    /// Tasks dispatched whose results have not been polled yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Run a push or pull for a tile.
    pub fn dispatch_sync(&mut self, coord: TileCoord, tile_id: TileId, job: SyncJob) {
        self.spawn(coord, tile_id, Task::Sync(job));
    }

    /// Look up a cached composite for a tile.
    pub fn dispatch_cache_load(&mut self, coord: TileCoord, tile_id: TileId) {
        self.spawn(coord, tile_id, Task::CacheLoad);
    }

    /// Store a composite in the cache.
    pub fn dispatch_cache_put(&mut self, coord: TileCoord, tile_id: TileId, image: Surface) {
        self.spawn(coord, tile_id, Task::CachePut(image));
    }

    fn spawn(&mut self, coord: TileCoord, tile_id: TileId, task: Task) {
        self.in_flight += 1;
        match self.executor {
            Executor::Inline => {
                let outcome = self.context.run(coord, task);
                self.deliver(TaskEvent {
                    coord,
                    tile_id,
                    outcome,
                });
            }
            Executor::Threaded => {
                let name = format!("inkgrid-{}", task.name());
                let fallback = task.not_started("could not spawn thread");
                let context = self.context.clone();
                let tx = self.tx.clone();
                let spawned = thread::Builder::new().name(name).spawn(move || {
                    let outcome = context.run(coord, task);
                    // The receiver is gone only if the coordinator was dropped.
                    let _ = tx.send(TaskEvent {
                        coord,
                        tile_id,
                        outcome,
                    });
                });
                if let Err(e) = spawned {
                    log::warn!("Failed to spawn task for {coord:?}: {e}");
                    self.deliver(TaskEvent {
                        coord,
                        tile_id,
                        outcome: fallback,
                    });
                }
            }
        }
    }

    fn deliver(&self, event: TaskEvent) {
        // Both ends live in `self`, so this cannot fail.
        let _ = self.tx.send(event);
    }

    /// Drain every finished task without blocking.
    pub fn poll(&mut self) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    events.push(event);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// Block until at least one task finishes, then drain. Headless drivers
    /// use this instead of spinning on [`poll`](Self::poll).
    pub fn wait(&mut self, timeout: std::time::Duration) -> Vec<TaskEvent> {
        if self.in_flight == 0 {
            return Vec::new();
        }
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                let mut events = vec![event];
                events.extend(self.poll());
                events
            }
            Err(_) => Vec::new(),
        }
    }
}

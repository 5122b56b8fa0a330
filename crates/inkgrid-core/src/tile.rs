//! One grid cell of the canvas and its sync state machine.

use crate::brushes::{Brush, BrushKind};
use crate::geometry::TileCoord;
use crate::remote::SyncResult;
use crate::surface::{Surface, SurfaceResult};
use crate::sync::SyncJob;
use peniko::Color;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Identity of one tile instance.
///
/// A coordinate can be evicted and recreated; completions carry the id of
/// the instance that issued them so stale ones can be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(u64);

impl TileId {
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        TileId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Sync progress of a tile. At most one operation is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncState {
    NotSyncing = 0,
    Syncing = 1,
    CompletingSync = 2,
}

impl SyncState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SyncState::Syncing,
            2 => SyncState::CompletingSync,
            _ => SyncState::NotSyncing,
        }
    }
}

/// A square region of the canvas.
///
/// Layers, bottom to top: `synced` (confirmed by the authority), `pending`
/// (edits in flight to the authority), `edit` (local strokes not yet pushed)
/// and `preview` (the brush's uncommitted tail).
#[derive(Debug)]
pub struct Tile {
    id: TileId,
    coord: TileCoord,
    synced: Surface,
    pending: Option<Surface>,
    edit: Surface,
    preview: Surface,
    composite: Surface,
    brush: Brush,
    color: Color,
    dirty: bool,
    version: i64,
    sync_state: AtomicU8,
}

impl Tile {
    /// Create a blank, never-synced tile.
    pub fn new(coord: TileCoord, brush: BrushKind, color: Color) -> SurfaceResult<Self> {
        Ok(Self {
            id: TileId::next(),
            coord,
            synced: Surface::tile()?,
            pending: None,
            edit: Surface::tile()?,
            preview: Surface::tile()?,
            composite: Surface::tile()?,
            brush: Brush::new(brush, color),
            color,
            dirty: false,
            version: 0,
            sync_state: AtomicU8::new(SyncState::NotSyncing as u8),
        })
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn sync_state(&self) -> SyncState {
        SyncState::from_u8(self.sync_state.load(Ordering::Acquire))
    }

    pub fn brush_kind(&self) -> BrushKind {
        self.brush.kind()
    }

    pub fn synced(&self) -> &Surface {
        &self.synced
    }

    pub fn edit(&self) -> &Surface {
        &self.edit
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed a motion sample in tile-local coordinates.
    pub fn on_move(&mut self, x: f64, y: f64) {
        if self.brush.on_move(&mut self.edit, x, y) {
            self.dirty = true;
        }
    }

    /// End the current gesture.
    pub fn on_release(&mut self) {
        if self.brush.on_release(&mut self.edit) {
            self.dirty = true;
        }
    }

    /// Switch brushes. An uncommitted tail of the old brush is discarded.
    pub fn set_brush(&mut self, kind: BrushKind) {
        if self.brush.kind() != kind {
            self.brush = Brush::new(kind, self.color);
        }
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
        self.brush.set_color(color);
    }

    /// Render-ready image: every layer including the live preview.
    pub fn composite(&mut self) -> &Surface {
        let composite = &mut self.composite;
        composite.clear();
        stack_committed(composite, &self.synced, self.pending.as_ref(), &self.edit);

        if self.brush.has_preview() {
            self.preview.clear();
            self.brush.render_preview(&mut self.preview);
            composite.draw_surface(&self.preview, 0, 0);
        }
        &self.composite
    }

    /// Committed content without the preview, for persistence.
    pub fn snapshot(&self) -> SurfaceResult<Surface> {
        let mut snapshot = Surface::tile()?;
        stack_committed(&mut snapshot, &self.synced, self.pending.as_ref(), &self.edit);
        Ok(snapshot)
    }

    /// PNG of [`snapshot`](Self::snapshot).
    pub fn composite_png(&self) -> SurfaceResult<Vec<u8>> {
        self.snapshot()?.encode_png()
    }

    /// Start a sync unless one is already outstanding.
    ///
    /// Dirty tiles move their edits into the pending layer and ask for a push;
    /// clean tiles ask for a pull.
    pub fn begin_sync(&mut self) -> Option<SyncJob> {
        if self
            .sync_state
            .compare_exchange(
                SyncState::NotSyncing as u8,
                SyncState::Syncing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return None;
        }

        if !self.dirty {
            return Some(SyncJob::Pull {
                version: self.version,
            });
        }

        let fresh = match Surface::tile() {
            Ok(fresh) => fresh,
            Err(e) => {
                log::warn!("Skipping push of {:?}: {}", self.coord, e);
                self.finish_sync();
                return None;
            }
        };
        let image = std::mem::replace(&mut self.edit, fresh);
        self.pending = Some(image.clone());
        self.dirty = false;
        Some(SyncJob::Push {
            version: self.version,
            image,
        })
    }

    fn enter_completion(&self) -> bool {
        self.sync_state
            .compare_exchange(
                SyncState::Syncing as u8,
                SyncState::CompletingSync as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn finish_sync(&self) {
        self.sync_state
            .store(SyncState::NotSyncing as u8, Ordering::Release);
    }

    /// Apply the result of a push. Returns false if no push was outstanding.
    pub fn complete_push(&mut self, result: SyncResult<(i64, Surface)>) -> bool {
        if !self.enter_completion() {
            log::debug!("Ignoring push completion for idle tile {:?}", self.coord);
            return false;
        }

        let pending = self.pending.take();
        match result {
            Ok((version, merged)) if version > self.version => {
                self.synced = merged;
                self.version = version;
            }
            Ok((version, _)) => {
                log::debug!(
                    "Push of {:?} answered with stale v{} (have v{})",
                    self.coord,
                    version,
                    self.version
                );
                if let Some(pending) = pending {
                    self.synced.draw_surface(&pending, 0, 0);
                }
            }
            Err(e) => {
                log::warn!("Push of {:?} failed: {}", self.coord, e);
                if let Some(mut restored) = pending {
                    restored.draw_surface(&self.edit, 0, 0);
                    self.edit = restored;
                    self.dirty = true;
                }
            }
        }

        self.finish_sync();
        true
    }

    /// Apply the result of a pull. Returns false if no pull was outstanding.
    pub fn complete_pull(&mut self, result: SyncResult<Option<(i64, Surface)>>) -> bool {
        if !self.enter_completion() {
            log::debug!("Ignoring pull completion for idle tile {:?}", self.coord);
            return false;
        }

        match result {
            Ok(Some((version, image))) if version > self.version => {
                log::debug!("Tile {:?} updated to v{}", self.coord, version);
                self.synced = image;
                self.version = version;
            }
            Ok(_) => {}
            Err(e) => log::debug!("Pull of {:?} failed: {}", self.coord, e),
        }

        self.finish_sync();
        true
    }

    /// Install a cached composite as the synced layer.
    ///
    /// Ignored once the tile has synced. A sync still outstanding does not
    /// block it: a newer pull or a push result replaces the layer anyway.
    pub fn load_cached(&mut self, image: Surface) -> bool {
        if self.version > 0 {
            return false;
        }
        self.synced = image;
        true
    }
}

fn stack_committed(
    target: &mut Surface,
    synced: &Surface,
    pending: Option<&Surface>,
    edit: &Surface,
) {
    target.draw_surface(synced, 0, 0);
    if let Some(pending) = pending {
        target.draw_surface(pending, 0, 0);
    }
    target.draw_surface(edit, 0, 0);
}

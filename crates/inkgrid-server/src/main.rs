//! InkGrid Tile Authority Server
//!
//! Holds the versioned copy of every tile in memory. Clients push local edits
//! and pull newer versions; the server keeps whichever version is highest.
//!
//! ## Protocol
//!
//! Tile images travel as base64-encoded PNG:
//! ```text
//! POST /tile/{canvas}/{x}/{y}         {"version": 3, "data": "..."} -> {"version": 4, "data": "..."}
//! POST /update/tile/{canvas}/{x}/{y}  {"version": 3}                -> {"version": 4, "data": "..."}
//! POST /create/canvas/{name}                                        -> {"key": 1}
//! GET  /search/canvas/{query}                                       -> {"ID": 1}
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use dashmap::DashMap;
use inkgrid_core::TILE_SIZE;
use inkgrid_core::remote::{
    CreateCanvasResponse, PullRequest, PullResponse, SearchCanvasResponse, TilePayload,
};
use inkgrid_core::surface::Surface;
use serde::Serialize;
use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

const DEFAULT_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 8085);

/// The authority's copy of one tile.
#[derive(Debug, Default)]
struct StoredTile {
    version: i64,
    /// Empty until the first push.
    png: Vec<u8>,
}

/// Shared application state
struct AppState {
    /// Canvas name -> id
    canvases: DashMap<String, i64>,
    /// (canvas, x, y) -> tile
    tiles: DashMap<(i64, i64, i64), StoredTile>,
    next_canvas: AtomicI64,
}

impl AppState {
    fn new() -> Self {
        Self {
            canvases: DashMap::new(),
            tiles: DashMap::new(),
            next_canvas: AtomicI64::new(1),
        }
    }

    /// Id of the canvas called `name`, allocating one if it is new.
    fn create_canvas(&self, name: &str) -> i64 {
        *self
            .canvases
            .entry(name.to_string())
            .or_insert_with(|| self.next_canvas.fetch_add(1, Ordering::SeqCst))
    }

    /// Exact name match first, then the lowest id whose name contains `query`.
    fn search_canvas(&self, query: &str) -> Option<i64> {
        if let Some(id) = self.canvases.get(query) {
            return Some(*id);
        }
        self.canvases
            .iter()
            .filter(|entry| entry.key().contains(query))
            .map(|entry| *entry.value())
            .min()
    }

    /// Composite `incoming` over the stored tile and bump its version.
    ///
    /// The composite is built from a copy of the stored PNG so no map guard is
    /// held while decoding or encoding. If another push landed meanwhile the
    /// merge is redone on top of it.
    fn merge(&self, key: (i64, i64, i64), incoming: &Surface) -> Result<TilePayload, ApiError> {
        loop {
            let (base_version, base_png) = self
                .tiles
                .get(&key)
                .map(|tile| (tile.version, tile.png.clone()))
                .unwrap_or_default();

            let mut merged = if base_png.is_empty() {
                Surface::tile()
            } else {
                Surface::decode_tile_png(&base_png)
            }
            .map_err(|e| ApiError::Internal(e.to_string()))?;
            merged.draw_surface(incoming, 0, 0);
            let png = merged
                .encode_png()
                .map_err(|e| ApiError::Internal(e.to_string()))?;

            let mut tile = self.tiles.entry(key).or_default();
            if tile.version != base_version {
                debug!("Tile {:?} moved to v{} during merge, retrying", key, tile.version);
                continue;
            }
            tile.version += 1;
            tile.png = png;
            return Ok(TilePayload::new(tile.version, &tile.png));
        }
    }
}

/// Error response with a JSON body.
#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(m) => {
                warn!("Internal error: {}", m);
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkgrid_server=info,tower_http=info".into()),
        )
        .init();

    let addr = match std::env::var("INKGRID_ADDR") {
        Ok(value) => value.parse()?,
        Err(_) => SocketAddr::from(DEFAULT_ADDR),
    };

    let state = Arc::new(AppState::new());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("InkGrid tile server listening on {}", addr);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tile/{canvas}/{x}/{y}", post(push_tile))
        .route("/update/tile/{canvas}/{x}/{y}", post(pull_tile))
        .route("/create/canvas/{name}", post(create_canvas))
        .route("/search/canvas/{query}", get(search_canvas))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

fn tile_key(canvas: i64, x: i64, y: i64) -> Result<(i64, i64, i64), ApiError> {
    if x.rem_euclid(TILE_SIZE) != 0 || y.rem_euclid(TILE_SIZE) != 0 {
        return Err(ApiError::BadRequest(format!(
            "({x}, {y}) is not aligned to {TILE_SIZE}"
        )));
    }
    Ok((canvas, x, y))
}

async fn push_tile(
    State(state): State<Arc<AppState>>,
    Path((canvas, x, y)): Path<(i64, i64, i64)>,
    Json(payload): Json<TilePayload>,
) -> Result<Json<TilePayload>, ApiError> {
    let key = tile_key(canvas, x, y)?;
    let png = payload
        .png()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    // PNG work is CPU-bound; keep it off the async workers.
    let merged = tokio::task::spawn_blocking(move || {
        let incoming =
            Surface::decode_tile_png(&png).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        state.merge(key, &incoming)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    info!(
        "Canvas {} tile ({}, {}): v{} -> v{}",
        canvas, x, y, payload.version, merged.version
    );
    Ok(Json(merged))
}

async fn pull_tile(
    State(state): State<Arc<AppState>>,
    Path((canvas, x, y)): Path<(i64, i64, i64)>,
    Json(request): Json<PullRequest>,
) -> Result<Json<PullResponse>, ApiError> {
    let key = tile_key(canvas, x, y)?;
    let response = match state.tiles.get(&key) {
        Some(tile) if tile.version > request.version => PullResponse {
            version: tile.version,
            data: Some(STANDARD.encode(&tile.png)),
        },
        Some(tile) => PullResponse {
            version: tile.version,
            data: None,
        },
        None => PullResponse {
            version: 0,
            data: None,
        },
    };
    debug!(
        "Pull canvas {} tile ({}, {}) at v{}: v{}",
        canvas, x, y, request.version, response.version
    );
    Ok(Json(response))
}

async fn create_canvas(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<CreateCanvasResponse>, ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("canvas name is empty".to_string()));
    }
    let key = state.create_canvas(&name);
    info!("Canvas '{}' has id {}", name, key);
    Ok(Json(CreateCanvasResponse { key }))
}

async fn search_canvas(
    State(state): State<Arc<AppState>>,
    Path(query): Path<String>,
) -> Result<Json<SearchCanvasResponse>, ApiError> {
    state
        .search_canvas(&query)
        .map(|id| Json(SearchCanvasResponse { id }))
        .ok_or_else(|| ApiError::NotFound(format!("no canvas matches '{query}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header};
    use http_body_util::BodyExt;
    use inkgrid_core::brushes::{Brush, BrushKind};
    use peniko::Color;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    fn dot(x: f64, y: f64) -> Surface {
        let mut surface = Surface::tile().unwrap();
        let mut brush = Brush::new(BrushKind::Pen, Color::from_rgba8(0, 0, 0, 255));
        brush.on_move(&mut surface, x, y);
        brush.on_release(&mut surface);
        surface
    }

    fn post_json(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn send_ok<T: DeserializeOwned>(router: &Router, request: Request<Body>) -> T {
        let (status, body) = send(router, request).await;
        assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));
        serde_json::from_slice(&body).unwrap()
    }

    fn push_body(version: i64, image: &Surface) -> String {
        serde_json::to_string(&TilePayload::new(version, &image.encode_png().unwrap())).unwrap()
    }

    fn router() -> Router {
        app(Arc::new(AppState::new()))
    }

    #[tokio::test]
    async fn test_health() {
        let router = router();
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn test_push_composites_and_bumps_version() {
        let router = router();

        let first: TilePayload =
            send_ok(&router, post_json("/tile/1/0/-256", push_body(0, &dot(10.0, 10.0)))).await;
        assert_eq!(first.version, 1);

        let second: TilePayload =
            send_ok(&router, post_json("/tile/1/0/-256", push_body(0, &dot(100.0, 100.0)))).await;
        assert_eq!(second.version, 2);

        let merged = Surface::decode_tile_png(&second.png().unwrap()).unwrap();
        assert!(merged.alpha_at(10, 10) > 0);
        assert!(merged.alpha_at(100, 100) > 0);
    }

    #[test]
    fn test_concurrent_merges_keep_every_push() {
        let state = Arc::new(AppState::new());
        let key = (1, 0, 0);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = state.clone();
                std::thread::spawn(move || {
                    state.merge(key, &dot(20.0 + i as f64 * 25.0, 40.0)).unwrap()
                })
            })
            .collect();
        let mut versions: Vec<i64> = handles
            .into_iter()
            .map(|h| h.join().unwrap().version)
            .collect();
        versions.sort();
        assert_eq!(versions, (1..=8).collect::<Vec<_>>());

        let stored = state.tiles.get(&key).unwrap();
        assert_eq!(stored.version, 8);
        let merged = Surface::decode_tile_png(&stored.png).unwrap();
        for i in 0..8 {
            assert!(merged.alpha_at(20 + i * 25, 40) > 0, "push {i} was lost");
        }
    }

    #[tokio::test]
    async fn test_pull_returns_data_only_when_newer() {
        let router = router();
        let _: TilePayload =
            send_ok(&router, post_json("/tile/3/256/0", push_body(0, &dot(10.0, 10.0)))).await;

        let newer: PullResponse =
            send_ok(&router, post_json("/update/tile/3/256/0", r#"{"version": 0}"#.into())).await;
        assert_eq!(newer.version, 1);
        assert!(newer.data.is_some());

        let current: PullResponse =
            send_ok(&router, post_json("/update/tile/3/256/0", r#"{"version": 1}"#.into())).await;
        assert_eq!(current, PullResponse { version: 1, data: None });

        let unknown: PullResponse =
            send_ok(&router, post_json("/update/tile/3/512/0", r#"{"version": 0}"#.into())).await;
        assert_eq!(unknown, PullResponse { version: 0, data: None });
    }

    #[tokio::test]
    async fn test_unaligned_tile_rejected() {
        let router = router();
        let (status, _) =
            send(&router, post_json("/update/tile/1/100/0", r#"{"version": 0}"#.into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bad_image_rejected() {
        let router = router();
        let body = r#"{"version": 0, "data": "not base64!"}"#.to_string();
        let (status, _) = send(&router, post_json("/tile/1/0/0", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let body = serde_json::to_string(&TilePayload::new(0, b"not a png")).unwrap();
        let (status, _) = send(&router, post_json("/tile/1/0/0", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_and_search_canvas() {
        let router = router();

        let alpha: CreateCanvasResponse =
            send_ok(&router, post_json("/create/canvas/alphabet", String::new())).await;
        let beta: CreateCanvasResponse =
            send_ok(&router, post_json("/create/canvas/beta", String::new())).await;
        let again: CreateCanvasResponse =
            send_ok(&router, post_json("/create/canvas/alphabet", String::new())).await;
        assert_eq!(alpha.key, 1);
        assert_eq!(beta.key, 2);
        assert_eq!(again.key, 1);

        let get = |uri: &str| Request::builder().uri(uri).body(Body::empty()).unwrap();
        let exact: SearchCanvasResponse = send_ok(&router, get("/search/canvas/beta")).await;
        assert_eq!(exact.id, 2);
        let partial: SearchCanvasResponse = send_ok(&router, get("/search/canvas/alpha")).await;
        assert_eq!(partial.id, 1);

        let (status, _) = send(&router, get("/search/canvas/gamma")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

//! Main application entry point.

use clap::Parser;
use inkgrid_app::{App, AppError, Script};
use inkgrid_core::{BrushKind, CanvasConfig, HttpAuthority, RemoteAuthority};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "InkGrid - headless client for a shared tiled canvas", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tile server base URL
    #[arg(long)]
    server: Option<String>,

    /// Canvas id
    #[arg(long)]
    canvas: Option<i64>,

    /// Create (or reuse) a canvas by name and open it
    #[arg(long, conflicts_with_all = ["canvas", "search"])]
    create: Option<String>,

    /// Open the canvas whose name matches
    #[arg(long, conflicts_with = "canvas")]
    search: Option<String>,

    /// Brush to start with
    #[arg(long)]
    brush: Option<BrushKind>,

    /// Pointer script to replay
    #[arg(long)]
    script: Option<PathBuf>,

    /// Where to write the final view as PNG
    #[arg(long)]
    output: Option<PathBuf>,

    /// Sync rounds to run after the script
    #[arg(long, default_value_t = 1)]
    ticks: u32,
}

fn main() {
    env_logger::init();

    if let Err(e) = run(Cli::parse()) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = match &cli.config {
        Some(path) => CanvasConfig::load(path)?,
        None => CanvasConfig::default(),
    };
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if let Some(canvas) = cli.canvas {
        config.canvas_id = canvas;
    }
    if let Some(brush) = cli.brush {
        config.brush = brush;
    }

    log::info!("Starting InkGrid");
    if cli.create.is_some() || cli.search.is_some() {
        let remote = HttpAuthority::new(&config.server_url, config.request_timeout())?;
        if let Some(name) = &cli.create {
            config.canvas_id = remote.create_canvas(name)?;
        } else if let Some(query) = &cli.search {
            config.canvas_id = remote.search_canvas(query)?;
        }
        log::info!("Using canvas {}", config.canvas_id);
    }
    let mut app = App::connect(config)?;

    if let Some(path) = &cli.script {
        let script = Script::load(path).map_err(AppError::Script)?;
        log::info!("Replaying {} steps from {}", script.steps.len(), path.display());
        app.run_script(&script);
    }

    app.run_ticks(cli.ticks);

    if let Some(path) = &cli.output {
        let png = app.export_png()?;
        std::fs::write(path, png)
            .map_err(|e| AppError::Io(format!("{}: {}", path.display(), e)))?;
        log::info!("Exported view to {}", path.display());
    }
    Ok(())
}

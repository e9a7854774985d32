use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use gridmap_core::ProgressToken;
use gridmap_io::{save_surface, MapProject};
use gridmap_render::{MapComposition, RenderOutcome, Surface};

#[derive(Debug, Parser)]
#[command(name = "gridmap", version, about = "Render georeferenced raster map projects")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render a project to an image file
    Render {
        /// Project file (JSON)
        #[arg(short, long)]
        project: PathBuf,
        /// Output image (.png or .jpg)
        #[arg(short, long)]
        output: PathBuf,
        /// Override the display width in pixels
        #[arg(long)]
        width: Option<u32>,
        /// Override the display height in pixels
        #[arg(long)]
        height: Option<u32>,
        /// Cancel rendering after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Print the layers of a project and their extents
    Info {
        #[arg(short, long)]
        project: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Render {
            project,
            output,
            width,
            height,
            timeout_ms,
        } => render(&project, &output, width, height, timeout_ms),
        Command::Info { project } => info(&project),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_project(path: &Path) -> Result<MapProject> {
    MapProject::load(path).with_context(|| format!("failed to load project {}", path.display()))
}

fn base_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

fn render(
    project_path: &Path,
    output: &Path,
    width: Option<u32>,
    height: Option<u32>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let mut project = load_project(project_path)?;
    if let Some(width) = width {
        project.viewport.width = width;
    }
    if let Some(height) = height {
        project.viewport.height = height;
    }

    let stack = project
        .build_layers(base_dir(project_path))
        .context("failed to open project layers")?;
    let viewport = project.viewport(&stack);
    let display = viewport.display;
    info!(
        "rendering '{}' ({} layers) at {}x{}, 1:{:.0}",
        project.name,
        stack.layer_count(),
        display.width,
        display.height,
        viewport.scale_denominator()
    );

    let progress = ProgressToken::new();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let watchdog = timeout_ms.or(project.settings.render_timeout_ms).map(|ms| {
        let token = progress.clone();
        thread::spawn(move || {
            if done_rx.recv_timeout(Duration::from_millis(ms)) == Err(mpsc::RecvTimeoutError::Timeout) {
                warn!("render timed out after {} ms, cancelling", ms);
                token.cancel();
            }
        })
    });

    let mut target = Surface::filled(display, project.settings.background);
    let report = MapComposition::new(&stack).render(&mut target, &viewport, &progress);

    drop(done_tx);
    if let Some(watchdog) = watchdog {
        if watchdog.join().is_err() {
            warn!("render timeout watchdog panicked; the timeout may not have been enforced");
        }
    }

    for layer in &report.layers {
        match &layer.outcome {
            RenderOutcome::Drawn => info!("  {}: drawn", layer.name),
            RenderOutcome::Skipped(reason) => info!("  {}: skipped ({:?})", layer.name, reason),
            RenderOutcome::Failed(e) => warn!("  {}: failed: {}", layer.name, e),
        }
    }

    save_surface(&target, output).with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "{}: {} of {} layers drawn",
        output.display(),
        report.drawn_count(),
        report.layers.len()
    );
    Ok(())
}

fn info(project_path: &Path) -> Result<()> {
    let project = load_project(project_path)?;
    let stack = project
        .build_layers(base_dir(project_path))
        .context("failed to open project layers")?;

    println!("{} [{}]", project.name, project.crs);
    if !project.description.is_empty() {
        println!("  {}", project.description);
    }
    for layer in stack.all_layers() {
        let extent = layer
            .bounds()
            .map(|b| b.to_string())
            .unwrap_or_else(|| "unknown extent".to_string());
        let visibility = if layer.is_visible() { "" } else { " (hidden)" };
        println!("  {}{}: {} {}", layer.name, visibility, layer.resource().identifier(), extent);
    }
    if let Some(bounds) = stack.bounds() {
        println!("extent: {}", bounds);
    }
    Ok(())
}

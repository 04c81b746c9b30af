//! Tile Provider - inspect and render very large images tile by tile.
//!
//! This binary drives the library from the command line: `inspect` reports
//! how an image would be tiled, `render` runs the provider against a region
//! and writes the composited result.

use clap::Parser;
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tile_provider::{
    calculate_sample_size, compose, encode_png, grid_layout,
    config::{Cli, Command, InspectConfig, OutputFormat, RenderConfig, ViewConfig},
    CompletionOutcome, ImageRegionDecoder, Orientation, ProviderStats, Rect, RegionDecoder,
    TilesProvider, MAX_SAMPLE_SIZE,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect(config) => run_inspect(config),
        Command::Render(config) => run_render(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tile_provider=debug"
    } else {
        "tile_provider=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn start(view: &ViewConfig, validation: Result<(), String>) -> bool {
    init_logging(view.verbose);

    if let Err(e) = validation {
        error!("Configuration error: {}", e);
        return false;
    }
    true
}

// =============================================================================
// Inspect Command
// =============================================================================

#[derive(Debug, Serialize)]
struct InspectReport {
    path: String,
    source_width: u32,
    source_height: u32,
    orientation: Orientation,
    rotation: u32,
    width: u32,
    height: u32,
    scale: f32,
    sample_size: u32,
    viewport: [u32; 2],
    tiers: Vec<TierReport>,
}

#[derive(Debug, Serialize)]
struct TierReport {
    sample_size: u32,
    columns: u32,
    rows: u32,
    tiles: u32,
    selected: bool,
}

fn run_inspect(config: InspectConfig) -> ExitCode {
    if !start(&config.view, config.validate()) {
        return ExitCode::FAILURE;
    }
    let view = &config.view;

    let decoder = match ImageRegionDecoder::open(&view.path) {
        Ok(decoder) => decoder,
        Err(e) => {
            error!("Failed to open {}: {}", view.path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let report = build_report(&view.path, &decoder, view);

    match config.format {
        OutputFormat::Json => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        },
        OutputFormat::Text => print_report(&report),
    }

    ExitCode::SUCCESS
}

fn build_report(path: &Path, decoder: &ImageRegionDecoder, view: &ViewConfig) -> InspectReport {
    let metadata = decoder.metadata();
    let (width, height) = metadata.display_size();
    let sample_size = calculate_sample_size(view.scale, width, height);
    let (vw, vh) = (view.viewport.width, view.viewport.height);

    let tiers = std::iter::successors(Some(1u32), |s| (*s < MAX_SAMPLE_SIZE).then_some(s * 2))
        .map(|tier| {
            let (columns, rows) = grid_layout(tier, width, height, vw, vh);
            TierReport {
                sample_size: tier,
                columns,
                rows,
                tiles: columns * rows,
                selected: tier == sample_size,
            }
        })
        .collect();

    InspectReport {
        path: path.display().to_string(),
        source_width: metadata.width,
        source_height: metadata.height,
        orientation: metadata.orientation,
        rotation: metadata.orientation.degrees(),
        width,
        height,
        scale: view.scale,
        sample_size,
        viewport: [vw, vh],
        tiers,
    }
}

fn print_report(report: &InspectReport) {
    println!("Image: {}", report.path);
    println!("═════════════════════════════════");
    println!(
        "  Source:      {}x{}",
        report.source_width, report.source_height
    );
    println!("  Rotation:    {}°", report.rotation);
    println!("  Display:     {}x{}", report.width, report.height);
    println!(
        "  Viewport:    {}x{}",
        report.viewport[0], report.viewport[1]
    );
    println!(
        "  Scale:       {} (sample size {})",
        report.scale, report.sample_size
    );
    println!();
    println!("Tiers:");
    println!("─────────────────");
    for tier in &report.tiers {
        let marker = if tier.selected { "▶" } else { " " };
        println!(
            "{} {:>3}: {:>3} x {:<3} ({} tiles)",
            marker, tier.sample_size, tier.columns, tier.rows, tier.tiles
        );
    }
}

// =============================================================================
// Render Command
// =============================================================================

async fn run_render(config: RenderConfig) -> ExitCode {
    if !start(&config.view, config.validate()) {
        return ExitCode::FAILURE;
    }
    let view = &config.view;

    let mut provider = match TilesProvider::open(&view.path, |tiles| {
        debug!(tiles = tiles.len(), "tile set updated");
    }) {
        Ok(provider) => provider,
        Err(e) => {
            error!("Failed to open {}: {}", view.path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let region = config.rect.unwrap_or_else(|| {
        Rect::from_size(provider.width() as i32, provider.height() as i32)
    });
    info!(
        "Rendering {} of {}x{} at scale {} (sample size {})",
        region,
        provider.width(),
        provider.height(),
        view.scale,
        provider.sample_size_for(view.scale)
    );

    let tiles = match render_tiles(&mut provider, view, region).await {
        Ok(tiles) => tiles,
        Err(e) => {
            error!("Render failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let canvas = compose(&tiles, provider.orientation(), region, view.scale);
    let stats = provider.stats();
    if let Err(e) = provider.recycle() {
        warn!("Failed to release provider: {}", e);
    }

    let written = match encode_png(&canvas) {
        Ok(png) => std::fs::write(&config.output, &png).map(|_| png.len()),
        Err(e) => {
            error!("Failed to encode output: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match written {
        Ok(bytes) => {
            info!(
                "Wrote {} ({}x{}, {} bytes)",
                config.output.display(),
                canvas.width(),
                canvas.height(),
                bytes
            );
            print_stats(&stats);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to write {}: {}", config.output.display(), e);
            ExitCode::FAILURE
        }
    }
}

/// Request the region, wait for every decode, then request again so the
/// returned set is the settled one.
async fn render_tiles(
    provider: &mut TilesProvider<ImageRegionDecoder>,
    view: &ViewConfig,
    region: Rect,
) -> Result<tile_provider::TileSet, tile_provider::TileError> {
    let (vw, vh) = (view.viewport.width, view.viewport.height);

    let initial = provider.request_tiles(view.scale, vw, vh, region)?;
    debug!(tiles = initial.len(), in_flight = provider.in_flight(), "initial request");

    for outcome in provider.settle().await? {
        if let CompletionOutcome::Failed { rect, error, .. } = outcome {
            warn!("Tile {} failed: {}", rect, error);
        }
    }

    provider.request_tiles(view.scale, vw, vh, region)
}

fn print_stats(stats: &ProviderStats) {
    info!(
        "Decoded {} tile(s): {} accepted, {} stale, {} failed",
        stats.dispatched, stats.accepted, stats.stale, stats.failed
    );
}

mod config;
mod sample_source;
mod verify;

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use engine::{WorkerPool, tile_jobs};
use film_protocol::ChannelSet;
use tiles::{SharedAccumulator, TileAccumulator, destination_exists};
use tracing_subscriber::prelude::*;

use crate::config::RunConfig;
use crate::sample_source::BoxFilterSource;

#[derive(Parser)]
#[command(author, version, about = "Render a synthetic image into a tiled raster file")]
struct Arguments {
    /// TOML run configuration with optional [film] and [render] sections.
    #[arg(long, short = 'c', value_parser)]
    config: Option<PathBuf>,
    /// Output file; the extension is replaced with ".tiled".
    #[arg(long, short = 'o', value_parser)]
    output: Option<PathBuf>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    #[arg(long)]
    tile_size: Option<u32>,
    /// luminance, luminance_alpha, rgb, rgba, xyz, xyza or multichannel.
    #[arg(long)]
    pixel_format: Option<String>,
    /// float16, float32 or uint32.
    #[arg(long)]
    component_format: Option<String>,
    /// Force single-channel luminance output.
    #[arg(long)]
    monochrome: bool,
    /// Comma-separated channel names, required for multichannel output.
    #[arg(long, value_delimiter = ',')]
    channels: Vec<String>,
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    filter_radius: Option<u32>,
    /// Read the written file back and compare it against the renderer.
    #[arg(long)]
    verify: bool,
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Arguments {
    fn apply(&self, config: &mut RunConfig) {
        let film = &mut config.film;
        if let Some(output) = &self.output {
            film.filename = Some(output.clone());
        }
        if let Some(width) = self.width {
            film.width = width;
        }
        if let Some(height) = self.height {
            film.height = height;
        }
        if let Some(tile_size) = self.tile_size {
            film.tile_size = tile_size;
        }
        if let Some(pixel_format) = &self.pixel_format {
            film.pixel_format = pixel_format.clone();
        }
        if let Some(component_format) = &self.component_format {
            film.component_format = component_format.clone();
        }
        film.monochrome |= self.monochrome;

        let render = &mut config.render;
        if !self.channels.is_empty() {
            render.channels = self.channels.clone();
        }
        if self.workers.is_some() {
            render.workers = self.workers;
        }
        if let Some(filter_radius) = self.filter_radius {
            render.filter_radius = filter_radius;
        }
    }
}

fn main() -> Result<()> {
    let arguments = Arguments::parse();
    let log_level = if arguments.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = match &arguments.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    arguments.apply(&mut config);

    if let Some(filename) = &config.film.filename
        && destination_exists(filename)
    {
        tracing::warn!(path = %filename.display(), "overwriting existing output");
    }
    let mut film = TileAccumulator::from_config(&config.film).context("configure film")?;
    tracing::debug!("{film}");

    let layout = film.settings().pixel_layout;
    let channels = if config.render.channels.is_empty() {
        ChannelSet::canonical(layout)
            .ok_or_else(|| anyhow!("{layout} output needs an explicit channel list"))?
    } else {
        ChannelSet::new(&config.render.channels).context("channel list")?
    };
    film.prepare(channels.names()).context("prepare film channels")?;

    let grid = film.settings().grid;
    let destination = film
        .destination()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("film has no output file"))?;
    let source = BoxFilterSource::new(grid.size(), config.render.filter_radius, channels.len());
    let pool = match config.render.workers {
        Some(workers) => WorkerPool::new(workers)?,
        None => WorkerPool::with_available_parallelism(),
    };

    let film = SharedAccumulator::new(film);
    let rendered = pool.run(&film, &source, tile_jobs(&grid));
    let closed = film.shutdown();
    let report = rendered.context("render tiles")?;
    let summary = closed.context("close film")?;
    println!(
        "{summary} ({} abandoned) in {:.2?} with {} workers -> {}",
        summary.tiles_abandoned,
        report.elapsed,
        pool.worker_count(),
        destination.display()
    );

    if arguments.verify {
        let verified = verify::verify_output(&destination, &source)
            .with_context(|| format!("verify {}", destination.display()))?;
        println!(
            "verified {} tiles, {} samples",
            verified.tiles_checked, verified.samples_checked
        );
    }
    Ok(())
}

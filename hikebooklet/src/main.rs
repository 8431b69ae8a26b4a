mod booklet;
mod options;

use anyhow::{Context, Error as AnyError};
use booklet::Booklet;
use chrono::Utc;
use clap::Parser;
use log::debug;
use options::Cli;
use trail::{gpx, http::TileClient, ElevationService, TileCache, TileGrid, TrackEnricher, TrackMapBuilder};

fn main() -> Result<(), AnyError> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    let settings = cli.settings()?;
    let config = settings.trail;
    debug!("{config:?}");

    let mut tracks =
        gpx::read_file(&cli.input).with_context(|| format!("unable to read {}", cli.input.display()))?;

    let cache = TileCache::new(&settings.cache)?;
    let elevation = ElevationService::new(&config, &cache, cli.credentials.clone())?;
    let enricher = TrackEnricher::new(&elevation, config.flat_speed_kmh);
    let grid = TileGrid::new(&config, &cache, Box::new(TileClient::new(config.http_timeout())?));
    let maps = TrackMapBuilder::new(&config, grid)?;

    Booklet::new(enricher, maps, config.resolution).write(&mut tracks, &cli.out_dir, Utc::now().naive_utc())?;
    Ok(())
}

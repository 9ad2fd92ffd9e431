//! pyramid-store - command-line access to a tiled raster pyramid store.

use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pyramid_store::{
    config::{Cli, Command, ImportArgs, InfoArgs, TilesArgs},
    CancellationFlag, ImageTileCodec, Mosaic, MosaicSpec, RasterTileSource, ReferenceSystem,
    ResourceOptions, StoreError, TileCodec, TileRange, TileStore,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store = match TileStore::new(&cli.root, cli.store_config()) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open store at {}: {}", cli.root.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = match &cli.command {
        Command::Info(args) => run_info(&store, args),
        Command::Import(args) => run_import(&store, args),
        Command::Tiles(args) => run_tiles(&store, args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "pyramid_store=debug"
    } else {
        "pyramid_store=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Info Command
// =============================================================================

fn run_info(store: &TileStore, args: &InfoArgs) -> Result<(), StoreError> {
    let Some(id) = &args.resource else {
        let ids = store.resource_ids()?;
        if ids.is_empty() {
            println!("No resources under {}", store.root().display());
        }
        for id in ids {
            println!("{}", id);
        }
        return Ok(());
    };

    let resource = store.open_resource(id)?;
    println!("Resource:    {}", resource.id());
    println!("Directory:   {}", resource.directory().display());
    println!("Tile format: {}", resource.tile_format());
    println!("Probe mode:  {}", resource.uses_probe_tile_state());
    println!("Writable:    {}", resource.is_writable());

    match resource.pixel_format() {
        Some(format) => {
            println!(
                "Pixels:      {} band(s), {}-bit {}, {}, {}",
                format.bands,
                format.bits_per_sample,
                format.sample_format,
                format.planar,
                format.photometric
            );
            if let Some(range) = format.value_range {
                println!("Range:       {} .. {}", range.min, range.max);
            }
        }
        None => println!("Pixels:      (no tile written yet)"),
    }
    if !resource.no_data().is_empty() {
        println!("No-data:     {:?}", resource.no_data());
    }

    for pyramid in resource.pyramids() {
        println!();
        println!("Pyramid {} ({})", pyramid.id(), pyramid.crs().name());
        for mosaic in pyramid.mosaics() {
            let (grid_width, grid_height) = mosaic.grid_size();
            let (tile_width, tile_height) = mosaic.tile_size();
            let tiles = match mosaic.existing_tile_count() {
                Some(count) => format!("{} tile(s)", count),
                None => "probe mode".to_string(),
            };
            println!(
                "  {:<24} scale {:<10} grid {}x{}  tiles {}x{}  {}",
                mosaic.id(),
                mosaic.scale(),
                grid_width,
                grid_height,
                tile_width,
                tile_height,
                tiles
            );
        }
    }
    Ok(())
}

// =============================================================================
// Import Command
// =============================================================================

fn run_import(store: &TileStore, args: &ImportArgs) -> Result<(), StoreError> {
    args.validate().map_err(StoreError::InvalidArgument)?;

    let data = fs::read(&args.image).map_err(|e| StoreError::io(&args.image, e))?;
    let raster = ImageTileCodec::default().decode(&data)?;
    info!(
        image = %args.image.display(),
        width = raster.width(),
        height = raster.height(),
        bands = raster.bands(),
        "Decoded source image"
    );

    let options = ResourceOptions {
        no_data: args
            .no_data
            .map(|value| vec![Some(value); raster.bands() as usize])
            .unwrap_or_default(),
        probe_tile_state: None,
    };
    let resource = store.open_or_create_resource(&args.resource, options)?;

    let pyramid = match resource.pyramid(&args.pyramid) {
        Some(pyramid) => pyramid,
        None => resource.create_pyramid(&args.pyramid, ReferenceSystem::parse(&args.crs)?)?,
    };

    let source = RasterTileSource::new(raster);
    let (grid_width, grid_height) = source.grid_size(args.tile_size, args.tile_size);
    let spec = MosaicSpec::new(
        args.scale,
        args.upper_left.clone(),
        grid_width,
        grid_height,
        args.tile_size,
    );
    let mosaic = existing_or_new_mosaic(&pyramid, spec)?;

    let report = mosaic.write_from_source(
        Arc::new(source),
        TileRange::full(grid_width, grid_height),
        &CancellationFlag::new(),
    )?;

    println!(
        "Imported {} into {}/{}/{}: {} written, {} empty",
        args.image.display(),
        resource.id(),
        pyramid.id(),
        mosaic.id(),
        report.written,
        report.empty
    );
    Ok(())
}

fn existing_or_new_mosaic(
    pyramid: &pyramid_store::Pyramid,
    spec: MosaicSpec,
) -> Result<Arc<Mosaic>, StoreError> {
    let id = pyramid_store::tile::mosaic_id(spec.scale, &spec.upper_left);
    match pyramid.mosaic(&id) {
        Some(mosaic) if mosaic.tile_size() == (spec.tile_width, spec.tile_height) => Ok(mosaic),
        Some(mosaic) => Err(StoreError::InvalidArgument(format!(
            "mosaic {} already exists with {}x{} tiles",
            mosaic.id(),
            mosaic.tile_size().0,
            mosaic.tile_size().1
        ))),
        None => pyramid.create_mosaic(spec),
    }
}

// =============================================================================
// Tiles Command
// =============================================================================

fn run_tiles(store: &TileStore, args: &TilesArgs) -> Result<(), StoreError> {
    let resource = store.open_resource(&args.resource)?;
    let pyramid = resource
        .pyramid(&args.pyramid)
        .ok_or_else(|| StoreError::NotFound(format!("pyramid '{}'", args.pyramid)))?;

    let mosaic = match (&args.mosaic, args.scale) {
        (Some(id), _) => pyramid.mosaic(id),
        (None, Some(scale)) => pyramid.mosaic_for_scale(scale),
        (None, None) => pyramid.mosaics().into_iter().next(),
    }
    .ok_or_else(|| StoreError::NotFound(format!("mosaic in pyramid '{}'", args.pyramid)))?;

    let (grid_width, grid_height) = mosaic.grid_size();
    let mut listed = 0;
    let mut failed = 0;

    for entry in mosaic.list_tiles(TileRange::full(grid_width, grid_height)) {
        match entry {
            Ok(tile) => {
                listed += 1;
                let coord = tile.coord();
                match tile.path() {
                    Some(path) => println!("{:>6} {:>6}  {}", coord.row, coord.col, path.display()),
                    None => println!("{:>6} {:>6}  (empty)", coord.row, coord.col),
                }
            }
            Err(e) => {
                failed += 1;
                println!("error: {}", e);
            }
        }
    }

    println!(
        "{} of {} tile(s) present in mosaic {}{}",
        listed,
        grid_width as u64 * grid_height as u64,
        mosaic.id(),
        if failed > 0 {
            format!(", {} error(s)", failed)
        } else {
            String::new()
        }
    );
    Ok(())
}

//! Store tests
//!
//! Single-threaded behavior of resources, pyramids and mosaics:
//! - Tile file layout and status reporting
//! - Empty tile elision and placeholder reads
//! - Pixel format lock-in and value range tracking
//! - Descriptor persistence across store instances

use std::fs;

use tempfile::TempDir;

use pyramid_store::{
    MosaicSpec, Photometric, PixelBuffer, ResourceDescriptor, ResourceOptions, Samples, StoreError,
    TileCoord, TileRange, TileStatus, ValueRange, WriteOutcome,
};

use super::test_utils::{
    encode_png, gray16_ramp, gray16_tile, rgb8_tile, scale_10_spec, scaled_tile, setup_mosaic,
    small_spec, test_store, wgs84,
};

// =============================================================================
// Tile Layout and Status
// =============================================================================

#[test]
fn test_write_tile_creates_file_and_marks_status() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (_resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), scale_10_spec());

    assert_eq!(mosaic.id(), "10x0x0");
    assert_eq!(mosaic.tile_status(1, 2), TileStatus::Missing);

    let outcome = mosaic.write_tile(1, 2, &gray16_ramp(256, 1)).unwrap();
    assert_eq!(outcome, WriteOutcome::Written);
    assert_eq!(mosaic.tile_status(1, 2), TileStatus::Exists);
    assert!(!mosaic.is_empty_tile(1, 2));

    let expected = dir.path().join("dem").join("main").join("10x0x0").join("2_1.png");
    assert!(expected.is_file(), "missing tile file {}", expected.display());
    assert_eq!(mosaic.directory(), expected.parent().unwrap());

    let handle = mosaic.get_tile(1, 2).unwrap().unwrap();
    assert_eq!(handle.coord(), TileCoord::new(1, 2));
    assert_eq!(handle.path(), Some(expected.as_path()));
    assert!(!handle.is_placeholder());
}

#[test]
fn test_zero_tile_is_not_written() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (_resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), scale_10_spec());

    mosaic.write_tile(1, 2, &gray16_ramp(256, 1)).unwrap();
    let outcome = mosaic.write_tile(0, 0, &gray16_tile(256, 0)).unwrap();
    assert_eq!(outcome, WriteOutcome::Empty);
    mosaic.write_tile(3, 3, &gray16_tile(256, 0)).unwrap();

    assert_eq!(mosaic.tile_status(0, 0), TileStatus::Exists);
    assert!(mosaic.is_empty_tile(0, 0));
    assert!(!mosaic.directory().join("0_0.png").exists());
    assert!(!mosaic.directory().join("3_3.png").exists());

    let first = mosaic.get_tile(0, 0).unwrap().unwrap();
    let second = mosaic.get_tile(3, 3).unwrap().unwrap();
    assert!(first.is_placeholder());
    assert_eq!(first.read_bytes().unwrap(), second.read_bytes().unwrap());
    assert_eq!(first.read_bytes().unwrap(), mosaic.empty_tile_bytes().unwrap());
}

#[test]
fn test_empty_tile_decodes_to_zero_in_resource_format() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (_resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(2, 16));

    mosaic.write_tile(0, 0, &gray16_tile(16, 0)).unwrap();

    let pixels = mosaic.read_pixels(0, 0).unwrap().unwrap();
    assert_eq!((pixels.width(), pixels.height(), pixels.bands()), (16, 16, 1));
    assert_eq!(pixels.photometric(), Photometric::MinIsBlack);
    assert!(matches!(pixels.samples(), Samples::U16(_)));
    assert!(pixels.is_all_zero());
}

#[test]
fn test_empty_tile_uses_no_data() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let options = ResourceOptions::default().with_no_data(vec![Some(42.0)]);
    let (_resource, _pyramid, mosaic) = setup_mosaic(&store, "dem", options, small_spec(2, 8));

    mosaic.write_tile(1, 1, &gray16_tile(8, 0)).unwrap();

    let pixels = mosaic.read_pixels(1, 1).unwrap().unwrap();
    assert_eq!(pixels.sample(0, 0, 0), 42.0);
    assert_eq!(pixels.sample(7, 7, 0), 42.0);
}

#[test]
fn test_missing_tile_reads_as_none() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (_resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(2, 8));

    assert!(mosaic.get_tile(1, 0).unwrap().is_none());
    assert!(mosaic.read_pixels(1, 0).unwrap().is_none());
}

#[test]
fn test_read_pixels_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (_resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(2, 32));

    let tile = gray16_ramp(32, 500);
    mosaic.write_tile(1, 0, &tile).unwrap();

    assert_eq!(mosaic.read_pixels(1, 0).unwrap().unwrap(), tile);
}

#[test]
fn test_rewrite_as_empty_removes_file() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (_resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(2, 8));

    mosaic.write_tile(0, 1, &gray16_ramp(8, 1)).unwrap();
    assert!(mosaic.directory().join("1_0.png").is_file());

    mosaic.write_tile(0, 1, &gray16_tile(8, 0)).unwrap();
    assert!(!mosaic.directory().join("1_0.png").exists());
    assert!(mosaic.is_empty_tile(0, 1));
    assert!(mosaic.get_tile(0, 1).unwrap().unwrap().is_placeholder());
}

// =============================================================================
// Extent and Argument Errors
// =============================================================================

#[test]
fn test_outside_extent() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(4, 8));

    assert_eq!(mosaic.tile_status(4, 0), TileStatus::OutsideExtent);
    assert_eq!(mosaic.tile_status(0, 4), TileStatus::OutsideExtent);
    assert!(!mosaic.is_empty_tile(4, 4));

    match mosaic.write_tile(4, 0, &gray16_ramp(8, 1)) {
        Err(StoreError::OutsideExtent {
            col,
            row,
            grid_width,
            grid_height,
        }) => assert_eq!((col, row, grid_width, grid_height), (4, 0, 4, 4)),
        other => panic!("Expected OutsideExtent, got {:?}", other),
    }
    assert!(matches!(
        mosaic.get_tile(0, 4),
        Err(StoreError::OutsideExtent { .. })
    ));
    assert!(resource.pixel_format().is_none());
}

#[test]
fn test_wrong_tile_size_rejected() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(2, 8));

    assert!(matches!(
        mosaic.write_tile(0, 0, &gray16_ramp(16, 1)),
        Err(StoreError::InvalidArgument(_))
    ));
    assert_eq!(mosaic.tile_status(0, 0), TileStatus::Missing);
    assert!(resource.pixel_format().is_none());
}

// =============================================================================
// Pixel Format
// =============================================================================

#[test]
fn test_first_tile_fixes_format() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(2, 8));

    assert!(resource.pixel_format().is_none());
    assert!(resource.color_model().is_none());
    mosaic.write_tile(0, 0, &gray16_ramp(8, 1)).unwrap();

    let format = resource.pixel_format().unwrap();
    assert_eq!(format.bands, 1);
    assert_eq!(format.bits_per_sample, 16);
    assert_eq!(format.photometric, Photometric::MinIsBlack);
    assert!(format.value_range.is_none());

    let color_model = resource.color_model().unwrap();
    assert_eq!(color_model.bands, 1);
    assert!(color_model.display_range.is_none());
}

#[test]
fn test_incompatible_tile_rejected() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(2, 8));

    mosaic.write_tile(0, 0, &gray16_ramp(8, 1)).unwrap();
    let before = ResourceDescriptor::load(resource.directory()).unwrap();

    match mosaic.write_tile(1, 0, &rgb8_tile(8, 3)) {
        Err(StoreError::ConfigurationMismatch { field, .. }) => assert_eq!(field, "band count"),
        other => panic!("Expected ConfigurationMismatch, got {:?}", other),
    }

    let gray8 = PixelBuffer::new(8, 8, 1, Photometric::MinIsBlack, Samples::U8(vec![9; 64])).unwrap();
    match mosaic.write_tile(1, 0, &gray8) {
        Err(StoreError::ConfigurationMismatch { field, .. }) => {
            assert_eq!(field, "bits per sample")
        }
        other => panic!("Expected ConfigurationMismatch, got {:?}", other),
    }

    let signed = PixelBuffer::new(8, 8, 1, Photometric::MinIsBlack, Samples::I16(vec![-9; 64])).unwrap();
    match mosaic.write_tile(1, 0, &signed) {
        Err(StoreError::ConfigurationMismatch { field, .. }) => assert_eq!(field, "sample format"),
        other => panic!("Expected ConfigurationMismatch, got {:?}", other),
    }

    assert_eq!(mosaic.tile_status(1, 0), TileStatus::Missing);
    assert_eq!(resource.pixel_format().unwrap().bands, 1);

    let after = ResourceDescriptor::load(resource.directory()).unwrap();
    assert_eq!(after, before);
}

#[test]
fn test_scaled_range_widens() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(2, 16));

    mosaic.write_tile(0, 0, &scaled_tile(16, 100, 200)).unwrap();
    assert_eq!(
        resource.pixel_format().unwrap().value_range,
        Some(ValueRange::new(100.0, 200.0))
    );
    assert_eq!(
        resource.color_model().unwrap().display_range,
        Some(ValueRange::new(100.0, 200.0))
    );

    // Inside the current range: nothing changes
    mosaic.write_tile(1, 0, &scaled_tile(16, 120, 180)).unwrap();
    assert_eq!(
        resource.pixel_format().unwrap().value_range,
        Some(ValueRange::new(100.0, 200.0))
    );

    mosaic.write_tile(0, 1, &scaled_tile(16, 50, 150)).unwrap();
    let widened = Some(ValueRange::new(50.0, 200.0));
    assert_eq!(resource.pixel_format().unwrap().value_range, widened);
    assert_eq!(resource.color_model().unwrap().display_range, widened);

    let persisted = ResourceDescriptor::load(resource.directory()).unwrap();
    assert_eq!(persisted.pixel_format.unwrap().value_range, widened);

    let pixels = mosaic.read_pixels(0, 1).unwrap().unwrap();
    assert_eq!(pixels.photometric(), Photometric::Scaled);
}

// =============================================================================
// Listing
// =============================================================================

#[test]
fn test_list_tiles_full_grid() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (_resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(4, 8));

    mosaic.write_tile(1, 2, &gray16_ramp(8, 1)).unwrap();
    mosaic.write_tile(0, 0, &gray16_tile(8, 0)).unwrap();
    mosaic.write_tile(3, 1, &gray16_ramp(8, 7)).unwrap();

    fs::write(mosaic.directory().join("notes.txt"), b"not a tile").unwrap();
    fs::write(mosaic.directory().join("9_9.png"), b"outside the grid").unwrap();

    let tiles: Vec<_> = mosaic
        .list_tiles(TileRange::full(4, 4))
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let coords: Vec<_> = tiles.iter().map(|t| t.coord()).collect();
    assert_eq!(
        coords,
        vec![TileCoord::new(0, 0), TileCoord::new(3, 1), TileCoord::new(1, 2)]
    );
    assert!(tiles[0].is_placeholder());
    assert!(!tiles[1].is_placeholder());
    assert!(!tiles[2].is_placeholder());
}

#[test]
fn test_list_tiles_partial_range() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (_resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(4, 8));

    mosaic.write_tile(1, 2, &gray16_ramp(8, 1)).unwrap();
    mosaic.write_tile(0, 0, &gray16_tile(8, 0)).unwrap();
    mosaic.write_tile(3, 1, &gray16_ramp(8, 7)).unwrap();

    let coords: Vec<_> = mosaic
        .list_tiles(TileRange::new(0, 0, 2, 3))
        .into_iter()
        .map(|t| t.unwrap().coord())
        .collect();
    assert_eq!(coords, vec![TileCoord::new(0, 0), TileCoord::new(1, 2)]);

    // Ranges past the grid are clipped
    let clipped = mosaic.list_tiles(TileRange::new(2, 1, 100, 100));
    assert_eq!(clipped.len(), 1);
}

#[test]
fn test_full_listing_ignores_unrecorded_files() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (_resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(4, 8));

    mosaic.write_tile(0, 0, &gray16_ramp(8, 1)).unwrap();
    fs::write(mosaic.directory().join("1_1.png"), encode_png(&gray16_ramp(8, 2))).unwrap();
    assert_eq!(mosaic.tile_status(1, 1), TileStatus::Missing);

    let full: Vec<_> = mosaic
        .list_tiles(TileRange::full(4, 4))
        .into_iter()
        .map(|t| t.unwrap().coord())
        .collect();
    let partial: Vec<_> = mosaic
        .list_tiles(TileRange::new(0, 0, 4, 3))
        .into_iter()
        .map(|t| t.unwrap().coord())
        .collect();

    assert_eq!(full, vec![TileCoord::new(0, 0)]);
    assert_eq!(full, partial);
}

#[test]
fn test_failed_write_leaves_no_tile_file() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (_resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(2, 8));

    // A directory in place of the tile file makes the final rename fail
    let blocked = mosaic.directory().join("1_0.png");
    fs::create_dir_all(&blocked).unwrap();

    assert!(matches!(
        mosaic.write_tile(0, 1, &gray16_ramp(8, 1)),
        Err(StoreError::Io { .. })
    ));
    assert_eq!(mosaic.tile_status(0, 1), TileStatus::Missing);

    let names: Vec<_> = fs::read_dir(mosaic.directory())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("1_0.png")]);
}

#[test]
fn test_any_tile() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (_resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(4, 8));

    let placeholder = mosaic.any_tile().unwrap();
    assert!(placeholder.is_placeholder());
    assert_eq!(placeholder.coord(), TileCoord::new(0, 0));

    mosaic.write_tile(2, 3, &gray16_ramp(8, 1)).unwrap();
    let found = mosaic.any_tile().unwrap();
    assert_eq!(found.coord(), TileCoord::new(2, 3));
    assert!(found.path().is_some());
}

// =============================================================================
// Pyramids and Mosaics
// =============================================================================

#[test]
fn test_mosaic_for_scale() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let resource = store.create_resource("dem", ResourceOptions::default()).unwrap();
    let pyramid = resource.create_pyramid("main", wgs84()).unwrap();

    for scale in [16.0, 1.0, 4.0] {
        pyramid
            .create_mosaic(MosaicSpec::new(scale, vec![0.0, 0.0], 2, 2, 8))
            .unwrap();
    }

    let scales: Vec<f64> = pyramid.mosaics().iter().map(|m| m.scale()).collect();
    assert_eq!(scales, vec![1.0, 4.0, 16.0]);

    let pick = |scale: f64| pyramid.mosaic_for_scale(scale).unwrap().scale();
    assert_eq!(pick(5.0), 4.0);
    assert_eq!(pick(4.0), 4.0);
    assert_eq!(pick(4.0 * (1.0 - 1e-12)), 4.0);
    assert_eq!(pick(100.0), 16.0);
    assert_eq!(pick(0.5), 1.0);
}

#[test]
fn test_mosaic_for_scale_without_mosaics() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let resource = store.create_resource("dem", ResourceOptions::default()).unwrap();
    let pyramid = resource.create_pyramid("main", wgs84()).unwrap();

    assert!(pyramid.mosaic_for_scale(1.0).is_none());
}

#[test]
fn test_duplicates_rejected() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (resource, pyramid, _mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(2, 8));

    assert!(matches!(
        resource.create_pyramid("main", wgs84()),
        Err(StoreError::AlreadyExists(_))
    ));
    assert!(matches!(
        pyramid.create_mosaic(small_spec(2, 8)),
        Err(StoreError::AlreadyExists(_))
    ));
}

#[test]
fn test_delete_unsupported() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (resource, pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(2, 8));

    assert!(matches!(
        resource.delete_pyramid("main"),
        Err(StoreError::Unsupported(_))
    ));
    assert!(matches!(
        pyramid.delete_mosaic(mosaic.id()),
        Err(StoreError::Unsupported(_))
    ));
    assert!(resource.pyramid("main").is_some());
    assert_eq!(pyramid.mosaics().len(), 1);
}

#[test]
fn test_is_writable() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let resource = store.create_resource("dem", ResourceOptions::default()).unwrap();
    assert!(resource.is_writable());

    fs::remove_dir_all(resource.directory()).unwrap();
    assert!(!resource.is_writable());
}

#[test]
fn test_invalid_mosaic_spec() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let resource = store.create_resource("dem", ResourceOptions::default()).unwrap();
    let pyramid = resource.create_pyramid("main", wgs84()).unwrap();

    let zero_grid = MosaicSpec::new(1.0, vec![0.0, 0.0], 0, 2, 8);
    assert!(matches!(
        pyramid.create_mosaic(zero_grid),
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(pyramid.mosaics().is_empty());
}

#[test]
fn test_closed_resource() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (resource, pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(2, 8));
    drop(resource);

    // The store still holds the resource open
    mosaic.write_tile(0, 0, &gray16_ramp(8, 1)).unwrap();

    assert!(store.close_resource("dem"));
    assert!(matches!(
        mosaic.write_tile(1, 0, &gray16_ramp(8, 1)),
        Err(StoreError::ResourceClosed)
    ));
    assert!(matches!(
        pyramid.create_mosaic(MosaicSpec::new(2.0, vec![0.0, 0.0], 2, 2, 8)),
        Err(StoreError::ResourceClosed)
    ));
}

#[test]
fn test_mosaic_outlives_resource_handle() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(2, 8));

    let mosaic = store
        .open_resource("dem")
        .unwrap()
        .pyramid("main")
        .unwrap()
        .mosaic("1x0x0")
        .unwrap();

    mosaic.write_tile(1, 1, &gray16_ramp(8, 4)).unwrap();
    assert_eq!(mosaic.read_pixels(1, 1).unwrap().unwrap(), gray16_ramp(8, 4));
    assert!(mosaic.get_tile(1, 1).unwrap().is_some());
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = test_store(&dir);
        let (_resource, _pyramid, mosaic) =
            setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(4, 8));
        mosaic.write_tile(1, 2, &gray16_ramp(8, 1)).unwrap();
        mosaic.write_tile(0, 0, &gray16_tile(8, 0)).unwrap();
    }

    let store = test_store(&dir);
    assert_eq!(store.resource_ids().unwrap(), vec!["dem"]);

    let resource = store.open_resource("dem").unwrap();
    assert_eq!(resource.pixel_format().unwrap().bits_per_sample, 16);

    let pyramid = resource.pyramid("main").unwrap();
    assert_eq!(pyramid.crs(), &wgs84());
    assert_eq!(pyramid.crs().name(), "WGS 84");

    let mosaic = pyramid.mosaic("1x0x0").unwrap();
    assert!(!mosaic.uses_probe_mode());
    assert_eq!(mosaic.grid_size(), (4, 4));
    assert_eq!(mosaic.tile_size(), (8, 8));
    assert_eq!(mosaic.data_pixel_size(), (32, 32));
    assert_eq!(mosaic.existing_tile_count(), Some(2));

    assert_eq!(mosaic.tile_status(1, 2), TileStatus::Exists);
    assert_eq!(mosaic.tile_status(0, 0), TileStatus::Exists);
    assert_eq!(mosaic.tile_status(2, 2), TileStatus::Missing);
    assert!(mosaic.is_empty_tile(0, 0));
    assert!(!mosaic.is_empty_tile(1, 2));
    assert_eq!(mosaic.read_pixels(1, 2).unwrap().unwrap(), gray16_ramp(8, 1));
}

#[test]
fn test_descriptor_written_atomically() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(2, 8));
    mosaic.write_tile(1, 1, &gray16_ramp(8, 1)).unwrap();

    let names: Vec<String> = fs::read_dir(resource.directory())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.contains(&"descriptor.json".to_string()));
    assert!(!names.iter().any(|n| n.ends_with(".tmp")));

    let descriptor = ResourceDescriptor::load(resource.directory()).unwrap();
    assert_eq!(descriptor.id, "dem");
    assert_eq!(descriptor.tile_format, "png");
    assert_eq!(descriptor.pyramids.len(), 1);
    let mosaic_entry = &descriptor.pyramids[0].mosaics[0];
    assert_eq!(mosaic_entry.id, "1x0x0");
    assert!(mosaic_entry.exists.is_some());
}

#[test]
fn test_each_write_saves_descriptor() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (resource, _pyramid, mosaic) =
        setup_mosaic(&store, "dem", ResourceOptions::default(), small_spec(2, 8));

    let before = resource.descriptor_writes();
    mosaic.write_tile(0, 0, &gray16_ramp(8, 1)).unwrap();
    mosaic.write_tile(1, 0, &gray16_ramp(8, 2)).unwrap();
    assert_eq!(resource.descriptor_writes(), before + 2);
}

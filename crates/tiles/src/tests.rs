use std::collections::HashMap;
use std::thread;

use super::*;
use film_protocol::Chromaticities;

fn settings(tiles_x: u32, tiles_y: u32, layout: PixelLayout) -> FilmSettings {
    FilmSettings::new(tiles_x * 32, tiles_y * 32, 32, layout, ComponentEncoding::Float32)
        .expect("film settings")
}

fn memory_film_with(
    tiles_x: u32,
    tiles_y: u32,
    store: MemoryTileStore,
) -> TileAccumulator<MemoryTileStore> {
    let mut film = TileAccumulator::new(settings(tiles_x, tiles_y, PixelLayout::Luminance), store);
    film.prepare(["Y"]).expect("prepare");
    film
}

fn memory_film(tiles_x: u32, tiles_y: u32) -> TileAccumulator<MemoryTileStore> {
    memory_film_with(tiles_x, tiles_y, MemoryTileStore::new())
}

/// Full-size block for `coord` whose core and border all hold `value`.
fn tile_block(coord: TileCoord, border: u32, value: f32) -> ImageBlock {
    let mut block = ImageBlock::new(
        PixelPoint::new((coord.x * 32) as i32, (coord.y * 32) as i32),
        PixelSize::new(32, 32),
        border,
        1,
    );
    block.data_mut().fill(value);
    block
}

/// Distinct powers of two keep every merged sum exact in any addition order.
fn dyadic_value(coord: TileCoord) -> f32 {
    (1u32 << (coord.y * 4 + coord.x)) as f32 * 0.125
}

/// Visits every coordinate of the grid once, striding by `step` (coprime to the tile count).
fn permuted(grid: &TileGrid, step: usize) -> Vec<TileCoord> {
    let coords = grid.iter_coords().collect::<Vec<_>>();
    (0..coords.len())
        .map(|index| coords[(index * step) % coords.len()])
        .collect()
}

fn tile_bytes(store: &MemoryTileStore, grid: &TileGrid) -> HashMap<TileCoord, Vec<u8>> {
    grid.iter_coords()
        .map(|coord| {
            let stored = store.tile(coord).expect("tile written");
            (coord, stored.bytes.clone())
        })
        .collect()
}

fn run_in_order(order: &[TileCoord]) -> MemoryTileStore {
    let mut film = memory_film(3, 3);
    for coord in order {
        film.submit(&tile_block(*coord, 2, dyadic_value(*coord)))
            .expect("submit");
    }
    let summary = film.shutdown().expect("shutdown");
    assert_eq!(summary.tiles_written, 9);
    film.into_store()
}

#[test]
fn every_tile_is_written_exactly_once() {
    let grid = TileGrid::new(96, 96, 32).expect("grid");
    for step in [1, 2, 4, 5, 7, 8] {
        let store = run_in_order(&permuted(&grid, step));
        let mut written = store.write_log().to_vec();
        assert_eq!(written.len(), grid.tile_count(), "step {step}");
        written.sort_by_key(|coord| (coord.y, coord.x));
        assert_eq!(written, grid.iter_coords().collect::<Vec<_>>(), "step {step}");
    }
}

#[test]
fn merged_tiles_do_not_depend_on_submission_order() {
    let grid = TileGrid::new(96, 96, 32).expect("grid");
    let reference = tile_bytes(&run_in_order(&permuted(&grid, 1)), &grid);
    for step in [2, 4, 5, 7, 8] {
        let other = tile_bytes(&run_in_order(&permuted(&grid, step)), &grid);
        assert_eq!(other, reference, "step {step}");
    }
    let mut reversed = permuted(&grid, 1);
    reversed.reverse();
    assert_eq!(tile_bytes(&run_in_order(&reversed), &grid), reference);
}

#[test]
fn border_contributions_are_added_once_per_neighbor() {
    let grid = TileGrid::new(96, 96, 32).expect("grid");
    let store = run_in_order(&permuted(&grid, 1));
    let value = |x: u32, y: u32| dyadic_value(TileCoord::new(x, y));

    // center interior, far from any tile edge: untouched original
    assert_eq!(store.sample(48, 48, 0), Some(value(1, 1)));
    // left edge column of the center tile overlaps only the left neighbor's border
    assert_eq!(store.sample(32, 48, 0), Some(value(1, 1) + value(0, 1)));
    // top-left corner pixel is covered by three neighbors
    assert_eq!(
        store.sample(32, 32, 0),
        Some(value(1, 1) + value(0, 0) + value(1, 0) + value(0, 1))
    );
    // bottom-right corner of the center tile mirrors it
    assert_eq!(
        store.sample(63, 63, 0),
        Some(value(1, 1) + value(2, 2) + value(2, 1) + value(1, 2))
    );
    // image corner pixel has no neighbors reaching it
    assert_eq!(store.sample(0, 0, 0), Some(value(0, 0)));
}

#[test]
fn unaligned_offset_is_rejected() {
    let mut film = memory_film(2, 2);
    let block = ImageBlock::new(PixelPoint::new(5, 0), PixelSize::new(27, 32), 0, 1);
    assert!(matches!(
        film.submit(&block),
        Err(FilmError::Protocol(ProtocolError::UnalignedBlock {
            offset_x: 5,
            offset_y: 0,
            tile_size: 32,
        }))
    ));
    assert!(matches!(
        film.submit(&tile_block(TileCoord::new(0, 0), 0, 1.0)),
        Err(FilmError::Aborted)
    ));
}

#[test]
fn oversized_block_is_rejected() {
    let mut film = memory_film(2, 2);
    let block = ImageBlock::new(PixelPoint::new(0, 0), PixelSize::new(33, 10), 0, 1);
    assert!(matches!(
        film.submit(&block),
        Err(FilmError::Protocol(ProtocolError::OversizedBlock {
            size_x: 33,
            size_y: 10,
            tile_size: 32,
        }))
    ));
    assert_eq!(film.usage().allocated(), 0);
}

#[test]
fn duplicate_channels_are_rejected_before_any_block() {
    let mut film = TileAccumulator::new(
        settings(2, 2, PixelLayout::MultiChannel),
        MemoryTileStore::new(),
    );
    let error = film
        .prepare(["R", "G", "B", "R"])
        .expect_err("duplicate channel");
    assert!(matches!(
        error,
        FilmError::Configuration(ConfigurationError::DuplicateChannel { ref name }) if name == "R"
    ));
    assert!(film.store().header().is_none());
    let block = ImageBlock::new(PixelPoint::new(0, 0), PixelSize::new(32, 32), 0, 4);
    assert!(matches!(
        film.submit(&block),
        Err(FilmError::Protocol(ProtocolError::NotPrepared))
    ));
}

#[test]
fn isolated_pending_tiles_hold_two_buffers_each() {
    let mut film = memory_film(5, 5);
    let isolated = [(0, 0), (2, 0), (4, 0), (0, 2), (2, 2), (4, 4)];
    for (x, y) in isolated {
        film.submit(&tile_block(TileCoord::new(x, y), 1, 1.0))
            .expect("submit");
    }
    assert_eq!(film.tiles_written(), 0);
    assert_eq!(film.usage().peak(), 2 * isolated.len());
    assert_eq!(film.usage().live(), 2 * isolated.len());

    let summary = film.shutdown().expect("shutdown");
    assert_eq!(summary.peak_buffers, 12);
    assert_eq!(summary.tiles_abandoned, 6);
    assert_eq!(summary.tiles_written, 0);
    assert_eq!(film.usage().live(), 0);
}

#[test]
fn free_list_reuse_bounds_a_flushing_strip() {
    let mut film = memory_film(8, 1);
    for x in 0..8 {
        film.submit(&tile_block(TileCoord::new(x, 0), 1, 1.0))
            .expect("submit");
    }
    // each arrival flushes its left neighbor, so at most two tiles are ever live
    assert_eq!(film.tiles_written(), 8);
    assert_eq!(film.usage().peak(), 4);
    assert_eq!(film.usage().allocated(), 4);
    assert_eq!(film.free_list().len(), 4);
}

#[test]
fn two_by_two_image_flushes_on_the_last_block() {
    let mut film = memory_film(2, 2);
    let coords = [(0, 0), (1, 0), (0, 1), (1, 1)].map(|(x, y)| TileCoord::new(x, y));
    for coord in &coords[..3] {
        film.submit(&tile_block(*coord, 0, 1.0)).expect("submit");
        assert_eq!(film.tiles_written(), 0);
    }
    film.submit(&tile_block(coords[3], 0, 1.0)).expect("submit");
    assert_eq!(film.tiles_written(), 4);

    let summary = film.shutdown().expect("shutdown");
    assert_eq!(
        summary,
        FlushSummary {
            tiles_written: 4,
            tiles_total: 4,
            tiles_abandoned: 0,
            peak_buffers: 8,
        }
    );
    assert_eq!(summary.to_string(), "4 of 4 tiles written, peak 8 buffers");
    let store = film.into_store();
    assert_eq!(store.write_log().len(), 4);
    assert!(store.is_finished());
}

#[test]
fn store_failure_aborts_the_film() {
    let store = MemoryTileStore::new().fail_on_tile(TileCoord::new(0, 0));
    let mut film = memory_film_with(2, 2, store);
    for (x, y) in [(0, 0), (1, 0), (0, 1)] {
        film.submit(&tile_block(TileCoord::new(x, y), 0, 1.0))
            .expect("submit");
    }
    let error = film
        .submit(&tile_block(TileCoord::new(1, 1), 0, 1.0))
        .expect_err("write of (0, 0) fails");
    assert!(matches!(
        error,
        FilmError::Store(StoreError::WriteTile { tile_x: 0, tile_y: 0, .. })
    ));
    assert!(film.is_aborted());
    assert!(matches!(
        film.try_finalize(TileCoord::new(1, 0)),
        Err(FilmError::Aborted)
    ));

    let summary = film.shutdown().expect("shutdown after abort");
    assert_eq!(summary.tiles_written, 0);
    assert_eq!(summary.tiles_abandoned, 4);
    assert_eq!(film.usage().live(), 0);
}

#[test]
fn shutdown_is_idempotent() {
    let mut film = memory_film(2, 1);
    film.submit(&tile_block(TileCoord::new(0, 0), 0, 1.0))
        .expect("submit");
    let first = film.shutdown().expect("first shutdown");
    let second = film.shutdown().expect("second shutdown");
    assert_eq!(first, second);
    assert_eq!(first.tiles_abandoned, 1);
    assert!(matches!(
        film.submit(&tile_block(TileCoord::new(1, 0), 0, 1.0)),
        Err(FilmError::Protocol(ProtocolError::Closed))
    ));
}

#[test]
fn failed_close_is_reported_again() {
    let store = MemoryTileStore::new().fail_on_finish();
    let mut film = memory_film_with(1, 1, store);
    film.submit(&tile_block(TileCoord::new(0, 0), 0, 1.0))
        .expect("submit");
    for attempt in ["first", "second"] {
        let error = film.shutdown().expect_err(attempt);
        assert!(
            matches!(error, FilmError::Store(StoreError::Finish { .. })),
            "{attempt}: {error}"
        );
    }
    assert!(film.is_aborted());
    assert!(matches!(
        film.submit(&tile_block(TileCoord::new(0, 0), 0, 1.0)),
        Err(FilmError::Aborted)
    ));
    assert!(!film.into_store().is_finished());
}

#[test]
fn partial_edge_tiles_are_zero_padded() {
    let settings = FilmSettings::new(40, 32, 32, PixelLayout::Luminance, ComponentEncoding::Float32)
        .expect("settings");
    let mut film = TileAccumulator::new(settings, MemoryTileStore::new());
    film.prepare(["Y"]).expect("prepare");
    film.submit(&tile_block(TileCoord::new(0, 0), 0, 1.0))
        .expect("submit");
    let mut edge = ImageBlock::new(PixelPoint::new(32, 0), PixelSize::new(8, 32), 0, 1);
    edge.data_mut().fill(2.0);
    film.submit(&edge).expect("submit edge");

    let store = film.into_store();
    assert_eq!(store.sample(39, 31, 0), Some(2.0));
    assert_eq!(store.sample(40, 0, 0), Some(0.0));
    assert_eq!(store.sample(63, 31, 0), Some(0.0));
}

#[test]
fn concurrent_submits_match_sequential_result() {
    let grid = TileGrid::new(128, 128, 32).expect("grid");
    let sequential = {
        let mut film = memory_film(4, 4);
        for coord in grid.iter_coords() {
            film.submit(&tile_block(coord, 2, dyadic_value(coord)))
                .expect("submit");
        }
        film.shutdown().expect("shutdown");
        tile_bytes(film.store(), &grid)
    };

    let shared = SharedAccumulator::new(memory_film(4, 4));
    let coords = permuted(&grid, 7);
    thread::scope(|scope| {
        for chunk in coords.chunks(4) {
            let shared = shared.clone();
            scope.spawn(move || {
                for coord in chunk {
                    shared
                        .submit(&tile_block(*coord, 2, dyadic_value(*coord)))
                        .expect("submit");
                }
            });
        }
    });
    let summary = shared.shutdown().expect("shutdown");
    assert_eq!(summary.tiles_written, 16);
    assert_eq!(summary.tiles_abandoned, 0);
    let concurrent = shared.with(|film| tile_bytes(film.store(), &grid));
    assert_eq!(concurrent, sequential);
}

#[test]
fn file_film_round_trips_through_reader() {
    let dir = tempfile::tempdir().expect("tempdir");
    let requested = dir.path().join("beauty.exr");
    let mut film = TileAccumulator::configure(64, 64, 32, "RGBA", "float16", &requested)
        .expect("configure");
    let destination = film.destination().expect("destination").to_path_buf();
    assert_eq!(destination, dir.path().join("beauty.tiled"));
    assert!(film.to_string().contains("beauty.tiled"));

    film.prepare(["R", "G", "B", "A"]).expect("prepare");
    for coord in TileGrid::new(64, 64, 32).expect("grid").iter_coords() {
        let mut block = ImageBlock::new(
            PixelPoint::new((coord.x * 32) as i32, (coord.y * 32) as i32),
            PixelSize::new(32, 32),
            0,
            4,
        );
        for pixel in block.data_mut().chunks_exact_mut(4) {
            pixel.copy_from_slice(&[coord.x as f32, coord.y as f32, 0.5, 1.0]);
        }
        film.submit(&block).expect("submit");
    }
    assert_eq!(film.shutdown().expect("shutdown").tiles_written, 4);

    let mut reader = TiledRasterReader::open(&destination).expect("open");
    assert_eq!(reader.header().channels, ["R", "G", "B", "A"]);
    assert_eq!(reader.header().component_encoding, ComponentEncoding::Float16);
    assert_eq!(reader.header().chromaticities, Some(Chromaticities::REC709));
    let tile = reader.read_tile(TileCoord::new(1, 0)).expect("read tile");
    assert_eq!(&tile[..4], &[1.0, 0.0, 0.5, 1.0]);
    let tile = reader.read_tile(TileCoord::new(0, 1)).expect("read tile");
    assert_eq!(&tile[tile.len() - 4..], &[0.0, 1.0, 0.5, 1.0]);
}

#[test]
fn configure_rejects_unknown_formats() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("film");
    assert!(matches!(
        TileAccumulator::configure(64, 64, 32, "cmyk", "float16", &path),
        Err(ConfigurationError::UnknownPixelLayout { .. })
    ));
    assert!(matches!(
        TileAccumulator::configure(64, 64, 32, "rgb", "int8", &path),
        Err(ConfigurationError::UnknownComponentEncoding { .. })
    ));
    assert!(!destination_exists(&path));
}

#[test]
fn from_config_requires_an_output_path() {
    let config = FilmConfig::default();
    assert!(matches!(
        TileAccumulator::from_config(&config),
        Err(ConfigurationError::MissingOutputPath)
    ));
}

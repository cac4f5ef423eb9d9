use std::path::Path;

use anyhow::{Context, Result, bail};
use film_protocol::ComponentEncoding;
use tiles::TiledRasterReader;

use crate::sample_source::BoxFilterSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyReport {
    pub tiles_checked: usize,
    pub samples_checked: usize,
}

fn tolerance(encoding: ComponentEncoding, expected: f32) -> f32 {
    match encoding {
        ComponentEncoding::Float16 => 2e-3 * expected.abs().max(1.0),
        ComponentEncoding::Float32 => 1e-5 * expected.abs().max(1.0),
        ComponentEncoding::UInt32 => 1.0,
    }
}

/// Reads every tile back from `path` and compares the image area against `source`.
pub fn verify_output(path: &Path, source: &BoxFilterSource) -> Result<VerifyReport> {
    let mut reader =
        TiledRasterReader::open(path).with_context(|| format!("open {}", path.display()))?;
    let grid = *reader.grid();
    let encoding = reader.header().component_encoding;
    let channel_count = reader.header().channels.len();
    let tile_size = grid.tile_size() as usize;

    let mut report = VerifyReport {
        tiles_checked: 0,
        samples_checked: 0,
    };
    for coord in grid.iter_coords() {
        let tile = reader
            .read_tile(coord)
            .with_context(|| format!("read tile {coord}"))?;
        let origin = grid.tile_origin(coord);
        let extent = grid.tile_extent(coord);
        for local_y in 0..extent.y {
            for local_x in 0..extent.x {
                let x = origin.x as u32 + local_x;
                let y = origin.y as u32 + local_y;
                let start = (local_y as usize * tile_size + local_x as usize) * channel_count;
                for (channel, stored) in tile[start..start + channel_count].iter().enumerate() {
                    let mut expected = source.expected(x, y, channel);
                    if encoding == ComponentEncoding::UInt32 {
                        expected = expected.trunc();
                    }
                    if (stored - expected).abs() > tolerance(encoding, expected) {
                        bail!("pixel ({x}, {y}) channel {channel}: {stored} != {expected}");
                    }
                }
                report.samples_checked += channel_count;
            }
        }
        report.tiles_checked += 1;
    }
    Ok(report)
}

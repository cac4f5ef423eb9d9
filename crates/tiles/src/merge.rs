use film_protocol::ImageBlock;
use model::TileCoord;

use crate::tile_index::TileIndex;

/// Adds `source` into `target` wherever their padded regions overlap, channel by channel.
///
/// Plain floating-point addition: no clamping and no renormalization. Returns the number of
/// overlapping pixels.
pub fn accumulate_overlap(target: &mut ImageBlock, source: &ImageBlock) -> usize {
    assert_eq!(
        target.channel_count(),
        source.channel_count(),
        "cannot merge blocks with different channel counts"
    );
    let Some(overlap) = target.padded_rect().intersect(source.padded_rect()) else {
        return 0;
    };
    let row_len = overlap.width() as usize * source.channel_count();
    for y in overlap.y0..overlap.y1 {
        let (Some(source_start), Some(target_start)) = (
            source.sample_index(overlap.x0, y),
            target.sample_index(overlap.x0, y),
        ) else {
            panic!("overlap row {y} escaped the padded block regions");
        };
        let source_row = &source.data()[source_start..source_start + row_len];
        let target_row = &mut target.data_mut()[target_start..target_start + row_len];
        for (target_value, source_value) in target_row.iter_mut().zip(source_row) {
            *target_value += *source_value;
        }
    }
    (overlap.width() * overlap.height()) as usize
}

/// Exchanges overlapping border contributions between a completed tile and its neighbors.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine;

impl MergeEngine {
    /// Splats every live neighbor's original into `coord`'s accumulator and `coord`'s original
    /// into each neighbor's accumulator. Flushed neighbors are skipped: their pair with `coord`
    /// was applied when they were finalized. Returns the number of neighbor pairs merged.
    pub fn merge_into(index: &mut TileIndex, coord: TileCoord) -> usize {
        let neighbors = index.grid().neighbors(coord).collect::<Vec<_>>();
        let mut merged_pairs = 0;
        for neighbor in neighbors {
            let Some((center, other)) = index.pair_mut(coord, neighbor) else {
                continue;
            };
            accumulate_overlap(center.merged.block_mut(), other.original.block());
            accumulate_overlap(other.merged.block_mut(), center.original.block());
            merged_pairs += 1;
        }
        merged_pairs
    }
}

use model::TileCoord;

use crate::tile_index::TileIndex;

/// Decides when a tile's 3x3 neighborhood is complete enough to finalize it.
///
/// A neighbor counts once it has been submitted, live or already flushed: a flushed
/// neighbor exchanged its borders with this tile when it was finalized.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeighborhoodTracker;

impl NeighborhoodTracker {
    pub fn is_complete(index: &TileIndex, coord: TileCoord) -> bool {
        if !index.contains(coord) {
            return false;
        }
        index
            .grid()
            .neighbors(coord)
            .all(|neighbor| index.is_submitted(neighbor))
    }

    /// Neighbors that still have to arrive before `coord` can be finalized.
    pub fn missing_neighbors(index: &TileIndex, coord: TileCoord) -> Vec<TileCoord> {
        index
            .grid()
            .neighbors(coord)
            .filter(|neighbor| !index.is_submitted(*neighbor))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_buffer::{BufferUsage, FreeList};
    use crate::tile_index::TileSlot;
    use model::TileGrid;

    fn submit(
        index: &mut TileIndex,
        free_list: &mut FreeList,
        usage: &mut BufferUsage,
        coord: TileCoord,
    ) {
        let slot = TileSlot {
            original: free_list.acquire(1, usage),
            merged: free_list.acquire(1, usage),
        };
        index
            .set(coord, slot)
            .map_err(|(error, _)| error)
            .expect("set tile");
    }

    #[test]
    fn interior_tile_needs_all_eight_neighbors() {
        let mut index = TileIndex::new(TileGrid::new(96, 96, 32).expect("grid"));
        let mut free_list = FreeList::new();
        let mut usage = BufferUsage::default();
        let center = TileCoord::new(1, 1);

        submit(&mut index, &mut free_list, &mut usage, center);
        assert_eq!(NeighborhoodTracker::missing_neighbors(&index, center).len(), 8);

        let neighbors = index.grid().neighbors(center).collect::<Vec<_>>();
        for (position, neighbor) in neighbors.iter().enumerate() {
            assert!(!NeighborhoodTracker::is_complete(&index, center));
            submit(&mut index, &mut free_list, &mut usage, *neighbor);
            assert_eq!(
                NeighborhoodTracker::missing_neighbors(&index, center).len(),
                7 - position
            );
        }
        assert!(NeighborhoodTracker::is_complete(&index, center));
    }

    #[test]
    fn flushed_neighbor_still_counts() {
        let mut index = TileIndex::new(TileGrid::new(64, 32, 32).expect("grid"));
        let mut free_list = FreeList::new();
        let mut usage = BufferUsage::default();
        submit(&mut index, &mut free_list, &mut usage, TileCoord::new(0, 0));
        submit(&mut index, &mut free_list, &mut usage, TileCoord::new(1, 0));
        index.clear(TileCoord::new(0, 0));
        assert!(NeighborhoodTracker::is_complete(&index, TileCoord::new(1, 0)));
    }

    #[test]
    fn absent_or_flushed_center_is_never_complete() {
        let mut index = TileIndex::new(TileGrid::new(32, 32, 32).expect("grid"));
        let mut free_list = FreeList::new();
        let mut usage = BufferUsage::default();
        let only = TileCoord::new(0, 0);
        assert!(!NeighborhoodTracker::is_complete(&index, only));
        submit(&mut index, &mut free_list, &mut usage, only);
        assert!(NeighborhoodTracker::is_complete(&index, only));
        index.clear(only);
        assert!(!NeighborhoodTracker::is_complete(&index, only));
        assert!(!NeighborhoodTracker::is_complete(&index, TileCoord::new(3, 3)));
    }
}

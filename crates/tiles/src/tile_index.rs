use model::{TileBitset, TileCoord, TileGrid};

use crate::ProtocolError;
use crate::block_buffer::BlockBuffer;

/// The two buffers kept for a submitted, not yet flushed tile.
#[derive(Debug)]
pub struct TileSlot {
    /// Verbatim copy of the submitted block; only ever read after submission.
    pub original: BlockBuffer,
    /// Starts as a copy of the block and receives the neighbors' overlapping borders.
    pub merged: BlockBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Vacant,
    Live,
    Flushed,
}

/// Tile coordinate -> live slot, plus the set of coordinates that were already written.
#[derive(Debug)]
pub struct TileIndex {
    grid: TileGrid,
    slots: Box<[Option<TileSlot>]>,
    flushed: TileBitset,
    live_count: usize,
}

impl TileIndex {
    pub fn new(grid: TileGrid) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(grid.tile_count(), || None);
        Self {
            grid,
            slots: slots.into_boxed_slice(),
            flushed: TileBitset::new(grid),
            live_count: 0,
        }
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }

    pub fn flushed_count(&self) -> usize {
        self.flushed.count()
    }

    pub fn state(&self, coord: TileCoord) -> SlotState {
        let Ok(index) = self.grid.tile_index(coord) else {
            return SlotState::Vacant;
        };
        if self.slots[index].is_some() {
            SlotState::Live
        } else if self.flushed.contains(coord) {
            SlotState::Flushed
        } else {
            SlotState::Vacant
        }
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        self.state(coord) == SlotState::Live
    }

    /// True once the tile has been submitted, whether or not it is flushed yet.
    pub fn is_submitted(&self, coord: TileCoord) -> bool {
        self.state(coord) != SlotState::Vacant
    }

    pub fn get(&self, coord: TileCoord) -> Option<&TileSlot> {
        let index = self.grid.tile_index(coord).ok()?;
        self.slots[index].as_ref()
    }

    /// Stores `slot` at `coord`. The coordinate must be vacant: a tile is accepted once.
    ///
    /// On error the slot is handed back so its buffers can be recycled.
    pub fn set(
        &mut self,
        coord: TileCoord,
        slot: TileSlot,
    ) -> Result<(), (ProtocolError, TileSlot)> {
        let error = match self.state(coord) {
            SlotState::Live => ProtocolError::SlotOccupied {
                tile_x: coord.x,
                tile_y: coord.y,
            },
            SlotState::Flushed => ProtocolError::AlreadyFlushed {
                tile_x: coord.x,
                tile_y: coord.y,
            },
            SlotState::Vacant => {
                let index = self
                    .grid
                    .tile_index(coord)
                    .unwrap_or_else(|error| panic!("tile index set out of grid: {error}"));
                self.slots[index] = Some(slot);
                self.live_count += 1;
                return Ok(());
            }
        };
        Err((error, slot))
    }

    /// Takes the slot out after its tile was written and marks the coordinate flushed.
    pub fn clear(&mut self, coord: TileCoord) -> Option<TileSlot> {
        let index = self.grid.tile_index(coord).ok()?;
        let slot = self.slots[index].take()?;
        self.live_count -= 1;
        self.flushed
            .insert(coord)
            .unwrap_or_else(|error| panic!("flushed bit for tile {coord} rejected: {error}"));
        Some(slot)
    }

    /// Mutable access to two distinct live slots at once.
    pub fn pair_mut(
        &mut self,
        first: TileCoord,
        second: TileCoord,
    ) -> Option<(&mut TileSlot, &mut TileSlot)> {
        let first_index = self.grid.tile_index(first).ok()?;
        let second_index = self.grid.tile_index(second).ok()?;
        if first_index == second_index {
            return None;
        }
        let (first_slot, second_slot) = if first_index < second_index {
            let (head, tail) = self.slots.split_at_mut(second_index);
            (&mut head[first_index], &mut tail[0])
        } else {
            let (head, tail) = self.slots.split_at_mut(first_index);
            (&mut tail[0], &mut head[second_index])
        };
        Some((first_slot.as_mut()?, second_slot.as_mut()?))
    }

    /// Removes every live slot without marking it flushed.
    pub fn drain_live(&mut self) -> Vec<(TileCoord, TileSlot)> {
        let mut drained = Vec::with_capacity(self.live_count);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(slot) = slot.take() {
                let coord = self
                    .grid
                    .tile_coord(index)
                    .unwrap_or_else(|error| panic!("live slot outside tile grid: {error}"));
                drained.push((coord, slot));
            }
        }
        self.live_count = 0;
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_buffer::{BufferUsage, FreeList};

    fn slot(free_list: &mut FreeList, usage: &mut BufferUsage) -> TileSlot {
        TileSlot {
            original: free_list.acquire(4, usage),
            merged: free_list.acquire(4, usage),
        }
    }

    fn index_2x2() -> TileIndex {
        TileIndex::new(TileGrid::new(64, 64, 32).expect("grid"))
    }

    #[test]
    fn slot_lifecycle_moves_vacant_live_flushed() {
        let mut index = index_2x2();
        let mut free_list = FreeList::new();
        let mut usage = BufferUsage::default();
        let coord = TileCoord::new(1, 0);

        assert_eq!(index.state(coord), SlotState::Vacant);
        index
            .set(coord, slot(&mut free_list, &mut usage))
            .map_err(|(error, _)| error)
            .expect("set vacant");
        assert_eq!(index.state(coord), SlotState::Live);
        assert!(index.contains(coord));
        assert_eq!(index.live_count(), 1);

        assert!(index.clear(coord).is_some());
        assert_eq!(index.state(coord), SlotState::Flushed);
        assert!(index.is_submitted(coord));
        assert!(!index.contains(coord));
        assert_eq!(index.flushed_count(), 1);
        assert!(index.clear(coord).is_none());
    }

    #[test]
    fn set_rejects_occupied_and_flushed_coordinates() {
        let mut index = index_2x2();
        let mut free_list = FreeList::new();
        let mut usage = BufferUsage::default();
        let coord = TileCoord::new(0, 1);

        index
            .set(coord, slot(&mut free_list, &mut usage))
            .map_err(|(error, _)| error)
            .expect("first set");
        let (error, _returned) = index
            .set(coord, slot(&mut free_list, &mut usage))
            .expect_err("occupied");
        assert_eq!(error, ProtocolError::SlotOccupied { tile_x: 0, tile_y: 1 });

        index.clear(coord);
        let (error, _returned) = index
            .set(coord, slot(&mut free_list, &mut usage))
            .expect_err("flushed");
        assert_eq!(error, ProtocolError::AlreadyFlushed { tile_x: 0, tile_y: 1 });
    }

    #[test]
    fn pair_mut_returns_both_orders() {
        let mut index = index_2x2();
        let mut free_list = FreeList::new();
        let mut usage = BufferUsage::default();
        let a = TileCoord::new(0, 0);
        let b = TileCoord::new(1, 1);
        for coord in [a, b] {
            index
                .set(coord, slot(&mut free_list, &mut usage))
                .map_err(|(error, _)| error)
                .expect("set");
        }
        assert!(index.pair_mut(a, b).is_some());
        assert!(index.pair_mut(b, a).is_some());
        assert!(index.pair_mut(a, a).is_none());
        assert!(index.pair_mut(a, TileCoord::new(1, 0)).is_none());
    }

    #[test]
    fn drain_live_leaves_flushed_marks_alone() {
        let mut index = index_2x2();
        let mut free_list = FreeList::new();
        let mut usage = BufferUsage::default();
        for coord in [TileCoord::new(0, 0), TileCoord::new(1, 0), TileCoord::new(1, 1)] {
            index
                .set(coord, slot(&mut free_list, &mut usage))
                .map_err(|(error, _)| error)
                .expect("set");
        }
        index.clear(TileCoord::new(1, 0));
        let drained = index.drain_live();
        assert_eq!(
            drained.iter().map(|(coord, _)| *coord).collect::<Vec<_>>(),
            vec![TileCoord::new(0, 0), TileCoord::new(1, 1)]
        );
        assert_eq!(index.live_count(), 0);
        assert_eq!(index.state(TileCoord::new(1, 0)), SlotState::Flushed);
        assert_eq!(index.state(TileCoord::new(0, 0)), SlotState::Vacant);
    }
}

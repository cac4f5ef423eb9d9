//! Progressive accumulation of padded image blocks into a tiled raster store.
//!
//! Workers submit [`ImageBlock`]s in any order. Each block is kept twice (an untouched
//! original and a merge accumulator) until its whole 3x3 tile neighborhood has arrived;
//! then the overlapping borders are exchanged with the neighbors, the tile interior is
//! written once to the backing store, and both buffers go back to a free list.

use thiserror::Error;

pub use film_protocol::{
    ChannelSet, ComponentEncoding, ConfigurationError, FilmConfig, FilmSettings, ImageBlock,
    PixelLayout,
};
pub use model::{PixelPoint, PixelSize, TileCoord, TileGrid};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unaligned block at offset ({offset_x}, {offset_y}) for tile size {tile_size}")]
    UnalignedBlock {
        offset_x: i32,
        offset_y: i32,
        tile_size: u32,
    },
    #[error("oversized block of {size_x}x{size_y} pixels for tile size {tile_size}")]
    OversizedBlock {
        size_x: u32,
        size_y: u32,
        tile_size: u32,
    },
    #[error("block at offset ({offset_x}, {offset_y}) lies outside the {width}x{height} image")]
    BlockOutOfBounds {
        offset_x: i32,
        offset_y: i32,
        width: u32,
        height: u32,
    },
    #[error("tile ({tile_x}, {tile_y}) was submitted again before it was flushed")]
    SlotOccupied { tile_x: u32, tile_y: u32 },
    #[error("tile ({tile_x}, {tile_y}) was already written and cannot be submitted again")]
    AlreadyFlushed { tile_x: u32, tile_y: u32 },
    #[error("block for tile ({tile_x}, {tile_y}) has {found} channels, film expects {expected}")]
    ChannelCountMismatch {
        tile_x: u32,
        tile_y: u32,
        expected: usize,
        found: usize,
    },
    #[error("block submitted before film channels were prepared")]
    NotPrepared,
    #[error("block submitted after the film was shut down")]
    Closed,
}

#[derive(Debug, Error)]
pub enum FilmError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("tiled film aborted after an earlier fatal error")]
    Aborted,
}

mod accumulator;
mod block_buffer;
mod merge;
mod neighborhood;
mod store;
mod tile_index;
mod tile_writer;

pub use accumulator::{FlushSummary, SharedAccumulator, TileAccumulator};
pub use block_buffer::{BlockBuffer, BufferUsage, FreeList};
pub use merge::{MergeEngine, accumulate_overlap};
pub use neighborhood::NeighborhoodTracker;
pub use store::{
    CONTAINER_EXTENSION, FileTileStore, MemoryTileStore, StoreError, StoreHeader, StoredTile,
    TileFrame, TiledImageStore, TiledRasterReader, destination_exists, normalize_destination,
};
pub use tile_index::{SlotState, TileIndex, TileSlot};
pub use tile_writer::TileWriter;

#[cfg(test)]
mod tests;

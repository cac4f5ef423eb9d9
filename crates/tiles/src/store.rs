use std::io;

use film_protocol::{Chromaticities, ComponentEncoding, PixelLayout};
use model::{TileCoord, TileGrid};
use serde::{Deserialize, Serialize};

mod file;
mod memory;

pub use file::{
    CONTAINER_EXTENSION, FileTileStore, TiledRasterReader, destination_exists,
    normalize_destination,
};
pub use memory::{MemoryTileStore, StoredTile};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot write tiled store header: {source}")]
    Header {
        #[source]
        source: io::Error,
    },
    #[error("cannot write tile ({tile_x}, {tile_y}): {source}")]
    WriteTile {
        tile_x: u32,
        tile_y: u32,
        #[source]
        source: io::Error,
    },
    #[error("tiled store rejected tile ({tile_x}, {tile_y}): {reason}")]
    Rejected {
        tile_x: u32,
        tile_y: u32,
        reason: String,
    },
    #[error("cannot close tiled store: {source}")]
    Finish {
        #[source]
        source: io::Error,
    },
    #[error("cannot read tiled store: {source}")]
    Read {
        #[source]
        source: io::Error,
    },
    #[error("malformed tiled store: {reason}")]
    Format { reason: String },
}

/// Structural description written once at the head of a tiled store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreHeader {
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub channels: Vec<String>,
    pub component_encoding: ComponentEncoding,
    pub pixel_layout: PixelLayout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chromaticities: Option<Chromaticities>,
    pub generated_by: String,
}

impl StoreHeader {
    pub fn grid(&self) -> Result<TileGrid, model::GridError> {
        TileGrid::new(self.width, self.height, self.tile_size)
    }

    pub fn pixel_stride(&self) -> usize {
        self.channels.len() * self.component_encoding.byte_width()
    }

    pub fn row_stride(&self) -> usize {
        self.pixel_stride() * self.tile_size as usize
    }

    /// Bytes of one full `tile_size x tile_size` tile.
    pub fn tile_bytes(&self) -> usize {
        self.row_stride() * self.tile_size as usize
    }
}

/// One staged tile handed to the store.
///
/// Pixel `(x, y)` in absolute image coordinates lives at byte
/// `x * pixel_stride + y * row_stride - base_offset` of `bytes`.
#[derive(Debug, Clone, Copy)]
pub struct TileFrame<'a> {
    pub coord: TileCoord,
    pub base_offset: usize,
    pub pixel_stride: usize,
    pub row_stride: usize,
    pub bytes: &'a [u8],
}

impl TileFrame<'_> {
    pub fn pixel_bytes(&self, x: u32, y: u32) -> Option<&[u8]> {
        let address = x as usize * self.pixel_stride + y as usize * self.row_stride;
        let start = address.checked_sub(self.base_offset)?;
        self.bytes.get(start..start + self.pixel_stride)
    }
}

/// Backing store for finalized tiles. Each coordinate is written at most once per run.
pub trait TiledImageStore {
    fn begin(&mut self, header: &StoreHeader) -> Result<(), StoreError>;
    fn write_tile(&mut self, frame: &TileFrame<'_>) -> Result<(), StoreError>;
    fn finish(&mut self) -> Result<(), StoreError>;
}

#[cfg(test)]
pub(crate) fn test_header(channels: &[&str], encoding: ComponentEncoding) -> StoreHeader {
    StoreHeader {
        width: 64,
        height: 64,
        tile_size: 32,
        channels: channels.iter().map(|name| (*name).to_owned()).collect(),
        component_encoding: encoding,
        pixel_layout: PixelLayout::MultiChannel,
        chromaticities: None,
        generated_by: "tiles tests".to_owned(),
    }
}

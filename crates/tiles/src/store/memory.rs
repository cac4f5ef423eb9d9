use std::collections::HashMap;

use model::TileCoord;

use super::{StoreError, StoreHeader, TileFrame, TiledImageStore};

/// One tile as received by [`MemoryTileStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTile {
    pub base_offset: usize,
    pub pixel_stride: usize,
    pub row_stride: usize,
    pub bytes: Vec<u8>,
}

impl StoredTile {
    pub fn frame(&self, coord: TileCoord) -> TileFrame<'_> {
        TileFrame {
            coord,
            base_offset: self.base_offset,
            pixel_stride: self.pixel_stride,
            row_stride: self.row_stride,
            bytes: &self.bytes,
        }
    }
}

/// In-memory store that records every call, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryTileStore {
    header: Option<StoreHeader>,
    tiles: HashMap<TileCoord, StoredTile>,
    write_log: Vec<TileCoord>,
    fail_on: Option<TileCoord>,
    fail_finish: bool,
    finished: bool,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the write of `coord` fail with an I/O error.
    pub fn fail_on_tile(mut self, coord: TileCoord) -> Self {
        self.fail_on = Some(coord);
        self
    }

    /// Makes every call to `finish` fail with an I/O error.
    pub fn fail_on_finish(mut self) -> Self {
        self.fail_finish = true;
        self
    }

    pub fn header(&self) -> Option<&StoreHeader> {
        self.header.as_ref()
    }

    pub fn tile(&self, coord: TileCoord) -> Option<&StoredTile> {
        self.tiles.get(&coord)
    }

    /// Coordinates in the order they were written, duplicates included.
    pub fn write_log(&self) -> &[TileCoord] {
        &self.write_log
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decodes one component at absolute pixel `(x, y)`.
    pub fn sample(&self, x: u32, y: u32, channel: usize) -> Option<f32> {
        let header = self.header.as_ref()?;
        let coord = TileCoord::new(x / header.tile_size, y / header.tile_size);
        let frame = self.tiles.get(&coord)?.frame(coord);
        let pixel = frame.pixel_bytes(x, y)?;
        let width = header.component_encoding.byte_width();
        let bytes = pixel.get(channel * width..(channel + 1) * width)?;
        Some(header.component_encoding.decode(bytes))
    }
}

impl TiledImageStore for MemoryTileStore {
    fn begin(&mut self, header: &StoreHeader) -> Result<(), StoreError> {
        self.header = Some(header.clone());
        Ok(())
    }

    fn write_tile(&mut self, frame: &TileFrame<'_>) -> Result<(), StoreError> {
        let coord = frame.coord;
        self.write_log.push(coord);
        if self.fail_on == Some(coord) {
            return Err(StoreError::WriteTile {
                tile_x: coord.x,
                tile_y: coord.y,
                source: std::io::Error::other("injected write failure"),
            });
        }
        self.tiles.insert(
            coord,
            StoredTile {
                base_offset: frame.base_offset,
                pixel_stride: frame.pixel_stride,
                row_stride: frame.row_stride,
                bytes: frame.bytes.to_vec(),
            },
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<(), StoreError> {
        if self.fail_finish {
            return Err(StoreError::Finish {
                source: std::io::Error::other("injected close failure"),
            });
        }
        self.finished = true;
        Ok(())
    }
}

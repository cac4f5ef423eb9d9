use film_protocol::{ComponentEncoding, ImageBlock};
use model::{TileCoord, TileGrid};

use crate::store::{StoreError, StoreHeader, TileFrame, TiledImageStore};

/// Encodes finalized tiles into a staging buffer and hands them to the store, one write each.
#[derive(Debug)]
pub struct TileWriter<S> {
    store: S,
    grid: TileGrid,
    encoding: ComponentEncoding,
    layout: Option<StagingLayout>,
    staging: Vec<u8>,
    tiles_written: usize,
}

#[derive(Debug, Clone, Copy)]
struct StagingLayout {
    channel_count: usize,
    pixel_stride: usize,
    row_stride: usize,
}

impl<S: TiledImageStore> TileWriter<S> {
    pub fn new(store: S, grid: TileGrid, encoding: ComponentEncoding) -> Self {
        Self {
            store,
            grid,
            encoding,
            layout: None,
            staging: Vec::new(),
            tiles_written: 0,
        }
    }

    /// Writes the store header and sizes the staging tile for the header's channel list.
    pub fn begin(&mut self, header: &StoreHeader) -> Result<(), StoreError> {
        let channel_count = header.channels.len();
        let pixel_stride = channel_count * self.encoding.byte_width();
        let row_stride = pixel_stride * self.grid.tile_size() as usize;
        self.store.begin(header)?;
        self.staging = vec![0; row_stride * self.grid.tile_size() as usize];
        self.layout = Some(StagingLayout {
            channel_count,
            pixel_stride,
            row_stride,
        });
        Ok(())
    }

    /// Byte offset of the tile's first pixel in a frame buffer addressed with the staging
    /// strides: `y * tile_size * row_stride + x * tile_size * pixel_stride`.
    pub fn frame_offset(&self, coord: TileCoord) -> Option<usize> {
        let layout = self.layout?;
        let tile_size = self.grid.tile_size() as usize;
        Some(
            coord.y as usize * tile_size * layout.row_stride
                + coord.x as usize * tile_size * layout.pixel_stride,
        )
    }

    /// Stages the interior of `block` (border excluded) for `coord` and issues one tile write.
    ///
    /// Staged pixels the block does not cover are written as zero.
    pub fn commit(&mut self, coord: TileCoord, block: &ImageBlock) -> Result<(), StoreError> {
        let rejected = |reason: String| StoreError::Rejected {
            tile_x: coord.x,
            tile_y: coord.y,
            reason,
        };
        let (Some(layout), Some(base_offset)) = (self.layout, self.frame_offset(coord)) else {
            return Err(rejected("tile writer used before the store header".to_owned()));
        };
        let tile_size = self.grid.tile_size();
        let size = block.size();
        assert!(
            size.x <= tile_size && size.y <= tile_size,
            "block of {}x{} pixels exceeds tile {coord}",
            size.x,
            size.y
        );
        assert_eq!(
            block.offset(),
            self.grid.tile_origin(coord),
            "block committed to the wrong tile {coord}"
        );
        if block.channel_count() != layout.channel_count {
            return Err(rejected(format!(
                "block carries {} channels, store expects {}",
                block.channel_count(),
                layout.channel_count
            )));
        }

        self.staging.fill(0);
        let width = self.encoding.byte_width();
        let origin = block.offset();
        for local_y in 0..size.y {
            let row_start = local_y as usize * layout.row_stride;
            for local_x in 0..size.x {
                let x = i64::from(origin.x) + i64::from(local_x);
                let y = i64::from(origin.y) + i64::from(local_y);
                let Some(pixel) = block.pixel(x, y) else {
                    panic!("interior pixel ({x}, {y}) missing from block for tile {coord}");
                };
                let pixel_start = row_start + local_x as usize * layout.pixel_stride;
                let target = &mut self.staging[pixel_start..pixel_start + layout.pixel_stride];
                for (component, value) in target.chunks_exact_mut(width).zip(pixel) {
                    self.encoding.encode(*value, component);
                }
            }
        }

        self.store.write_tile(&TileFrame {
            coord,
            base_offset,
            pixel_stride: layout.pixel_stride,
            row_stride: layout.row_stride,
            bytes: &self.staging,
        })?;
        self.tiles_written += 1;
        Ok(())
    }

    pub fn tiles_written(&self) -> usize {
        self.tiles_written
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Closes the store. A writer that never wrote its header has nothing to close.
    pub fn finish(&mut self) -> Result<(), StoreError> {
        if self.layout.is_none() {
            return Ok(());
        }
        self.store.finish()
    }
}
